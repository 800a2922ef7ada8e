use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use tracing::warn;

/// `WIDTHxHEIGHT+X+Y`, as printed by xrandr for every connected output.
pub const GEOMETRY_PATTERN: &str = r"([0-9]+)x([0-9]+)\+([0-9]+)\+([0-9]+)";

static GEOMETRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(GEOMETRY_PATTERN).expect("geometry pattern is valid"));

/// One physical screen inside the composite screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Screen {
    pub const fn new(width: u32, height: u32, offset_x: u32, offset_y: u32) -> Self {
        Self {
            width,
            height,
            offset_x,
            offset_y,
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.offset_x, self.offset_y
        )
    }
}

/// Ordered screens. A screen's 1-based position names its output directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScreenSet(Vec<Screen>);

impl ScreenSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Screen> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Screen] {
        &self.0
    }

    /// Pairs every screen with its 1-based index.
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &Screen)> + '_ {
        self.0.iter().enumerate().map(|(i, screen)| (i + 1, screen))
    }
}

impl From<Vec<Screen>> for ScreenSet {
    fn from(screens: Vec<Screen>) -> Self {
        Self(screens)
    }
}

impl<'a> IntoIterator for &'a ScreenSet {
    type Item = &'a Screen;
    type IntoIter = std::slice::Iter<'a, Screen>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ScreenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.len() == 1 { "" } else { "s" };
        writeln!(f, "Screen setup with {} screen{plural}", self.len())?;
        for (index, screen) in self.indexed() {
            writeln!(f, "{index}.: {screen}")?;
        }
        Ok(())
    }
}

/// Extracts every `WxH+X+Y` occurrence from `text`, left to right.
///
/// Text without any geometry yields an empty set; callers decide whether that
/// is an error.
pub fn parse_geometry(text: &str) -> ScreenSet {
    GEOMETRY_RE
        .captures_iter(text)
        .map(|caps| {
            Screen::new(
                capture_number(&caps[1]),
                capture_number(&caps[2]),
                capture_number(&caps[3]),
                capture_number(&caps[4]),
            )
        })
        .collect::<Vec<_>>()
        .into()
}

// The pattern only admits digits, so this fails on overflow alone.
fn capture_number(raw: &str) -> u32 {
    raw.parse().unwrap_or_else(|err| {
        warn!(value = raw, %err, "unparseable geometry number, using 0");
        0
    })
}
