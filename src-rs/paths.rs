use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

static REDUNDANT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\.?/").expect("separator pattern is valid"));

/// Joins `dir` and `name` with `/`, collapsing `//` and `/./` runs until none remain.
pub fn join_clean(dir: &str, name: &str) -> PathBuf {
    let mut merged = format!("{dir}/{name}");
    while REDUNDANT_SEPARATOR.is_match(&merged) {
        merged = REDUNDANT_SEPARATOR.replace_all(&merged, "/").into_owned();
    }
    PathBuf::from(merged)
}

/// Output directory name for the 1-based screen `index`.
pub fn screen_dir_name(index: usize) -> String {
    format!("{index}s")
}

/// Only composite screenshots are cropped.
pub fn is_image_name(name: &str) -> bool {
    name.ends_with(".png") || name.ends_with(".jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_doubled_and_trailing_separators() {
        assert_eq!(join_clean("a//b", "c.png"), PathBuf::from("a/b/c.png"));
        assert_eq!(join_clean("a/b/", "c.png"), PathBuf::from("a/b/c.png"));
    }

    #[test]
    fn collapses_current_dir_segments_repeatedly() {
        assert_eq!(join_clean("a/././b", "c.png"), PathBuf::from("a/b/c.png"));
        assert_eq!(join_clean("/tmp///shots/", "x.jpg"), PathBuf::from("/tmp/shots/x.jpg"));
    }

    #[test]
    fn keeps_single_letter_directories() {
        assert_eq!(join_clean("a/b", "c.png"), PathBuf::from("a/b/c.png"));
        assert_eq!(join_clean("./x", "c.png"), PathBuf::from("./x/c.png"));
    }

    #[test]
    fn names_screen_directories() {
        assert_eq!(screen_dir_name(1), "1s");
        assert_eq!(screen_dir_name(12), "12s");
    }

    #[test]
    fn filters_by_suffix_only() {
        assert!(is_image_name("2024-01-01_10-00-00_3840x1080.png"));
        assert!(is_image_name("img2.jpg"));
        assert!(!is_image_name("notes.txt"));
        assert!(!is_image_name("photo.jpeg"));
        assert!(!is_image_name("upper.PNG"));
    }
}
