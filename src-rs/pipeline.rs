use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::crop::CropTool;
use crate::geometry::ScreenSet;
use crate::scheduler::{self, CropOptions, CropReport, DirectoryReadError};
use crate::topology::{load_topology_from_file, ConfigError, DisplayQuery, TopologyError};

/// Conditions that abort a whole crop run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    DirectoryRead(#[from] DirectoryReadError),
    #[error("no screen geometry found in {0}")]
    NoScreens(String),
}

/// Where the screen layout comes from.
#[derive(Debug, Clone)]
pub enum TopologySource {
    /// Ask the running display server.
    Live(DisplayQuery),
    /// Replay a layout saved to a text file.
    Config(PathBuf),
}

impl Default for TopologySource {
    fn default() -> Self {
        Self::Live(DisplayQuery::default())
    }
}

impl TopologySource {
    pub fn resolve(&self) -> Result<ScreenSet, PipelineError> {
        match self {
            Self::Live(query) => Ok(query.resolve()?),
            Self::Config(path) => Ok(load_topology_from_file(path)?),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Live(query) => format!("{} output", query.program),
            Self::Config(path) => path.display().to_string(),
        }
    }
}

/// Resolves the topology and crops `source_dir` with it.
///
/// Nothing is written unless at least one screen was resolved.
pub fn split_folder(
    source: &TopologySource,
    source_dir: &Path,
    options: &CropOptions,
    tool: &dyn CropTool,
) -> Result<CropReport, PipelineError> {
    let screens = source.resolve()?;
    if screens.is_empty() {
        return Err(PipelineError::NoScreens(source.describe()));
    }
    info!("{}", screens.to_string().trim_end());
    Ok(scheduler::run(&screens, source_dir, options, tool)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::ImageCrop;
    use image::{GenericImageView, Rgb, RgbImage};
    use std::fs;
    use tempfile::tempdir;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn missing_query_tool_fails_before_creating_directories() {
        let source = tempdir().unwrap();
        let out = tempdir().unwrap();
        fs::write(source.path().join("a.png"), b"x").unwrap();
        let options = CropOptions {
            out_root: out.path().to_path_buf(),
            ..CropOptions::default()
        };
        let topology =
            TopologySource::Live(DisplayQuery::with_program("screensplit-no-such-display-tool"));

        let err = split_folder(&topology, source.path(), &options, &ImageCrop).unwrap_err();

        assert!(matches!(err, PipelineError::Topology(TopologyError::Spawn { .. })), "{err}");
        assert_eq!(entries(out.path()), 0);
    }

    #[test]
    fn empty_config_is_rejected_without_side_effects() {
        let source = tempdir().unwrap();
        let out = tempdir().unwrap();
        let config = source.path().join("screens.txt");
        fs::write(&config, "nothing here\n").unwrap();
        let options = CropOptions {
            out_root: out.path().to_path_buf(),
            ..CropOptions::default()
        };

        let err = split_folder(&TopologySource::Config(config), source.path(), &options, &ImageCrop)
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoScreens(_)), "{err}");
        assert_eq!(entries(out.path()), 0);
    }

    #[test]
    fn missing_config_is_config_error() {
        let dir = tempdir().unwrap();
        let err = TopologySource::Config(dir.path().join("nope.txt"))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)), "{err}");
    }

    #[test]
    fn splits_real_images_with_pinned_layout() {
        let source = tempdir().unwrap();
        let out = tempdir().unwrap();
        let config = source.path().join("layout.conf");
        fs::write(&config, "DP-1 6x4+0+0\nDP-2 2x3+6+1\n").unwrap();
        let composite = RgbImage::from_fn(8, 4, |x, _| {
            if x < 6 {
                Rgb([200, 0, 0])
            } else {
                Rgb([0, 200, 0])
            }
        });
        composite.save(source.path().join("2024-05-01_12-00-00_8x4.png")).unwrap();
        let options = CropOptions {
            workers: 2,
            out_root: out.path().to_path_buf(),
        };

        let report =
            split_folder(&TopologySource::Config(config), source.path(), &options, &ImageCrop)
                .unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(report.succeeded, 2);
        let left = image::open(out.path().join("1s/2024-05-01_12-00-00_8x4.png")).unwrap();
        let right = image::open(out.path().join("2s/2024-05-01_12-00-00_8x4.png")).unwrap();
        assert_eq!(left.dimensions(), (6, 4));
        assert_eq!(right.dimensions(), (2, 3));
        assert_eq!(right.to_rgb8().get_pixel(0, 0), &Rgb([0, 200, 0]));
    }
}
