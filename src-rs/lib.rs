//! Split multi-monitor screenshots into one image per physical screen.
//!
//! The screen layout comes from `xrandr` (or a saved copy of its output). Each
//! composite screenshot in a directory is cropped once per screen into
//! `1s/`, `2s/`, ... next to the working directory.

pub mod capture;
pub mod crop;
pub mod geometry;
pub mod paths;
pub mod pipeline;
mod process;
pub mod scheduler;
pub mod topology;

pub use crop::{CropTool, CropToolError, ImageCrop, MagickCrop};
pub use geometry::{parse_geometry, Screen, ScreenSet};
pub use pipeline::{split_folder, PipelineError, TopologySource};
pub use scheduler::{CropOptions, CropReport, DirectoryReadError};
pub use topology::{
    load_topology_from_file, load_topology_from_text, resolve_topology, ConfigError,
    DisplayQuery, TopologyError,
};
