use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;

use crate::geometry::Screen;
use crate::process::{run_with_timeout, RunError};

/// A single file/screen crop failed. Never fatal to a run.
#[derive(Debug, Error)]
pub enum CropToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with status {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
    #[error("failed waiting for {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Cuts one screen's rectangle out of a composite screenshot.
pub trait CropTool: Send + Sync {
    fn crop(&self, screen: &Screen, source: &Path, destination: &Path)
        -> Result<(), CropToolError>;
}

/// ImageMagick: `convert SRC -crop WxH+X+Y +repage DST`.
///
/// `+repage` drops the virtual canvas offset so the output starts at 0,0.
#[derive(Debug, Clone)]
pub struct MagickCrop {
    pub program: String,
    pub timeout: Duration,
}

impl Default for MagickCrop {
    fn default() -> Self {
        Self {
            program: "convert".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl CropTool for MagickCrop {
    fn crop(
        &self,
        screen: &Screen,
        source: &Path,
        destination: &Path,
    ) -> Result<(), CropToolError> {
        let mut command = Command::new(&self.program);
        command
            .arg(source)
            .arg("-crop")
            .arg(screen.to_string())
            .arg("+repage")
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = run_with_timeout(&mut command, self.timeout).map_err(|err| {
            let program = self.program.clone();
            match err {
                RunError::Spawn(source) => CropToolError::Spawn { program, source },
                RunError::Timeout => CropToolError::Timeout {
                    program,
                    timeout: self.timeout,
                },
                RunError::Io(source) => CropToolError::Io { program, source },
            }
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CropToolError::Failed {
                program: self.program.clone(),
                code: output.status.code().unwrap_or(1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// In-process crop for hosts without ImageMagick. The output format follows
/// the destination extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrop;

impl CropTool for ImageCrop {
    fn crop(
        &self,
        screen: &Screen,
        source: &Path,
        destination: &Path,
    ) -> Result<(), CropToolError> {
        let composite = image::open(source)?;
        composite
            .crop_imm(screen.offset_x, screen.offset_y, screen.width, screen.height)
            .save(destination)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};
    use tempfile::tempdir;

    fn two_screen_composite(path: &Path) {
        let img = RgbaImage::from_fn(30, 10, |x, _| {
            if x < 20 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        img.save(path).unwrap();
    }

    #[test]
    fn image_backend_cuts_requested_rectangle() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("shot.png");
        let destination = dir.path().join("right.png");
        two_screen_composite(&source);

        ImageCrop
            .crop(&Screen::new(10, 8, 20, 2), &source, &destination)
            .unwrap();

        let cropped = image::open(&destination).unwrap();
        assert_eq!(cropped.dimensions(), (10, 8));
        assert_eq!(cropped.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn image_backend_reports_missing_source() {
        let dir = tempdir().unwrap();
        let err = ImageCrop
            .crop(
                &Screen::new(10, 10, 0, 0),
                &dir.path().join("gone.png"),
                &dir.path().join("out.png"),
            )
            .unwrap_err();
        assert!(matches!(err, CropToolError::Image(_)), "{err}");
    }

    #[test]
    fn magick_backend_missing_program_is_spawn_error() {
        let dir = tempdir().unwrap();
        let tool = MagickCrop {
            program: "screensplit-no-such-convert".to_string(),
            ..MagickCrop::default()
        };
        let err = tool
            .crop(
                &Screen::new(10, 10, 0, 0),
                &dir.path().join("a.png"),
                &dir.path().join("b.png"),
            )
            .unwrap_err();
        assert!(matches!(err, CropToolError::Spawn { .. }), "{err}");
    }

    #[test]
    fn magick_backend_non_zero_exit_is_failure() {
        let dir = tempdir().unwrap();
        let tool = MagickCrop {
            program: "false".to_string(),
            ..MagickCrop::default()
        };
        let err = tool
            .crop(
                &Screen::new(10, 10, 0, 0),
                &dir.path().join("a.png"),
                &dir.path().join("b.png"),
            )
            .unwrap_err();
        assert!(matches!(err, CropToolError::Failed { code: 1, .. }), "{err}");
    }

    #[test]
    fn magick_backend_survives_noisy_stderr() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("noisy-convert.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nyes 'convert: warning' | head -c 200000 >&2\n",
        )
        .unwrap();
        let tool = MagickCrop {
            program: "sh".to_string(),
            timeout: Duration::from_secs(3),
        };
        tool.crop(&Screen::new(10, 10, 0, 0), &script, &dir.path().join("out.png"))
            .unwrap();
    }

    #[test]
    fn magick_backend_passes_geometry_argument() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("fake-convert.sh");
        let log = dir.path().join("args.log");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$@\" > '{}'\n", log.display()),
        )
        .unwrap();
        let tool = MagickCrop {
            program: "sh".to_string(),
            ..MagickCrop::default()
        };
        // `sh script SRC -crop RECT +repage DST`: the script path stands in for SRC.
        tool.crop(&Screen::new(1280, 1024, 1920, 0), &script, Path::new("out.png"))
            .unwrap();
        let logged = std::fs::read_to_string(&log).unwrap();
        assert_eq!(logged.trim(), "-crop 1280x1024+1920+0 +repage out.png");
    }
}
