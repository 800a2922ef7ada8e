use chrono::{DateTime, Local};
use serde::Serialize;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::paths::join_clean;

/// Files at or below this size are not representative screenshots.
const MIN_ESTIMATE_BYTES: u64 = 4096;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to create capture directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to list capture directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("capture directory path is not valid UTF-8: {}", .path.display())]
    NonUtf8Path { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub dest: PathBuf,
    pub interval: Duration,
    /// Compression quality handed to the screenshot tool.
    pub quality: u8,
    pub program: String,
}

impl CaptureOptions {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            interval: Duration::from_secs(5),
            quality: 50,
            program: "scrot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Throughput {
    pub bytes_per_sec: f64,
}

impl Throughput {
    pub fn bytes_per_min(&self) -> f64 {
        self.bytes_per_sec * 60.0
    }

    pub fn minutes_per_gigabyte(&self) -> f64 {
        1e9 / self.bytes_per_min()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    /// Screenshots the tool reported as written.
    pub taken: u64,
    /// Attempts where the tool failed or could not be started.
    pub failed: u64,
}

impl CaptureSummary {
    fn record(&mut self, ok: bool) {
        if ok {
            self.taken += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// `dest/YYYY-MM-DD_HH-MM-SS_$wx$h.png`; scrot expands `$w` and `$h`.
pub fn capture_path(dest: &str, time: &DateTime<Local>) -> PathBuf {
    let name = format!("{}_$wx$h.png", time.format("%Y-%m-%d_%H-%M-%S"));
    join_clean(dest, &name)
}

/// Guesses the storage rate from the first sizeable screenshot in `dest`.
pub fn estimate_throughput(dest: &Path, interval: Duration) -> Option<Throughput> {
    let secs = interval.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    let mut sizes: Vec<(PathBuf, u64)> = std::fs::read_dir(dest)
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|entry| Some((entry.path(), entry.metadata().ok()?.len())))
        .collect();
    sizes.sort();
    sizes
        .into_iter()
        .map(|(_, size)| size)
        .find(|size| *size > MIN_ESTIMATE_BYTES)
        .map(|size| Throughput {
            bytes_per_sec: size as f64 / secs,
        })
}

/// Runs the screenshot tool once. Failures are logged, not returned.
pub async fn take_screenshot(options: &CaptureOptions, time: &DateTime<Local>) -> bool {
    let Some(dest) = options.dest.to_str() else {
        warn!(dest = %options.dest.display(), "capture directory path is not valid UTF-8");
        return false;
    };
    let path = capture_path(dest, time);
    let status = Command::new(&options.program)
        .arg("-q")
        .arg(options.quality.to_string())
        .arg("-z")
        .arg(&path)
        .status()
        .await;
    match status {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!(path = %path.display(), code = status.code().unwrap_or(1), "screenshot tool failed");
            false
        }
        Err(err) => {
            warn!(program = %options.program, %err, "failed to run screenshot tool");
            false
        }
    }
}

/// Takes one screenshot now and one per interval until `shutdown` resolves.
pub async fn run_capture<F>(
    options: &CaptureOptions,
    shutdown: F,
) -> Result<CaptureSummary, CaptureError>
where
    F: Future<Output = ()>,
{
    if options.dest.to_str().is_none() {
        return Err(CaptureError::NonUtf8Path {
            path: options.dest.clone(),
        });
    }
    std::fs::create_dir_all(&options.dest).map_err(|source| CaptureError::CreateDir {
        path: options.dest.clone(),
        source,
    })?;

    let mut summary = CaptureSummary::default();
    summary.record(take_screenshot(options, &Local::now()).await);

    match estimate_throughput(&options.dest, options.interval) {
        Some(rate) => {
            info!(
                "{:5.3E} byte/sec = {:5.3} kb/sec = {:5.3} mb/sec",
                rate.bytes_per_sec,
                rate.bytes_per_sec / 1e3,
                rate.bytes_per_sec / 1e6
            );
            info!(
                "{:5.3E} byte/min = {:5.3} kb/min = {:5.3} mb/min",
                rate.bytes_per_min(),
                rate.bytes_per_min() / 1e3,
                rate.bytes_per_min() / 1e6
            );
            info!("1GB of storage will be filled in {:.2} minutes", rate.minutes_per_gigabyte());
        }
        None => warn!("cannot estimate bytes/second"),
    }

    let mut number = std::fs::read_dir(&options.dest)
        .map_err(|source| CaptureError::ReadDir {
            path: options.dest.clone(),
            source,
        })?
        .count() as u64;
    if summary.taken > 0 {
        info!("picture #{number:010} taken");
        number += 1;
    }

    let period = options.interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                let ok = take_screenshot(options, &Local::now()).await;
                summary.record(ok);
                if ok {
                    info!("picture #{number:010} taken");
                    number += 1;
                }
            }
        }
    }

    info!(taken = summary.taken, failed = summary.failed, "capture stopped");
    Ok(summary)
}
