use serde::Serialize;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::thread;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::crop::CropTool;
use crate::geometry::{Screen, ScreenSet};
use crate::paths::{is_image_name, join_clean, screen_dir_name};

pub const DEFAULT_WORKERS: usize = 4;

/// The source or output directory is unusable; nothing was cropped.
#[derive(Debug, Error)]
pub enum DirectoryReadError {
    #[error("failed to read directory {}: {source}", .path.display())]
    Unlistable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("directory path is not valid UTF-8: {}", .path.display())]
    NonUtf8Path { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct CropOptions {
    /// Number of shards processed concurrently. Values below 1 mean 1.
    pub workers: usize,
    /// Directory that receives the `1s/`, `2s/`, ... folders.
    pub out_root: PathBuf,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            out_root: PathBuf::from("."),
        }
    }
}

/// Directory entry captured once when a run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CropFailure {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub screen: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CropReport {
    /// Image files found in the snapshot.
    pub files: usize,
    pub jobs: usize,
    pub succeeded: usize,
    pub failures: Vec<CropFailure>,
}

#[derive(Debug, Default)]
struct ShardOutcome {
    jobs: usize,
    succeeded: usize,
    failures: Vec<CropFailure>,
}

/// Splits `0..len` into `max(workers, 1)` contiguous, disjoint ranges that
/// together cover every index once. Range sizes differ by at most one.
pub fn shard_ranges(len: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let base = len / workers;
    let extra = len % workers;
    let mut start = 0;
    (0..workers)
        .map(|shard| {
            let size = base + usize::from(shard < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

/// Reads the directory once, sorted by name. Entries whose name is not UTF-8
/// are skipped.
pub fn snapshot_dir(dir: &Path) -> Result<Vec<FileEntry>, DirectoryReadError> {
    let read_error = |source: io::Error| DirectoryReadError::Unlistable {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        let Some(name) = entry.file_name().to_str().map(ToString::to_string) else {
            debug!(name = ?entry.file_name(), "skipping non UTF-8 file name");
            continue;
        };
        let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        entries.push(FileEntry { name, size });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

// Paths are joined as text, so a lossy conversion would silently point
// every crop at a different file.
fn utf8_dir(dir: &Path) -> Result<&str, DirectoryReadError> {
    dir.to_str().ok_or_else(|| DirectoryReadError::NonUtf8Path {
        path: dir.to_path_buf(),
    })
}

/// Crops every `.png`/`.jpg` in `source_dir` once per screen into
/// `out_root/{index}s/{name}`.
///
/// Shards of the listing run in parallel; inside a shard, the crops of one
/// file run in parallel and are joined before the next file starts. Returns
/// after every shard has finished. Only an unlistable `source_dir` or a
/// non UTF-8 directory path is an error; failed crops are logged and
/// collected in the report.
pub fn run(
    screens: &ScreenSet,
    source_dir: &Path,
    options: &CropOptions,
    tool: &dyn CropTool,
) -> Result<CropReport, DirectoryReadError> {
    let source = utf8_dir(source_dir)?;
    let out_root = utf8_dir(&options.out_root)?;
    let listing = snapshot_dir(source_dir)?;

    for (index, _) in screens.indexed() {
        let dir = join_clean(out_root, &screen_dir_name(index));
        if let Err(err) = fs::create_dir_all(&dir) {
            debug!(dir = %dir.display(), %err, "could not create screen directory");
        }
    }

    info!(files = listing.len(), "start cropping (~{} files)", listing.len());

    let images: Vec<&FileEntry> = listing
        .iter()
        .filter(|entry| is_image_name(&entry.name))
        .collect();

    let outcomes: Vec<ShardOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = shard_ranges(images.len(), options.workers)
            .into_iter()
            .filter(|range| !range.is_empty())
            .map(|range| {
                let shard = &images[range];
                scope.spawn(move || crop_shard(shard, screens, source, out_root, tool))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    error!("crop worker panicked");
                    ShardOutcome::default()
                })
            })
            .collect()
    });

    let mut report = CropReport {
        files: images.len(),
        ..CropReport::default()
    };
    for outcome in outcomes {
        report.jobs += outcome.jobs;
        report.succeeded += outcome.succeeded;
        report.failures.extend(outcome.failures);
    }

    info!(
        files = report.files,
        jobs = report.jobs,
        failed = report.failures.len(),
        "completed cropping"
    );
    Ok(report)
}

fn crop_shard(
    shard: &[&FileEntry],
    screens: &ScreenSet,
    source_dir: &str,
    out_root: &str,
    tool: &dyn CropTool,
) -> ShardOutcome {
    let mut outcome = ShardOutcome::default();

    for entry in shard {
        let source = join_clean(source_dir, &entry.name);

        let jobs: Vec<(usize, &Screen, PathBuf)> = screens
            .indexed()
            .map(|(index, screen)| {
                let dir = format!("{out_root}/{}", screen_dir_name(index));
                (index, screen, join_clean(&dir, &entry.name))
            })
            .collect();

        let results: Vec<(usize, PathBuf, Result<(), String>)> = thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .iter()
                .map(|(index, screen, destination)| {
                    let source = &source;
                    let handle = scope.spawn(move || crop_one(tool, screen, source, destination));
                    (*index, destination, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(index, destination, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        error!(destination = %destination.display(), "crop task panicked");
                        Err("crop task panicked".to_string())
                    });
                    (index, destination.clone(), result)
                })
                .collect()
        });

        for (index, destination, result) in results {
            outcome.jobs += 1;
            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(error) => outcome.failures.push(CropFailure {
                    source: source.clone(),
                    destination,
                    screen: index,
                    error,
                }),
            }
        }
    }

    outcome
}

fn crop_one(
    tool: &dyn CropTool,
    screen: &Screen,
    source: &Path,
    destination: &Path,
) -> Result<(), String> {
    debug!(%screen, source = %source.display(), destination = %destination.display(), "cropping");
    tool.crop(screen, source, destination).map_err(|err| {
        warn!(
            %screen,
            source = %source.display(),
            destination = %destination.display(),
            "crop failed: {err}"
        );
        err.to_string()
    })
}
