use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Why a bounded subprocess run produced no output.
#[derive(Debug)]
pub(crate) enum RunError {
    Spawn(io::Error),
    Timeout,
    Io(io::Error),
}

#[derive(Debug)]
pub(crate) struct Captured {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Spawns `command` and waits at most `timeout` for it to exit.
///
/// Piped stdout/stderr are drained on reader threads while waiting, so a
/// chatty child never blocks on a full pipe. Non-piped streams come back empty.
pub(crate) fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
) -> Result<Captured, RunError> {
    let mut child = command.spawn().map_err(RunError::Spawn)?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    match child.wait_timeout(timeout) {
        Ok(Some(status)) => Ok(Captured {
            status,
            stdout: collect(stdout)?,
            stderr: collect(stderr)?,
        }),
        Ok(None) => {
            reap(&mut child);
            Err(RunError::Timeout)
        }
        Err(err) => {
            reap(&mut child);
            Err(RunError::Io(err))
        }
    }
}

// Reader threads of a killed child are left to finish on their own: a
// grandchild may still hold the pipe open.
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<io::Result<Vec<u8>>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn collect(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> Result<Vec<u8>, RunError> {
    match handle {
        None => Ok(Vec::new()),
        Some(handle) => handle
            .join()
            .map_err(|_| RunError::Io(io::Error::other("pipe reader panicked")))?
            .map_err(RunError::Io),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    #[test]
    fn collects_output_larger_than_pipe_buffer() {
        let captured = run_with_timeout(
            &mut sh("head -c 200000 /dev/zero; head -c 150000 /dev/zero >&2"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(captured.status.success());
        assert_eq!(captured.stdout.len(), 200_000);
        assert_eq!(captured.stderr.len(), 150_000);
    }

    #[test]
    fn null_streams_come_back_empty() {
        let mut command = sh("echo hidden");
        command.stdout(Stdio::null());
        let captured = run_with_timeout(&mut command, Duration::from_secs(5)).unwrap();
        assert!(captured.stdout.is_empty());
    }

    #[test]
    fn slow_child_is_killed() {
        let err = run_with_timeout(&mut sh("sleep 5"), Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, RunError::Timeout), "{err:?}");
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run_with_timeout(
            &mut Command::new("screensplit-no-such-program"),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, RunError::Spawn(_)), "{err:?}");
    }
}
