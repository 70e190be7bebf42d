//! Bounded shellouts to local CLIs (`yt-dlp`).
//!
//! Goals:
//! - **Bounded**: timeouts + output caps to avoid hangs/huge output.
//! - **Killable**: a timed-out or abandoned child is killed, never leaked.
//! - **No secrets**: no env dumps; caller decides what to surface.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Max bytes of stderr kept for diagnostics.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

pub fn which(bin: &str) -> Option<PathBuf> {
    // Explicit paths are taken as-is.
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return p.is_file().then_some(p);
    }
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let cand = dir.join(bin);
        if cand.is_file() {
            return Some(cand);
        }
        if cfg!(windows) {
            let cand = dir.join(format!("{bin}.exe"));
            if cand.is_file() {
                return Some(cand);
            }
        }
    }
    None
}

pub fn has(bin: &str) -> bool {
    which(bin).is_some()
}

#[derive(Debug, Clone, Default)]
pub struct ShellOutput {
    pub stdout: Vec<u8>,
    /// True when stdout hit the cap and the rest was discarded.
    pub stdout_truncated: bool,
    pub stderr: String,
}

/// A failed shellout: a static code plus whatever the tool printed last on stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellError {
    pub code: &'static str,
    pub stderr_tail: String,
}

impl ShellError {
    fn new(code: &'static str) -> Self {
        Self {
            code,
            stderr_tail: String::new(),
        }
    }
}

impl std::fmt::Display for ShellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code)
    }
}

/// Read up to `cap` bytes, then drain the rest so the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(
    r: Option<R>,
    cap: usize,
) -> std::io::Result<(Vec<u8>, bool)> {
    let Some(mut r) = r else {
        return Ok((Vec::new(), false));
    };
    let mut buf = Vec::new();
    (&mut r).take(cap as u64).read_to_end(&mut buf).await?;
    let rest = tokio::io::copy(&mut r, &mut tokio::io::sink()).await?;
    Ok((buf, rest > 0))
}

/// Read to EOF keeping only the last `cap` bytes (tools print their final error last).
async fn read_tail<R: AsyncRead + Unpin>(r: Option<R>, cap: usize) -> std::io::Result<Vec<u8>> {
    let Some(mut r) = r else {
        return Ok(Vec::new());
    };
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = r.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        tail.extend_from_slice(&chunk[..n]);
        if tail.len() > cap * 2 {
            tail.drain(..tail.len() - cap);
        }
    }
    if tail.len() > cap {
        tail.drain(..tail.len() - cap);
    }
    Ok(tail)
}

/// Run a command to completion, capturing stdout (bounded) and a stderr tail.
///
/// Error codes: `shellout_tool_not_found`, `shellout_spawn_failed`, `shellout_read_failed`,
/// `shellout_wait_failed`, `shellout_nonzero_exit`, `shellout_timeout`. A nonzero exit carries
/// the stderr tail.
pub async fn run_bounded(
    mut cmd: Command,
    timeout: Duration,
    max_stdout_bytes: usize,
) -> Result<ShellOutput, ShellError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        ShellError::new(if e.kind() == std::io::ErrorKind::NotFound {
            "shellout_tool_not_found"
        } else {
            "shellout_spawn_failed"
        })
    })?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let work = async {
        let (out, err, status) = tokio::join!(
            read_capped(stdout, max_stdout_bytes),
            read_tail(stderr, STDERR_TAIL_BYTES),
            child.wait()
        );
        (out, err, status)
    };

    let res = tokio::time::timeout(timeout, work).await;
    let (out, err, status) = match res {
        Ok(v) => v,
        Err(_) => {
            let _ = child.kill().await;
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "shellout timed out");
            return Err(ShellError::new("shellout_timeout"));
        }
    };

    let status = status.map_err(|_| ShellError::new("shellout_wait_failed"))?;
    let (stdout, stdout_truncated) = out.map_err(|_| ShellError::new("shellout_read_failed"))?;
    let stderr = err
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default();

    if !status.success() {
        tracing::debug!(
            code = status.code(),
            stderr = %stderr.trim(),
            "shellout exited nonzero"
        );
        return Err(ShellError {
            code: "shellout_nonzero_exit",
            stderr_tail: stderr,
        });
    }
    Ok(ShellOutput {
        stdout,
        stdout_truncated,
        stderr,
    })
}
