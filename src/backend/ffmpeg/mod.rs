//! Backends on the system `ffmpeg`, `ffprobe` and `x265` binaries.
//!
//! The binaries are driven over pipes rather than linked, so no native FFmpeg or x265 headers or
//! libraries are needed at build time.

pub(crate) mod mkv;
pub(crate) mod reader;
pub(crate) mod writer;

pub use reader::FfmpegReader;
pub use writer::{EncoderOpts, FfmpegWriter, FfmpegWriterOpts};

use std::io::Read as _;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use crate::foundation::error::{SpatialError, SpatialResult};

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    tool_runs("ffmpeg")
}

/// Return `true` when `ffprobe` can be invoked from `PATH`.
pub fn is_ffprobe_on_path() -> bool {
    tool_runs("ffprobe")
}

/// Return `true` when `program` is an `x265` build with multiview (MV-HEVC) encoding.
pub fn is_multiview_x265(program: &str) -> bool {
    Command::new(program)
        .arg("--fullhelp")
        .stdin(Stdio::null())
        .output()
        .map(|out| {
            String::from_utf8_lossy(&out.stdout).contains("--num-views")
                || String::from_utf8_lossy(&out.stderr).contains("--num-views")
        })
        .unwrap_or(false)
}

fn tool_runs(name: &str) -> bool {
    Command::new(name)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> SpatialResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Run `ffmpeg` to completion with `args`, failing with its stderr on a non-zero exit.
pub(crate) fn run_ffmpeg<I, S>(what: &str, args: I) -> SpatialResult<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let out = Command::new("ffmpeg")
        .args(["-hide_banner", "-nostdin", "-loglevel", "error"])
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            SpatialError::evaluation(format!(
                "failed to spawn ffmpeg for {what} (is it installed and on PATH?): {e}"
            ))
        })?;
    if !out.status.success() {
        return Err(SpatialError::evaluation(format!(
            "ffmpeg {what} exited with status {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(())
}

/// A long-running tool child with its stderr drained on a side thread.
///
/// Dropping a process that was not [`finish`](ToolProcess::finish)ed kills it.
pub(crate) struct ToolProcess {
    program: String,
    what: &'static str,
    child: Option<Child>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl ToolProcess {
    /// Spawn `cmd`. Its stderr is always captured; stdin/stdout are whatever the caller set.
    pub(crate) fn spawn(what: &'static str, mut cmd: Command) -> SpatialResult<Self> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        cmd.stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| {
            SpatialError::evaluation(format!(
                "failed to spawn {program} {what} (is it installed and on PATH?): {e}"
            ))
        })?;

        let mut stderr = child.stderr.take().ok_or_else(|| {
            SpatialError::evaluation(format!("failed to open {program} {what} stderr (unexpected)"))
        })?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        Ok(Self {
            program,
            what,
            child: Some(child),
            stderr_drain: Some(stderr_drain),
        })
    }

    pub(crate) fn take_stdin(&mut self) -> SpatialResult<ChildStdin> {
        self.child
            .as_mut()
            .and_then(|c| c.stdin.take())
            .ok_or_else(|| {
                SpatialError::evaluation(format!("failed to open {} {} stdin", self.program, self.what))
            })
    }

    pub(crate) fn take_stdout(&mut self) -> SpatialResult<ChildStdout> {
        self.child
            .as_mut()
            .and_then(|c| c.stdout.take())
            .ok_or_else(|| {
                SpatialError::evaluation(format!(
                    "failed to open {} {} stdout",
                    self.program, self.what
                ))
            })
    }

    /// Wait for exit. Pipes handed out earlier must already be closed by the caller.
    pub(crate) fn finish(&mut self) -> SpatialResult<()> {
        let mut child = self.child.take().ok_or_else(|| {
            SpatialError::evaluation(format!("{} {} already finished", self.program, self.what))
        })?;
        let status = child.wait().map_err(|e| {
            SpatialError::evaluation(format!(
                "failed to wait for {} {}: {e}",
                self.program, self.what
            ))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SpatialError::evaluation("stderr drain thread panicked"))?
                .map_err(|e| {
                    SpatialError::evaluation(format!("{} stderr read failed: {e}", self.program))
                })?,
            None => Vec::new(),
        };

        if !status.success() {
            return Err(SpatialError::evaluation(format!(
                "{} {} exited with status {}: {}",
                self.program,
                self.what,
                status,
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }
        Ok(())
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Read until `buf` is full or EOF. Returns the number of bytes read.
pub(crate) fn read_full(r: &mut impl std::io::Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
