//! SSH-backed implementation of the [`Remote`] trait.
//!
//! The adapter spawns the system OpenSSH client for each operation and runs a
//! small, fixed set of POSIX commands on the destination: `stat -c` for
//! metadata, `mkdir` for directory creation, `cat >` / `cat >>` with piped
//! stdin for writes, `mv -f` for atomic rename, `df -kP` for free space, and
//! `sha1sum` (optionally behind `head -c`) for content digests. Command
//! arguments are single-quote escaped before being handed to the remote
//! shell.
//!
//! The transport is swappable: [`CommandTransport::local_shell`] routes the
//! same command set through `sh -c` against the local filesystem, which is
//! how the adapter's command construction and output parsing are exercised in
//! tests without a live server.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Output, Stdio};

use tracing::{debug, trace};

use crate::{
    ExecOutput, FileKind, HashAlgorithm, Remote, RemoteError, RemoteFileState, RemoteWriter,
};

/// Connection parameters for the spawned OpenSSH client.
#[derive(Clone, Debug)]
pub struct SshEndpoint {
    /// Destination host name or address.
    pub host: String,
    /// TCP port, when different from the client default.
    pub port: Option<u16>,
    /// Remote user name.
    pub user: Option<String>,
    /// Private key file passed via `-i`.
    pub identity: Option<PathBuf>,
}

/// Launches the program that carries remote commands to the destination.
#[derive(Clone, Debug)]
pub struct CommandTransport {
    argv: Vec<OsString>,
}

impl CommandTransport {
    /// Transport over the system OpenSSH client.
    ///
    /// `BatchMode=yes` is forced so an unattended run fails fast instead of
    /// prompting for credentials.
    #[must_use]
    pub fn ssh(endpoint: &SshEndpoint) -> Self {
        let mut argv: Vec<OsString> = vec!["ssh".into(), "-o".into(), "BatchMode=yes".into()];
        if let Some(port) = endpoint.port {
            argv.push("-p".into());
            argv.push(port.to_string().into());
        }
        if let Some(identity) = &endpoint.identity {
            argv.push("-i".into());
            argv.push(identity.clone().into_os_string());
        }
        let destination = match &endpoint.user {
            Some(user) => format!("{user}@{}", endpoint.host),
            None => endpoint.host.clone(),
        };
        argv.push(destination.into());
        Self { argv }
    }

    /// Transport that runs the command set through `sh -c` on the local
    /// machine.
    ///
    /// Useful for mirroring into a locally mounted destination and for
    /// integration tests of the adapter itself.
    #[must_use]
    pub fn local_shell() -> Self {
        Self {
            argv: vec!["sh".into(), "-c".into()],
        }
    }

    fn command(&self, remote_command: &str) -> Command {
        let mut command = Command::new(&self.argv[0]);
        command.args(&self.argv[1..]);
        command.arg(remote_command);
        command
    }
}

/// [`Remote`] implementation over a [`CommandTransport`].
///
/// All trait paths are resolved against the base directory supplied at
/// construction; the empty path names the base itself.
pub struct SshRemote {
    transport: CommandTransport,
    base: PathBuf,
}

impl SshRemote {
    /// Creates a session rooted at `base` on the destination.
    #[must_use]
    pub fn new(transport: CommandTransport, base: PathBuf) -> Self {
        Self { transport, base }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.as_os_str().is_empty() {
            self.base.clone()
        } else {
            self.base.join(path)
        }
    }

    fn quoted(&self, path: &Path) -> String {
        sh_quote(&self.resolve(path).to_string_lossy())
    }

    fn run(&self, remote_command: &str) -> Result<Output, RemoteError> {
        trace!(command = remote_command, "remote round-trip");
        self.transport
            .command(remote_command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(RemoteError::Spawn)
    }

    fn run_checked(&self, remote_command: &str) -> Result<Output, RemoteError> {
        let output = self.run(remote_command)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(command_failed(remote_command, &output))
        }
    }
}

impl Remote for SshRemote {
    fn stat(&mut self, path: &Path) -> Result<Option<RemoteFileState>, RemoteError> {
        let command = format!("LC_ALL=C stat -c '%s %F' -- {}", self.quoted(path));
        let output = self.run(&command)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such file or directory") {
                return Ok(None);
            }
            return Err(command_failed(&command, &output));
        }
        parse_stat(&command, &String::from_utf8_lossy(&output.stdout)).map(Some)
    }

    fn mkdir(&mut self, path: &Path) -> Result<(), RemoteError> {
        let command = format!("mkdir -- {}", self.quoted(path));
        self.run_checked(&command).map(|_| ())
    }

    fn open_append<'a>(
        &'a mut self,
        path: &Path,
    ) -> Result<Box<dyn RemoteWriter + 'a>, RemoteError> {
        let command = format!("cat >> {}", self.quoted(path));
        let mut child = self
            .transport
            .command(&command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RemoteError::Spawn)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RemoteError::Io(io::Error::other("transport stdin unavailable")))?;
        Ok(Box::new(PipeWriter {
            command,
            child,
            stdin: Some(stdin),
        }))
    }

    fn put_full(
        &mut self,
        src: &mut dyn Read,
        path: &Path,
        expected_size: u64,
    ) -> Result<u64, RemoteError> {
        let command = format!("cat > {}", self.quoted(path));
        let mut child = self
            .transport
            .command(&command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RemoteError::Spawn)?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RemoteError::Io(io::Error::other("transport stdin unavailable")))?;
        let copied = io::copy(src, &mut stdin);
        drop(stdin);
        let output = child.wait_with_output().map_err(RemoteError::Io)?;
        if !output.status.success() {
            return Err(command_failed(&command, &output));
        }
        let written = copied?;
        // Trust the destination, not the pipe: re-stat to confirm the size.
        let landed = self
            .stat(path)?
            .map_or(0, |state| state.size);
        if landed != expected_size {
            return Err(RemoteError::ShortWrite {
                path: path.to_path_buf(),
                expected: expected_size,
                written: landed,
            });
        }
        debug!(path = %path.display(), bytes = written, "full write complete");
        Ok(landed)
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), RemoteError> {
        let command = format!("mv -f -- {} {}", self.quoted(from), self.quoted(to));
        self.run_checked(&command).map(|_| ())
    }

    fn space_free(&mut self, path: &Path) -> Result<u64, RemoteError> {
        let command = format!("LC_ALL=C df -kP -- {}", self.quoted(path));
        let output = self.run_checked(&command)?;
        parse_df(&command, &String::from_utf8_lossy(&output.stdout))
    }

    fn content_hash(
        &mut self,
        path: &Path,
        algo: HashAlgorithm,
        byte_limit: Option<u64>,
    ) -> Result<String, RemoteError> {
        let command = match byte_limit {
            Some(limit) => format!(
                "head -c {limit} -- {} | {}",
                self.quoted(path),
                algo.command()
            ),
            None => format!("{} -- {}", algo.command(), self.quoted(path)),
        };
        let output = self.run_checked(&command)?;
        parse_digest(&command, &String::from_utf8_lossy(&output.stdout), algo)
    }

    fn exec(&mut self, command: &str) -> Result<ExecOutput, RemoteError> {
        let output = self.run(command)?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }
}

/// Append stream backed by the transport subprocess's stdin pipe.
struct PipeWriter {
    command: String,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.stdin {
            Some(stdin) => stdin.write(buf),
            None => Err(io::Error::other("append stream already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.stdin {
            Some(stdin) => stdin.flush(),
            None => Ok(()),
        }
    }
}

impl RemoteWriter for PipeWriter {
    fn finish(mut self: Box<Self>) -> Result<(), RemoteError> {
        // Closing stdin signals EOF; the remote `cat` then exits. The child
        // stays in place for Drop, so stderr and status are collected by
        // hand instead of through `wait_with_output`.
        drop(self.stdin.take());
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = self.child.wait().map_err(RemoteError::Io)?;
        if status.success() {
            Ok(())
        } else {
            Err(RemoteError::CommandFailed {
                command: self.command.clone(),
                status: status.to_string(),
                stderr: stderr.trim().to_owned(),
            })
        }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            // Abandoned mid-transfer; reap the child so it does not linger.
            let _ = self.child.wait();
        }
    }
}

/// Escapes one shell word using single quotes.
fn sh_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '+'));
    if plain {
        word.to_owned()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

fn command_failed(command: &str, output: &Output) -> RemoteError {
    RemoteError::CommandFailed {
        command: command.to_owned(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
    }
}

/// Parses `stat -c '%s %F'` output, e.g. `1024 regular file`.
fn parse_stat(command: &str, stdout: &str) -> Result<RemoteFileState, RemoteError> {
    let line = stdout.trim();
    let malformed = || RemoteError::Parse {
        command: command.to_owned(),
        output: line.to_owned(),
    };
    let (size, kind) = line.split_once(' ').ok_or_else(malformed)?;
    let size: u64 = size.parse().map_err(|_| malformed())?;
    let kind = match kind {
        "directory" => FileKind::Directory,
        k if k.starts_with("regular") => FileKind::File,
        _ => FileKind::Other,
    };
    Ok(RemoteFileState { kind, size })
}

/// Parses `df -kP` output, returning the available space in bytes.
fn parse_df(command: &str, stdout: &str) -> Result<u64, RemoteError> {
    let malformed = |line: &str| RemoteError::Parse {
        command: command.to_owned(),
        output: line.to_owned(),
    };
    let line = stdout
        .lines()
        .last()
        .ok_or_else(|| malformed(stdout.trim()))?;
    // Filesystem / 1024-blocks / Used / Available / Capacity / Mounted on
    let available = line
        .split_whitespace()
        .nth(3)
        .ok_or_else(|| malformed(line))?;
    let kibibytes: u64 = available.parse().map_err(|_| malformed(line))?;
    Ok(kibibytes.saturating_mul(1024))
}

/// Extracts the hex digest from `sha1sum`-style output.
fn parse_digest(
    command: &str,
    stdout: &str,
    algo: HashAlgorithm,
) -> Result<String, RemoteError> {
    let malformed = || RemoteError::Parse {
        command: command.to_owned(),
        output: stdout.trim().to_owned(),
    };
    let digest = stdout.split_whitespace().next().ok_or_else(malformed)?;
    if digest.len() != algo.hex_len() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed());
    }
    Ok(digest.to_ascii_lowercase())
}
