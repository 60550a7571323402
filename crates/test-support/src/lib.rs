#![deny(unsafe_code)]

//! Shared test utilities for the upsync workspace.
//!
//! [`FakeRemote`] implements the [`Remote`] trait against a local directory
//! so the engine, tracker, and run coordinator can be exercised without a
//! live SSH session. Free space is a configurable number rather than a real
//! filesystem query, writes can be truncated on demand, renames can be made
//! to fail, and every `exec` call is recorded.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use upsync_remote::{
    ExecOutput, FileKind, HashAlgorithm, Remote, RemoteError, RemoteFileState, RemoteWriter,
};

/// Directory-backed fake implementation of [`Remote`].
pub struct FakeRemote {
    root: PathBuf,
    /// Value returned by `space_free`.
    pub space_free: u64,
    /// When set, `put_full` stops after this many bytes and reports a short
    /// write, leaving the truncated staging file behind.
    pub put_limit: Option<u64>,
    /// When `true`, every `rename` fails.
    pub fail_renames: bool,
    /// Scripted result for `exec` calls.
    pub exec_result: ExecOutput,
    /// Every command passed to `exec`, in order.
    pub exec_log: Vec<String>,
    /// Total bytes accepted by `put_full` and append writers.
    pub bytes_written: u64,
}

impl FakeRemote {
    /// Creates a fake session rooted at `root`. The directory does not have
    /// to exist; a missing root behaves like a missing remote base.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            space_free: u64::MAX / 2,
            put_limit: None,
            fail_renames: false,
            exec_result: ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                success: true,
            },
            exec_log: Vec::new(),
            bytes_written: 0,
        }
    }

    /// Absolute path of `path` inside the fake destination.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.as_os_str().is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    /// Reads the content currently stored at `path`.
    pub fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    /// Whether anything exists at `path`.
    pub fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    /// Writes `content` at `path`, creating parent directories.
    pub fn seed(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, content)
    }
}

impl Remote for FakeRemote {
    fn stat(&mut self, path: &Path) -> Result<Option<RemoteFileState>, RemoteError> {
        match fs::symlink_metadata(self.resolve(path)) {
            Ok(meta) => {
                let kind = if meta.is_file() {
                    FileKind::File
                } else if meta.is_dir() {
                    FileKind::Directory
                } else {
                    FileKind::Other
                };
                Ok(Some(RemoteFileState {
                    kind,
                    size: meta.len(),
                }))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(RemoteError::Io(err)),
        }
    }

    fn mkdir(&mut self, path: &Path) -> Result<(), RemoteError> {
        // Single level only, like the real operation: parent must exist.
        fs::create_dir(self.resolve(path)).map_err(RemoteError::Io)
    }

    fn open_append<'a>(
        &'a mut self,
        path: &Path,
    ) -> Result<Box<dyn RemoteWriter + 'a>, RemoteError> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.resolve(path))
            .map_err(RemoteError::Io)?;
        Ok(Box::new(FakeWriter {
            file,
            written: &mut self.bytes_written,
        }))
    }

    fn put_full(
        &mut self,
        src: &mut dyn Read,
        path: &Path,
        expected_size: u64,
    ) -> Result<u64, RemoteError> {
        let full = self.resolve(path);
        let mut dst = File::create(&full).map_err(RemoteError::Io)?;
        let written = match self.put_limit {
            Some(limit) => io::copy(&mut src.take(limit), &mut dst).map_err(RemoteError::Io)?,
            None => io::copy(src, &mut dst).map_err(RemoteError::Io)?,
        };
        self.bytes_written += written;
        if written == expected_size {
            Ok(written)
        } else {
            Err(RemoteError::ShortWrite {
                path: path.to_path_buf(),
                expected: expected_size,
                written,
            })
        }
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), RemoteError> {
        if self.fail_renames {
            return Err(RemoteError::CommandFailed {
                command: format!("mv -f -- {} {}", from.display(), to.display()),
                status: "exit status: 1".to_owned(),
                stderr: "injected rename failure".to_owned(),
            });
        }
        fs::rename(self.resolve(from), self.resolve(to)).map_err(RemoteError::Io)
    }

    fn space_free(&mut self, _path: &Path) -> Result<u64, RemoteError> {
        Ok(self.space_free)
    }

    fn content_hash(
        &mut self,
        path: &Path,
        _algo: HashAlgorithm,
        byte_limit: Option<u64>,
    ) -> Result<String, RemoteError> {
        let file = File::open(self.resolve(path)).map_err(RemoteError::Io)?;
        let mut hasher = Sha1::new();
        let mut reader: Box<dyn Read> = match byte_limit {
            // Like `head -c`: hash whatever the first N bytes turn out to be.
            Some(limit) => Box::new(file.take(limit)),
            None => Box::new(file),
        };
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf).map_err(RemoteError::Io)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        Ok(out)
    }

    fn exec(&mut self, command: &str) -> Result<ExecOutput, RemoteError> {
        self.exec_log.push(command.to_owned());
        Ok(self.exec_result.clone())
    }
}

struct FakeWriter<'a> {
    file: File,
    written: &'a mut u64,
}

impl Write for FakeWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        *self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl RemoteWriter for FakeWriter<'_> {
    fn finish(self: Box<Self>) -> Result<(), RemoteError> {
        self.file.sync_all().map_err(RemoteError::Io)
    }
}
