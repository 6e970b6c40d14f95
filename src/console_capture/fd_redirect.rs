//! Points the process stdout or stderr descriptor at a pipe for as long as
//! capture runs, so output that never goes through a `CapturedWriter` is
//! classified too.

use std::fs::File;
use std::io;

use super::StreamKind;

#[cfg(unix)]
pub(super) use unix::FdRedirect;

#[cfg(not(unix))]
pub(super) struct FdRedirect;

#[cfg(not(unix))]
impl FdRedirect {
    pub(super) fn install<F>(_kind: StreamKind, _sink: F) -> io::Result<(Self, File)>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "descriptor redirection needs a unix platform",
        ))
    }

    pub(super) fn restore(&mut self) {}
}

#[cfg(unix)]
mod unix {
    use std::io::{Read, Write};
    use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    use super::*;

    // A child that inherited the descriptor can keep the pipe open.
    const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

    pub(in crate::console_capture) struct FdRedirect {
        kind: StreamKind,
        saved: Option<OwnedFd>,
        reader: Option<JoinHandle<()>>,
    }

    fn target_fd(kind: StreamKind) -> RawFd {
        match kind {
            StreamKind::Stdout => io::stdout().as_raw_fd(),
            StreamKind::Stderr => io::stderr().as_raw_fd(),
        }
    }

    fn duplicate(kind: StreamKind) -> io::Result<OwnedFd> {
        match kind {
            StreamKind::Stdout => io::stdout().as_fd().try_clone_to_owned(),
            StreamKind::Stderr => io::stderr().as_fd().try_clone_to_owned(),
        }
    }

    fn flush_std(kind: StreamKind) {
        let _ = match kind {
            StreamKind::Stdout => io::stdout().flush(),
            StreamKind::Stderr => io::stderr().flush(),
        };
    }

    fn point(from: RawFd, target: RawFd) -> io::Result<()> {
        // SAFETY: dup2 only reads the descriptor numbers; both are open here.
        if unsafe { libc::dup2(from, target) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    impl FdRedirect {
        /// Redirect `kind` into a pipe drained into `sink` on a reader thread.
        /// Also returns a handle on the original stream for the tee.
        pub(in crate::console_capture) fn install<F>(kind: StreamKind, mut sink: F) -> io::Result<(Self, File)>
        where
            F: FnMut(&[u8]) + Send + 'static,
        {
            flush_std(kind);
            let saved = duplicate(kind)?;
            let tee = File::from(saved.try_clone()?);
            let (mut reader, writer) = os_pipe::pipe()?;
            point(writer.as_raw_fd(), target_fd(kind))?;
            drop(writer);

            let spawned = thread::Builder::new()
                .name(format!("{}-capture", kind.source()))
                .spawn(move || {
                    let mut buf = [0u8; 4096];
                    loop {
                        match reader.read(&mut buf) {
                            Ok(0) => break,
                            Ok(n) => sink(&buf[..n]),
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                            Err(_) => break,
                        }
                    }
                });
            let reader = match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    point(saved.as_raw_fd(), target_fd(kind))?;
                    return Err(e);
                }
            };

            tracing::debug!(stream = kind.source(), "descriptor redirected");
            let redirect = Self {
                kind,
                saved: Some(saved),
                reader: Some(reader),
            };
            Ok((redirect, tee))
        }

        /// Put the original descriptor back and let the reader drain what is
        /// left in the pipe. Idempotent.
        pub(in crate::console_capture) fn restore(&mut self) {
            let Some(saved) = self.saved.take() else { return };
            flush_std(self.kind);
            if let Err(e) = point(saved.as_raw_fd(), target_fd(self.kind)) {
                tracing::error!(stream = self.kind.source(), notify = false, "cannot restore descriptor: {e}");
            }
            drop(saved);

            let Some(reader) = self.reader.take() else { return };
            let deadline = Instant::now() + DRAIN_TIMEOUT;
            while !reader.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if reader.is_finished() {
                let _ = reader.join();
            } else {
                tracing::debug!(stream = self.kind.source(), "pipe still held open, detaching reader");
            }
        }
    }

    impl Drop for FdRedirect {
        fn drop(&mut self) {
            self.restore();
        }
    }
}
