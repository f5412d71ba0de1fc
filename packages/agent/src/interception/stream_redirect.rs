// packages/agent/src/interception/stream_redirect.rs
//! Descriptor-level stream capture (unix)
//!
//! The target descriptor is pointed at a pipe. A reader thread copies
//! everything to a saved duplicate of the original descriptor and hands the
//! same bytes to a sink.

use crate::capture::StreamTag;
use crate::utils::errors::{AgentError, Result};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{FromRawFd, RawFd};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// A live descriptor redirection
pub struct StreamRedirect {
    fd: RawFd,
    stream: StreamTag,
    reader: Option<JoinHandle<()>>,
}

impl StreamRedirect {
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn stream(&self) -> StreamTag {
        self.stream
    }

    /// Wait for the reader to drain; returns once every writer of the
    /// redirected descriptor has closed it
    pub fn join(mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn check(ret: libc::c_int, what: &str) -> Result<libc::c_int> {
    if ret < 0 {
        Err(AgentError::InterceptionFailed(format!(
            "{} failed: {}",
            what,
            io::Error::last_os_error()
        )))
    } else {
        Ok(ret)
    }
}

/// Point `fd` at a pipe and tee its output to the original and to `sink`
pub fn redirect_fd<F>(fd: RawFd, stream: StreamTag, sink: F) -> Result<StreamRedirect>
where
    F: Fn(StreamTag, &[u8]) + Send + 'static,
{
    let mut pipe = [0 as libc::c_int; 2];

    let saved = check(unsafe { libc::dup(fd) }, "dup")?;
    if let Err(e) = check(unsafe { libc::pipe(pipe.as_mut_ptr()) }, "pipe") {
        unsafe { libc::close(saved) };
        return Err(e);
    }
    let (read_end, write_end) = (pipe[0], pipe[1]);

    if let Err(e) = check(unsafe { libc::dup2(write_end, fd) }, "dup2") {
        unsafe {
            libc::close(saved);
            libc::close(read_end);
            libc::close(write_end);
        }
        return Err(e);
    }
    unsafe { libc::close(write_end) };

    // Both descriptors are now owned by the reader thread
    let mut source = unsafe { File::from_raw_fd(read_end) };
    let mut original = unsafe { File::from_raw_fd(saved) };

    let reader = thread::Builder::new()
        .name(format!("periscope-{}", stream.as_str()))
        .spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match source.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let _ = original.write_all(&buf[..n]);
                        sink(stream, &buf[..n]);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            let _ = original.flush();
        })
        .map_err(|e| AgentError::InterceptionFailed(format!("Reader thread: {}", e)))?;

    info!("Redirected fd {} ({}) through capture pipe", fd, stream.as_str());
    debug!("Saved original descriptor as fd {}", saved);

    Ok(StreamRedirect {
        fd,
        stream,
        reader: Some(reader),
    })
}
