// packages/agent/src/interception/console.rs
//! Console interceptor
//!
//! Every write is handed to the original stream first, then split into
//! lines. Partial lines stay buffered per stream until their newline
//! arrives. Sequence numbers are shared by both streams and assigned under
//! the pending lock; completed lines queue up behind it and are published to
//! the store in sequence order by whichever writer holds the publish lock.
//! Writers never wait on store subscribers.

use crate::capture::{CaptureStore, ConsoleLine, StreamTag};
use crate::interception::Interceptor;
use crate::redirect::{Original, RedirectionTable};
use crate::registry::features::InterceptorId;
use crate::utils::errors::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use tracing::debug;

/// Entry point for standard output writes
pub const STDOUT_ENTRY_POINT: &str = "console.stdout";

/// Entry point for standard error writes
pub const STDERR_ENTRY_POINT: &str = "console.stderr";

/// Hook id for descriptor-level capture
pub const FD_HOOK: &str = "console.fds";

thread_local! {
    // Set while this thread is appending console lines
    static INGESTING: Cell<bool> = Cell::new(false);
}

pub(crate) fn entry_point(stream: StreamTag) -> &'static str {
    match stream {
        StreamTag::Stdout => STDOUT_ENTRY_POINT,
        StreamTag::Stderr => STDERR_ENTRY_POINT,
    }
}

#[derive(Default)]
struct PendingLines {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    next_sequence: u64,

    /// Completed lines not yet in the store, in sequence order
    ready: VecDeque<ConsoleLine>,
}

impl PendingLines {
    fn buffer(&mut self, stream: StreamTag) -> &mut Vec<u8> {
        match stream {
            StreamTag::Stdout => &mut self.stdout,
            StreamTag::Stderr => &mut self.stderr,
        }
    }

    fn complete(&mut self, stream: StreamTag, raw: &[u8]) {
        self.next_sequence += 1;
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = ConsoleLine {
            stream,
            text: String::from_utf8_lossy(raw).into_owned(),
            sequence: self.next_sequence,
        };
        self.ready.push_back(line);
    }
}

pub(crate) struct ConsoleState {
    store: Arc<CaptureStore<ConsoleLine>>,
    pending: Mutex<PendingLines>,
    publish: Mutex<()>,
}

impl ConsoleState {
    fn new(store: Arc<CaptureStore<ConsoleLine>>) -> Self {
        Self {
            store,
            pending: Mutex::new(PendingLines::default()),
            publish: Mutex::new(()),
        }
    }

    /// Capture every complete line in `bytes`.
    ///
    /// Writes made from inside a store subscriber on this thread are passed
    /// through uncaptured.
    pub(crate) fn ingest(&self, stream: StreamTag, bytes: &[u8]) {
        if INGESTING.with(|flag| flag.replace(true)) {
            return;
        }

        {
            let mut pending = self.pending.lock();
            pending.buffer(stream).extend_from_slice(bytes);

            while let Some(newline) = pending.buffer(stream).iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = pending.buffer(stream).drain(..=newline).collect();
                pending.complete(stream, &raw[..newline]);
            }
        }
        self.publish_ready();

        INGESTING.with(|flag| flag.set(false));
    }

    fn flush_partial(&self) -> usize {
        if INGESTING.with(|flag| flag.replace(true)) {
            return 0;
        }

        let mut flushed = 0;
        {
            let mut pending = self.pending.lock();
            for stream in [StreamTag::Stdout, StreamTag::Stderr] {
                let raw = std::mem::take(pending.buffer(stream));
                if !raw.is_empty() {
                    pending.complete(stream, &raw);
                    flushed += 1;
                }
            }
        }
        self.publish_ready();

        INGESTING.with(|flag| flag.set(false));
        flushed
    }

    // Only one thread appends at a time. A writer that finds the publish lock
    // taken leaves its lines to the holder, which re-checks the queue after
    // releasing the lock.
    fn publish_ready(&self) {
        loop {
            let Some(order) = self.publish.try_lock() else {
                return;
            };
            loop {
                let next = self.pending.lock().ready.pop_front();
                match next {
                    Some(line) => {
                        self.store.append(line);
                    }
                    None => break,
                }
            }
            drop(order);

            if self.pending.lock().ready.is_empty() {
                return;
            }
        }
    }
}

/// Console interceptor
#[derive(Clone)]
pub struct ConsoleInterceptor {
    state: Arc<ConsoleState>,
    capture_fds: bool,
    #[cfg(unix)]
    redirects: Arc<Mutex<Vec<crate::interception::stream_redirect::StreamRedirect>>>,
}

impl ConsoleInterceptor {
    pub fn new(store: Arc<CaptureStore<ConsoleLine>>, capture_fds: bool) -> Self {
        Self {
            state: Arc::new(ConsoleState::new(store)),
            capture_fds,
            #[cfg(unix)]
            redirects: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Capture bytes written to `stream` outside the entry points
    pub fn ingest(&self, stream: StreamTag, bytes: &[u8]) {
        self.state.ingest(stream, bytes);
    }

    /// Emit buffered text that has no trailing newline yet
    pub fn flush_partial(&self) -> usize {
        self.state.flush_partial()
    }

    fn install_entry_points(&self, table: &RedirectionTable) -> Result<bool> {
        let mut installed = false;
        for stream in [StreamTag::Stdout, StreamTag::Stderr] {
            let state = Arc::clone(&self.state);
            installed |= table.install(
                entry_point(stream),
                InterceptorId::Console.as_str(),
                move |original: &Original<Bytes, ()>, bytes: Bytes| {
                    original.call(bytes.clone());
                    state.ingest(stream, &bytes);
                },
            )?;
        }
        Ok(installed)
    }

    #[cfg(unix)]
    fn install_fd_capture(&self, table: &RedirectionTable) -> Result<bool> {
        use crate::interception::stream_redirect::redirect_fd;

        table.install_hook(FD_HOOK, InterceptorId::Console.as_str(), || {
            let mut redirects = Vec::with_capacity(2);
            for (fd, stream) in [
                (libc::STDOUT_FILENO, StreamTag::Stdout),
                (libc::STDERR_FILENO, StreamTag::Stderr),
            ] {
                let state = Arc::clone(&self.state);
                redirects.push(redirect_fd(fd, stream, move |tag, bytes| {
                    state.ingest(tag, bytes)
                })?);
            }
            self.redirects.lock().extend(redirects);
            Ok(())
        })
    }
}

impl Interceptor for ConsoleInterceptor {
    fn id(&self) -> InterceptorId {
        InterceptorId::Console
    }

    fn enable(&self, table: &RedirectionTable) -> Result<bool> {
        // Descriptor capture already sees entry-point writes
        #[cfg(unix)]
        if self.capture_fds {
            debug!("Capturing console output at the descriptor level");
            return self.install_fd_capture(table);
        }

        #[cfg(not(unix))]
        if self.capture_fds {
            tracing::warn!("Descriptor capture is only available on unix");
        }

        self.install_entry_points(table)
    }
}

/// `io::Write` adapter that writes through a console entry point
pub struct ConsoleWriter {
    table: Arc<RedirectionTable>,
    stream: StreamTag,
}

impl ConsoleWriter {
    pub fn new(table: Arc<RedirectionTable>, stream: StreamTag) -> Self {
        Self { table, stream }
    }

    pub fn stdout(table: Arc<RedirectionTable>) -> Self {
        Self::new(table, StreamTag::Stdout)
    }

    pub fn stderr(table: Arc<RedirectionTable>) -> Self {
        Self::new(table, StreamTag::Stderr)
    }
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.table
            .call::<Bytes, ()>(entry_point(self.stream), Bytes::copy_from_slice(buf))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn recording_table() -> (Arc<RedirectionTable>, Arc<Mutex<Vec<(StreamTag, Vec<u8>)>>>) {
        let table = Arc::new(RedirectionTable::new());
        let written = Arc::new(Mutex::new(Vec::new()));
        for stream in [StreamTag::Stdout, StreamTag::Stderr] {
            let sink = Arc::clone(&written);
            table
                .register(entry_point(stream), move |bytes: Bytes| {
                    sink.lock().push((stream, bytes.to_vec()));
                })
                .unwrap();
        }
        (table, written)
    }

    fn interceptor() -> (ConsoleInterceptor, Arc<CaptureStore<ConsoleLine>>) {
        let store = Arc::new(CaptureStore::with_capacity(100));
        (ConsoleInterceptor::new(Arc::clone(&store), false), store)
    }

    #[test]
    fn test_lines_duplicated_to_original_and_store() {
        let (table, written) = recording_table();
        let (interceptor, store) = interceptor();
        assert!(interceptor.enable(&table).unwrap());

        writeln!(ConsoleWriter::stdout(Arc::clone(&table)), "hello").unwrap();
        writeln!(ConsoleWriter::stderr(Arc::clone(&table)), "oops").unwrap();

        let lines: Vec<ConsoleLine> = store.snapshot().iter().map(|c| (*c.payload).clone()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].stream, StreamTag::Stdout);
        assert_eq!(lines[0].text, "hello");
        assert_eq!(lines[1].stream, StreamTag::Stderr);
        assert!(lines[0].sequence < lines[1].sequence);

        let written = written.lock();
        assert_eq!(written[0], (StreamTag::Stdout, b"hello\n".to_vec()));
        assert_eq!(written[1], (StreamTag::Stderr, b"oops\n".to_vec()));
    }

    #[test]
    fn test_partial_lines_buffered() {
        let (interceptor, store) = interceptor();
        interceptor.ingest(StreamTag::Stdout, b"par");
        interceptor.ingest(StreamTag::Stderr, b"err line\r\n");
        assert_eq!(store.len(), 1);

        interceptor.ingest(StreamTag::Stdout, b"tial\nnext");
        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].payload.text, "err line");
        assert_eq!(snapshot[1].payload.text, "partial");

        assert_eq!(interceptor.flush_partial(), 1);
        assert_eq!(store.snapshot()[2].payload.text, "next");
        assert_eq!(interceptor.flush_partial(), 0);
    }

    #[test]
    fn test_multiple_lines_in_one_write() {
        let (interceptor, store) = interceptor();
        interceptor.ingest(StreamTag::Stdout, b"a\nb\n\nc\n");

        let texts: Vec<String> = store.snapshot().iter().map(|c| c.payload.text.clone()).collect();
        assert_eq!(texts, vec!["a", "b", "", "c"]);
    }

    #[test]
    fn test_subscriber_writes_not_recaptured() {
        let (table, written) = recording_table();
        let (interceptor, store) = interceptor();
        interceptor.enable(&table).unwrap();

        let echo = Arc::clone(&table);
        store.subscribe(move |_| {
            let _ = echo.call::<Bytes, ()>(STDERR_ENTRY_POINT, Bytes::from_static(b"echo\n"));
        });

        writeln!(ConsoleWriter::stdout(Arc::clone(&table)), "once").unwrap();
        assert_eq!(store.len(), 1);
        // The echo still reached the real stream
        assert_eq!(written.lock().len(), 2);
    }

    #[test]
    fn test_subscriber_waiting_on_another_writer() {
        let (interceptor, store) = interceptor();
        let helper = interceptor.clone();
        let handed_off = Arc::new(std::sync::atomic::AtomicBool::new(false));

        // A subscriber that hands work to another thread and waits for it,
        // while that thread writes to the console
        let flag = Arc::clone(&handed_off);
        store.subscribe(move |_| {
            if flag.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            let writer = helper.clone();
            let (done_tx, done_rx) = crossbeam_channel::bounded(1);
            std::thread::spawn(move || {
                writer.ingest(StreamTag::Stderr, b"from helper\n");
                let _ = done_tx.send(());
            });
            assert!(done_rx
                .recv_timeout(std::time::Duration::from_secs(5))
                .is_ok());
        });

        interceptor.ingest(StreamTag::Stdout, b"from host\n");

        let lines: Vec<ConsoleLine> = store.snapshot().iter().map(|c| (*c.payload).clone()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "from host");
        assert_eq!(lines[1].text, "from helper");
        assert!(lines[0].sequence < lines[1].sequence);
    }

    #[test]
    fn test_concurrent_writers_keep_sequence_order() {
        let (table, _) = recording_table();
        let (interceptor, store) = interceptor();
        interceptor.enable(&table).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let t = Arc::clone(&table);
                std::thread::spawn(move || {
                    let mut out = ConsoleWriter::stdout(t);
                    for j in 0..20 {
                        writeln!(out, "worker {} line {}", i, j).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sequences: Vec<u64> = store.snapshot().iter().map(|c| c.payload.sequence).collect();
        assert_eq!(sequences.len(), 80);
        assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
