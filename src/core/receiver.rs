//! Shell receive loop
//!
//! Polls the open channel, cleans the bytes through the escape filter and
//! hands coalesced fragments to the UI through the message pool.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::filter::EscapeFilter;
use super::transport::{ReadOutcome, ShellTransport};
use crate::config::TimingConfig;
use crate::ui::markup;
use crate::ui::surface::UiHandle;

/// Size of a single channel read
pub const READ_BUFFER_SIZE: usize = 4096;

/// Why the receive loop returned
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    /// The run flag was cleared
    Stopped,
    /// The remote side closed the channel
    Eof,
    /// Hard channel error
    Error(String),
}

/// Cleaned text waiting to be flushed to the UI
///
/// A flush is due once `threshold` bytes are pending or the interval has
/// elapsed, whichever comes first. `cap` is a backstop: past it the oldest
/// text is dropped, cutting only between markup tokens.
#[derive(Debug)]
pub struct FlushBuffer {
    text: String,
    threshold: usize,
    cap: usize,
    keep: usize,
    interval: Duration,
    last_flush: Option<Instant>,
}

impl FlushBuffer {
    pub fn new(threshold: usize, cap: usize, keep: usize, interval: Duration) -> Self {
        Self {
            text: String::with_capacity(cap),
            threshold: threshold.max(1),
            cap: cap.max(1),
            keep: keep.min(cap),
            interval,
            last_flush: None,
        }
    }

    /// Append cleaned text; the oldest bytes go when the cap is exceeded.
    ///
    /// The buffer and `fragment` must both start on a markup token boundary.
    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        if self.text.len() > self.cap {
            let start = markup::token_boundary(&self.text, self.text.len() - self.keep);
            tracing::debug!("flush buffer overflow, dropping {} bytes", start);
            self.text.drain(..start);
        }
    }

    /// Bytes that fit before the size threshold is reached
    pub fn room(&self) -> usize {
        self.threshold.saturating_sub(self.text.len())
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// True when there is pending text and either the size threshold is
    /// reached or the flush interval has elapsed
    pub fn is_due(&self, now: Instant) -> bool {
        if self.text.is_empty() {
            return false;
        }
        self.text.len() >= self.threshold
            || self
                .last_flush
                .map_or(true, |last| now.duration_since(last) >= self.interval)
    }

    /// Hand the pending text to the UI and empty the buffer
    pub fn flush(&mut self, ui: &UiHandle, now: Instant) {
        if !ui.text(&self.text) {
            tracing::trace!("dropped {} bytes of shell output", self.text.len());
        }
        self.text.clear();
        self.last_flush = Some(now);
    }
}

/// Format a byte total as `N B`, `N.N KB` or `N.NN MB`
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    }
}

/// The loop itself, moved onto its own thread by the session
pub struct ReceiveLoop {
    shell: Arc<Mutex<Box<dyn ShellTransport>>>,
    running: Arc<AtomicBool>,
    bytes: Arc<AtomicU64>,
    ui: UiHandle,
    filter: EscapeFilter,
    buffer: FlushBuffer,
    poll_interval: Duration,
}

impl ReceiveLoop {
    pub fn new(
        shell: Arc<Mutex<Box<dyn ShellTransport>>>,
        running: Arc<AtomicBool>,
        bytes: Arc<AtomicU64>,
        ui: UiHandle,
        filter: EscapeFilter,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            shell,
            running,
            bytes,
            ui,
            filter,
            buffer: FlushBuffer::new(
                timing.flush_threshold,
                timing.flush_cap,
                timing.flush_keep,
                timing.flush_interval(),
            ),
            poll_interval: timing.poll_interval(),
        }
    }

    /// Run until the run flag clears or the channel ends
    pub fn run(mut self) -> LoopExit {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut cleaned = String::with_capacity(READ_BUFFER_SIZE);

        let exit = loop {
            if !self.running.load(Ordering::SeqCst) {
                break LoopExit::Stopped;
            }

            let outcome = self.shell.lock().read_nonblocking(&mut buf);
            match outcome {
                ReadOutcome::Data(n) if n > 0 => {
                    self.bytes.fetch_add(n as u64, Ordering::Relaxed);
                    self.filter.filter_into(&buf[..n], &mut cleaned);
                    self.ingest(&cleaned);
                    cleaned.clear();
                }
                ReadOutcome::Data(_) | ReadOutcome::Empty => {
                    self.flush_if_due();
                    thread::sleep(self.poll_interval);
                }
                ReadOutcome::Eof => break LoopExit::Eof,
                ReadOutcome::Error(e) => break LoopExit::Error(e),
            }
        };

        if !self.buffer.is_empty() {
            self.flush();
        }
        tracing::info!("Receive loop finished: {:?}", exit);
        exit
    }

    /// Feed one cleaned chunk, flushing each time the size threshold is hit
    fn ingest(&mut self, cleaned: &str) {
        let mut rest = cleaned;
        while !rest.is_empty() {
            let room = self.buffer.room().max(1).min(rest.len());
            let cut = markup::token_boundary(rest, room);
            self.buffer.push(&rest[..cut]);
            rest = &rest[cut..];
            self.flush_if_due();
        }
    }

    fn flush_if_due(&mut self) {
        if self.buffer.is_due(Instant::now()) {
            self.flush();
        }
    }

    fn flush(&mut self) {
        self.buffer.flush(&self.ui, Instant::now());
        self.ui.counter(&format_bytes(self.bytes.load(Ordering::Relaxed)));
    }
}
