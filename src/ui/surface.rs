//! Render surface contract and the render command queue
//!
//! Background producers never touch the surface. They post
//! [`RenderCommand`]s through a [`UiHandle`]; the owning thread drains the
//! queue with [`RenderQueue::drain`], which applies each command inside the
//! shared reentrant critical section.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use parking_lot::ReentrantMutex;

use super::markup;
use crate::core::pool::{floor_char_boundary, MessagePool, PooledMessage};

/// Which view has focus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Terminal,
    Launcher,
}

/// Single-threaded text surface
pub trait RenderSurface {
    /// Append a cleaned fragment to the output area
    fn render_text(&mut self, fragment: &str);

    /// Replace the status line
    fn render_status(&mut self, text: &str);

    /// Replace the byte counter label
    fn render_counter(&mut self, text: &str);

    /// Replace the input bar content
    fn render_input(&mut self, text: &str);

    /// Empty the output area
    fn clear_output(&mut self);

    fn scroll_to_end(&mut self);

    fn focus(&mut self, target: Focus);
}

/// A deferred surface mutation
#[derive(Debug)]
pub enum RenderCommand {
    Text(PooledMessage),
    Status(PooledMessage),
    Counter(PooledMessage),
    Input(PooledMessage),
    Clear,
    ScrollToEnd,
    Focus(Focus),
}

/// Producer side of the render queue. Cheap to clone.
#[derive(Clone)]
pub struct UiHandle {
    tx: SyncSender<RenderCommand>,
    pool: MessagePool,
}

/// Consumer side of the render queue, owned by the surface thread
pub struct RenderQueue {
    rx: Receiver<RenderCommand>,
}

/// Create a bounded render queue backed by `pool`
pub fn render_queue(pool: MessagePool, depth: usize) -> (UiHandle, RenderQueue) {
    let (tx, rx) = mpsc::sync_channel(depth.max(1));
    (UiHandle { tx, pool }, RenderQueue { rx })
}

impl UiHandle {
    /// Append text to the output area.
    ///
    /// Text longer than one message is split across several. Returns false
    /// if any part was dropped because the pool or the queue was full.
    pub fn text(&self, text: &str) -> bool {
        let capacity = self.pool.message_capacity().max(4);
        let mut rest = text;
        while !rest.is_empty() {
            let mut n = floor_char_boundary(rest, capacity);
            if n == 0 {
                // Capacity below the width of the next char
                n = rest.chars().next().map_or(rest.len(), char::len_utf8);
            }
            if !self.post_message(&rest[..n], RenderCommand::Text) {
                return false;
            }
            rest = &rest[n..];
        }
        true
    }

    /// Append a line to the output area
    pub fn line(&self, text: &str) -> bool {
        self.text(&format!("{}\n", text))
    }

    pub fn status(&self, text: &str) -> bool {
        self.post_message(text, RenderCommand::Status)
    }

    pub fn counter(&self, text: &str) -> bool {
        self.post_message(text, RenderCommand::Counter)
    }

    pub fn input(&self, text: &str) -> bool {
        self.post_message(text, RenderCommand::Input)
    }

    pub fn clear(&self) -> bool {
        self.post(RenderCommand::Clear)
    }

    pub fn scroll_to_end(&self) -> bool {
        self.post(RenderCommand::ScrollToEnd)
    }

    pub fn focus(&self, target: Focus) -> bool {
        self.post(RenderCommand::Focus(target))
    }

    /// Pool shared with the consumer
    pub fn pool(&self) -> &MessagePool {
        &self.pool
    }

    fn post_message(&self, text: &str, wrap: fn(PooledMessage) -> RenderCommand) -> bool {
        let Some(mut msg) = self.pool.checkout() else {
            return false;
        };
        msg.write(text);
        self.post(wrap(msg))
    }

    fn post(&self, cmd: RenderCommand) -> bool {
        match self.tx.try_send(cmd) {
            Ok(()) => true,
            // Dropping the command releases any message it carries
            Err(TrySendError::Full(_)) => {
                tracing::trace!("render queue full, update dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl RenderQueue {
    /// Apply every pending command to `surface`.
    ///
    /// The critical section is taken around each command and released right
    /// after it. Returns the number of commands applied.
    pub fn drain(&self, surface: &mut dyn RenderSurface, lock: &ReentrantMutex<()>) -> usize {
        let mut applied = 0;
        while let Ok(cmd) = self.rx.try_recv() {
            let _guard = lock.lock();
            apply(surface, cmd);
            applied += 1;
        }
        applied
    }
}

fn apply(surface: &mut dyn RenderSurface, cmd: RenderCommand) {
    match cmd {
        RenderCommand::Text(msg) => msg.with_text(|t| surface.render_text(t)),
        RenderCommand::Status(msg) => msg.with_text(|t| surface.render_status(t)),
        RenderCommand::Counter(msg) => msg.with_text(|t| surface.render_counter(t)),
        RenderCommand::Input(msg) => msg.with_text(|t| surface.render_input(t)),
        RenderCommand::Clear => surface.clear_output(),
        RenderCommand::ScrollToEnd => surface.scroll_to_end(),
        RenderCommand::Focus(target) => surface.focus(target),
    }
}

/// Capped cumulative output text.
///
/// When the text grows past `cap` bytes only the last `keep` bytes survive.
#[derive(Debug, Clone)]
pub struct Transcript {
    text: String,
    cap: usize,
    keep: usize,
}

impl Transcript {
    pub fn new(cap: usize, keep: usize) -> Self {
        Self {
            text: String::with_capacity(cap),
            cap: cap.max(1),
            keep: keep.min(cap),
        }
    }

    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        if self.text.len() > self.cap {
            let start = markup::token_boundary(&self.text, self.text.len() - self.keep);
            self.text.drain(..start);
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
pub mod recording {
    //! Surface that records what it was asked to draw

    use super::*;

    #[derive(Default)]
    pub struct RecordingSurface {
        pub output: String,
        pub status: String,
        pub counter: String,
        pub input: String,
        pub focus: Option<Focus>,
        pub clears: usize,
    }

    impl RenderSurface for RecordingSurface {
        fn render_text(&mut self, fragment: &str) {
            self.output.push_str(fragment);
        }

        fn render_status(&mut self, text: &str) {
            self.status = text.to_string();
        }

        fn render_counter(&mut self, text: &str) {
            self.counter = text.to_string();
        }

        fn render_input(&mut self, text: &str) {
            self.input = text.to_string();
        }

        fn clear_output(&mut self) {
            self.output.clear();
            self.clears += 1;
        }

        fn scroll_to_end(&mut self) {}

        fn focus(&mut self, target: Focus) {
            self.focus = Some(target);
        }
    }

    /// Drain `queue` into `surface` under a throwaway lock
    pub fn drain_into(queue: &RenderQueue, surface: &mut RecordingSurface) -> usize {
        let lock = ReentrantMutex::new(());
        queue.drain(surface, &lock)
    }
}
