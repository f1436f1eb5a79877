//! Core session engine components.
//!
//! - **pool**: fixed set of reusable text buffers for UI handoff
//! - **filter**: resumable escape sequence scanner producing renderer-safe text
//! - **transport**: link, tunnel and shell driver traits
//! - **net** / **ssh**: host-side driver implementations
//! - **receiver**: shell receive loop and flush buffer
//! - **session**: connection lifecycle state machine
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── LinkDriver / TunnelDriver / ShellTransport
//! └── ReceiveLoop (own thread)
//!     ├── EscapeFilter
//!     ├── FlushBuffer
//!     └── UiHandle ── MessagePool ──> render queue
//! ```

pub mod filter;
pub mod net;
pub mod pool;
pub mod receiver;
pub mod session;
#[cfg(feature = "ssh")]
pub mod ssh;
pub mod transport;
