//! Bootstrap orchestration
//!
//! This module handles:
//! * The bootstrap state machine (`Uninitialized → Connecting → Ready | Failed`)
//! * Retry policy (exponential backoff, cap, jitter, bounded attempts)
//! * Single-flight orchestration around the connector, with an optional
//!   overall deadline

mod bootstrapper;
mod retry;
mod state;

pub use bootstrapper::{Bootstrapper, Connector};
pub use retry::RetryPolicy;
pub use state::BootstrapState;
