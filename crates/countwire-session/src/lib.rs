//! Connection management for counting devices.
//!
//! A [`Session`] owns one link at a time. It opens the port with bounded
//! retries, feeds received bytes through reassembly and decoding, and
//! reports everything that happens as [`SessionEvent`]s on a channel.

pub mod config;
pub mod error;
pub mod event;
pub mod session;
pub mod state;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use event::{Diagnostic, ReceiveMode, SessionEvent};
pub use session::{Session, SessionStats};
pub use state::ConnectionState;
