//! # CarePulse Core
//!
//! Pieces shared by every CarePulse crate:
//! - [`error`] — the single error enum and `Result` alias
//! - [`config`] — TOML configuration (`~/.carepulse/config.toml`)
//! - [`traits`] — the collaborators the scheduler consumes: key-value
//!   store, notification sink and clock

pub mod config;
pub mod error;
pub mod traits;

pub use config::CarePulseConfig;
pub use error::{CarePulseError, Result};
pub use traits::{Clock, KvStore, ManualClock, NotificationSink, SystemClock};
