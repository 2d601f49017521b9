//! Core T.30 session components.
//!
//! This module contains the building blocks of the session controller.
//!
//! # Overview
//!
//! - [`config`]: Configuration types and builder patterns
//! - [`error`]: Status and error types
//! - [`t30`]: The session facade and phase controller
//! - [`states`]: The flow-chart frame dispatch
//! - [`timers`]: The T0/T1, T2/T4, T3, T5 timer base
//! - [`ecm`]: The ECM partial-page buffer
//! - [`phase`]: Phase and state enumerations
//!
//! # Usage
//!
//! ```ignore
//! use ph_t30_fax::{T30Config, T30Session};
//!
//! let config = T30Config::new(false).with_local_ident("+1 555 0100")?;
//! let mut session = T30Session::new(config, glue);
//! session.restart();
//! ```

// Submodules
pub mod config;
pub mod ecm;
pub mod error;
pub mod phase;
pub mod states;
pub mod t30;
pub mod timers;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use config::{
    Compressions, IafMode, Ident, ImageSizes, ModemSupport, Nsf, Resolutions, T30Config,
};
pub use error::{ConfigError, ConfigResult, Result, Status};
pub use phase::{Phase, State};
pub use t30::{
    MAX_MESSAGE_TRIES, PPR_LIMIT_BEFORE_CTC_OR_EOR, T30Session, TCF_DURATION_MS, TransferParams,
};
