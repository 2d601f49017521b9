//! ITU-T T.30 Facsimile Session Controller
//!
//! A `no_std`, `no_alloc` Rust implementation of the T.30 Group-3 fax
//! protocol engine.
//!
//! This crate provides the session layer of a fax terminal: capability
//! negotiation (DIS/DTC/DCS), modem training and rate fallback, page
//! transfer in non-ECM and error-correcting (ECM) mode with selective
//! repeat, copy-quality confirmation, and orderly disconnect. The DSP
//! blocks around it (tone generators and detectors, V.17/V.29/V.27ter
//! modems, the HDLC framer, the T.4 image codec) are external
//! collaborators reached through the [`Environment`] trait.
//!
//! # Architecture
//!
//! The controller is organized into three layers:
//!
//! 1. **Session Layer** ([`session::t30`]): The [`T30Session`] facade,
//!    phase controller and timers
//! 2. **Flow-Chart Layer** ([`session::states`]): One handler per T.30
//!    flow-chart state, consuming decoded HDLC frames
//! 3. **Wire Layer** ([`capability`], [`frames`], [`fallback`]): The
//!    DIS/DTC/DCS bit vector, FCF codes and the rate ladder
//!
//! ## Standard Compliance
//!
//! - **ITU-T T.30**: Session procedures, timers, frame formats
//! - **ITU-T T.4**: Image geometry (widths, resolutions) as negotiated
//! - **ITU-T T.35**: NSF country/vendor prefix passthrough
//!
//! # Concurrency Model
//!
//! A session is a passive object driven by three entry-point families
//! that the owner must not overlap: the sample-clock tick, the HDLC
//! frame/event delivery, and the non-ECM bit delivery. No call blocks.
//! Several sessions may coexist provided each is driven from one
//! context at a time; the optional `critical-section` feature adds a
//! [`SharedT30Session`] wrapper for ISR-driven front ends.
//!
//! # Features
//!
//! - `defmt`: Enable defmt formatting and debug traces
//! - `log`: Route debug traces through the `log` facade instead
//! - `critical-section`: Enable the ISR-safe `SharedT30Session` wrapper
//!
//! # Example
//!
//! ```ignore
//! use ph_t30_fax::{Environment, T30Config, T30Session};
//!
//! let config = T30Config::new(true)
//!     .with_tx_document(true)
//!     .with_local_ident("+1 555 0100")?;
//!
//! let mut session = T30Session::new(config, glue);
//! session.restart();
//!
//! // Drive from the front end:
//! //   session.timer_tick(samples)        on the audio clock
//! //   session.hdlc_accept(event)         from the V.21 receiver
//! //   session.non_ecm_put_bit(bit)       from the image modem
//! //   session.front_end_status(event)    on send/receive completion
//! ```
//!
//! # Memory Requirements
//!
//! A session is self-contained and statically sized: the dominant cost
//! is the 256-slot ECM partial-page buffer, roughly 66 KB per session.

#![no_std]
#![deny(missing_docs)]
#![deny(unsafe_code)]

// Logging shim: defmt on embedded targets, log on hosts, silence otherwise.
#[doc(hidden)]
#[macro_export]
macro_rules! t30_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::debug!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        log::debug!($($arg)*);
        #[cfg(not(any(feature = "defmt", feature = "log")))]
        {
            let _ = core::format_args!($($arg)*);
        }
    }};
}

// =============================================================================
// Modules
// =============================================================================

pub mod capability;
pub mod env;
pub mod fallback;
pub mod frames;
pub mod session;

#[cfg(feature = "critical-section")]
pub mod sync;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod test_utils;

// =============================================================================
// Re-exports
// =============================================================================

pub use env::{
    CopyQuality, Environment, FrontEndEvent, HdlcEvent, ModemType, Modulation, NextTxPage,
    PageStats, SIG_STATUS_CARRIER_DOWN, SIG_STATUS_CARRIER_UP, SIG_STATUS_END_OF_DATA,
    SIG_STATUS_TRAINING_FAILED, SIG_STATUS_TRAINING_SUCCEEDED, T30_END_OF_DATA_BYTE,
};
pub use fallback::{FALLBACK_SEQUENCE, FallbackEntry};
pub use session::config::{
    Compressions, IafMode, Ident, ImageSizes, ModemSupport, Nsf, Resolutions, T30Config,
};
pub use session::error::{ConfigError, ConfigResult, Result, Status};
pub use session::phase::{Phase, State};
pub use session::t30::{
    MAX_MESSAGE_TRIES, PPR_LIMIT_BEFORE_CTC_OR_EOR, T30Session, TCF_DURATION_MS, TransferParams,
};
pub use session::timers::{
    DEFAULT_TIMER_T0_MS, DEFAULT_TIMER_T1_MS, DEFAULT_TIMER_T2_MS, DEFAULT_TIMER_T3_MS,
    DEFAULT_TIMER_T4_MS, DEFAULT_TIMER_T5_MS, SAMPLE_RATE, ms_to_samples,
};

// Re-export sync types when critical-section is enabled
#[cfg(feature = "critical-section")]
pub use sync::SharedT30Session;

/// Shared protocol constants.
///
/// These are grouped into a dedicated module to keep the top-level facade
/// focused on session types.
pub mod constants {
    pub use crate::capability::{MAX_BIT, MAX_CONTENT_OCTETS, MAX_FRAME_LEN, RATE_FIELD_MASK};
    pub use crate::frames::{
        ADDRESS_FIELD, CONTROL_FIELD_FINAL, CONTROL_FIELD_NON_FINAL, FCF_MASK, IDENT_FRAME_LEN,
        MAX_IDENT_LEN, MAX_NSF_LEN,
    };
    pub use crate::session::ecm::{ECM_FRAME_MAP_LEN, MAX_ECM_FRAME_OCTETS, MAX_ECM_FRAMES};
}
