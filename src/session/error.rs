//! Error types for the T.30 session controller
//!
//! Errors are organized by domain:
//! - [`Status`]: the T.30 "current status", carried through the call and
//!   delivered to the phase E handler at completion
//! - [`ConfigError`]: configuration setter misuse
//!
//! A session never panics on protocol trouble; it records a [`Status`],
//! runs the disconnect path, and surfaces the status in phase E.

// =============================================================================
// Session Status
// =============================================================================

/// T.30 session status.
///
/// `Ok` until something goes wrong; the final value is reported through
/// the phase E hook. Recoverable conditions (CRP, PPR, FTT, RTN, timeouts
/// under the retry limit) are handled inside the session and never appear
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// The call completed normally
    #[default]
    Ok,

    // --- Timeouts -----------------------------------------------------------
    /// Timer T0 expired: no response from the far end after dialling
    T0Expired,
    /// Timer T1 expired: far end detected but identification never completed
    T1Expired,
    /// Timer T3 expired: operator intervention did not happen
    T3Expired,
    /// Timer T5 expired: the far end stayed not-ready too long
    T5Expired,
    /// Timer T2 expired waiting for a command
    T2Expired,
    /// Timer T2 expired waiting for the final DCN
    T2ExpiredDcn,
    /// Timer T2 expired waiting for phase D signals
    T2ExpiredPhaseD,
    /// Timer T2 expired waiting for the fax carrier
    T2ExpiredFax,
    /// Timer T2 expired waiting for the next page command
    T2ExpiredNextPage,
    /// Timer T2 expired waiting for RR
    T2ExpiredRr,
    /// Retries exhausted in phase B
    PhBDeadTx,
    /// Retries exhausted in phase D
    PhDDeadTx,
    /// Retries exhausted; disconnecting
    RetryDcn,

    // --- Protocol violations ------------------------------------------------
    /// An unexpected frame arrived for the current state
    Unexpected,
    /// DCN received when a command was expected
    DcnWhyRx,
    /// DCN received while waiting for page data
    DcnDataRx,
    /// DCN received while waiting for a post-page command
    DcnFaxRx,
    /// DCN received while waiting for a phase D response
    DcnPhdRx,
    /// DCN received while waiting for RR
    DcnRrdRx,
    /// DCN received instead of a retransmission after RTN
    DcnNoRtnRx,

    // --- Capability mismatches ----------------------------------------------
    /// The far end cannot receive
    RxIncapable,
    /// The far end cannot transmit
    TxIncapable,
    /// The page resolution is not negotiable with the far end
    ResolutionNotSupported,
    /// The page size is not negotiable with the far end
    SizeNotSupported,
    /// No usable operating mode in common with the far end
    Incompatible,

    // --- File / image errors ------------------------------------------------
    /// Document file could not be read or written
    FileError,
    /// Document file has a bad TIFF header
    BadTiffHdr,
    /// Document file has a bad TIFF tag
    BadTag,
    /// The requested page does not exist
    NoPage,

    // --- Training / carrier / session errors --------------------------------
    /// Training never succeeded at any usable rate
    CannotTrain,
    /// The expected carrier never appeared
    NoCarrierRx,
    /// The far end rejected our DCS with DCN
    BadDcsTx,
    /// The page could not be delivered even after retries
    BadPgTx,
    /// ECM transmission abandoned in phase D
    EcmPhdTx,
    /// ECM reception abandoned in phase D
    EcmPhdRx,
    /// Invalid response received to a command we sent
    InvalRspTx,
    /// Invalid command received
    InvalCmdRx,
    /// The call was dropped before the session finished
    CallDropped,
}

impl Status {
    /// Returns a human-readable description of the status
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::T0Expired => "T0 expired",
            Status::T1Expired => "T1 expired",
            Status::T3Expired => "T3 expired",
            Status::T5Expired => "T5 expired",
            Status::T2Expired => "T2 expired waiting for a command",
            Status::T2ExpiredDcn => "T2 expired waiting for DCN",
            Status::T2ExpiredPhaseD => "T2 expired waiting for phase D",
            Status::T2ExpiredFax => "T2 expired waiting for fax carrier",
            Status::T2ExpiredNextPage => "T2 expired waiting for next page",
            Status::T2ExpiredRr => "T2 expired waiting for RR",
            Status::PhBDeadTx => "retries exhausted in phase B",
            Status::PhDDeadTx => "retries exhausted in phase D",
            Status::RetryDcn => "retries exhausted",
            Status::Unexpected => "unexpected frame",
            Status::DcnWhyRx => "DCN instead of a command",
            Status::DcnDataRx => "DCN while waiting for page data",
            Status::DcnFaxRx => "DCN while waiting for a post-page command",
            Status::DcnPhdRx => "DCN while waiting for a phase D response",
            Status::DcnRrdRx => "DCN while waiting for RR",
            Status::DcnNoRtnRx => "DCN instead of a retransmission",
            Status::RxIncapable => "far end cannot receive",
            Status::TxIncapable => "far end cannot transmit",
            Status::ResolutionNotSupported => "resolution not supported",
            Status::SizeNotSupported => "page size not supported",
            Status::Incompatible => "far end incompatible",
            Status::FileError => "document file error",
            Status::BadTiffHdr => "bad TIFF header",
            Status::BadTag => "bad TIFF tag",
            Status::NoPage => "no such page",
            Status::CannotTrain => "cannot train at any usable rate",
            Status::NoCarrierRx => "expected carrier never appeared",
            Status::BadDcsTx => "far end rejected DCS",
            Status::BadPgTx => "page could not be delivered",
            Status::EcmPhdTx => "ECM transmission abandoned",
            Status::EcmPhdRx => "ECM reception abandoned",
            Status::InvalRspTx => "invalid response received",
            Status::InvalCmdRx => "invalid command received",
            Status::CallDropped => "call dropped",
        }
    }

    /// Whether this status represents a clean completion
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration setter errors
///
/// Setters are rejected while a call is in progress, and reject values
/// that cannot be carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Configuration may not change during an active call
    CallInProgress,
    /// Identifier longer than the 20 characters T.30 allows
    IdentTooLong,
    /// Identifier contains non-ASCII or non-printable characters
    InvalidIdent,
    /// Non-standard facilities blob longer than 100 octets
    NsfTooLong,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::CallInProgress => "call in progress",
            ConfigError::IdentTooLong => "identifier too long",
            ConfigError::InvalidIdent => "identifier not printable ASCII",
            ConfigError::NsfTooLong => "NSF blob too long",
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = core::result::Result<T, Status>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    extern crate std;
    use std::format;

    use super::*;

    #[test]
    fn status_as_str_non_empty() {
        let variants = [
            Status::Ok,
            Status::T0Expired,
            Status::T5Expired,
            Status::T2ExpiredNextPage,
            Status::PhBDeadTx,
            Status::DcnNoRtnRx,
            Status::ResolutionNotSupported,
            Status::CannotTrain,
            Status::CallDropped,
        ];

        for variant in variants {
            assert!(!variant.as_str().is_empty(), "Status::{:?} has empty string", variant);
        }
    }

    #[test]
    fn status_display() {
        let display = format!("{}", Status::CannotTrain);
        assert_eq!(display, "cannot train at any usable rate");
    }

    #[test]
    fn status_default_is_ok() {
        assert_eq!(Status::default(), Status::Ok);
        assert!(Status::default().is_ok());
        assert!(!Status::CallDropped.is_ok());
    }

    #[test]
    fn config_error_display() {
        let display = format!("{}", ConfigError::IdentTooLong);
        assert_eq!(display, "identifier too long");
    }

    #[test]
    fn config_error_equality() {
        assert_eq!(ConfigError::CallInProgress, ConfigError::CallInProgress);
        assert_ne!(ConfigError::CallInProgress, ConfigError::NsfTooLong);
    }
}
