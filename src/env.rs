//! Environment Trait
//!
//! This module defines the capability set a T.30 session needs from its
//! owner: the HDLC transport, the modem selection callbacks, the phase
//! notification hooks, and the T.4 document seams.
//!
//! The session never owns a modem or an image codec. It asks the
//! environment to reconfigure the front end ([`Environment::set_rx_type`] /
//! [`Environment::set_tx_type`]), pushes negotiated HDLC frames through
//! [`Environment::send_hdlc`], and moves page data across the document
//! seam methods. All calls are synchronous and must not re-enter the
//! session.

use crate::session::error::Status;

// =============================================================================
// Modem Selection
// =============================================================================

/// Fast-carrier modulation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Modulation {
    /// V.27ter (2400/4800 bps)
    V27ter,
    /// V.29 (7200/9600 bps)
    V29,
    /// V.17 (7200-14400 bps)
    V17,
}

impl Modulation {
    /// Returns a human-readable name for the modulation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Modulation::V27ter => "V.27ter",
            Modulation::V29 => "V.29",
            Modulation::V17 => "V.17",
        }
    }
}

/// Modem type requested from the front end.
///
/// One receive type and one transmit type are selected per phase. `Pause`
/// asks the transmit side to stay silent for a fixed time before the next
/// request; `Done` tells the front end the call is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemType {
    /// No carrier
    None,
    /// CED answer tone (2100 Hz)
    Ced,
    /// CNG calling tone (1100 Hz)
    Cng,
    /// V.21 channel 2 binary procedures (300 bps HDLC)
    V21,
    /// Fast image carrier at a negotiated rate
    Fast {
        /// Modulation family
        modulation: Modulation,
        /// Bit rate in bits per second
        bit_rate: u16,
    },
    /// Transmit silence for the given duration
    Pause {
        /// Silence duration in milliseconds
        ms: u16,
    },
    /// Call finished; release the line
    Done,
}

// =============================================================================
// Front-End Events
// =============================================================================

/// Status reports from the front end driving the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrontEndEvent {
    /// The last requested transmit step (tone, frame burst, TCF, page) has
    /// been fully sent and the carrier has been dropped.
    SendStepComplete,
    /// The receive modem has finished (carrier gone, data drained).
    ReceiveComplete,
    /// Receive signal energy detected on the line.
    SignalPresent,
    /// Receive signal energy gone from the line.
    SignalAbsent,
}

/// Events delivered from the V.21 HDLC receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdlcEvent<'a> {
    /// A complete frame, with the CRC verdict from the framer.
    Frame {
        /// Frame octets: address, control, FCF, information field.
        data: &'a [u8],
        /// Whether the frame checksum was good.
        crc_ok: bool,
    },
    /// A well-formed flag sequence was seen (preamble detected).
    Flags,
    /// The V.21 carrier has come up.
    CarrierUp,
    /// The V.21 carrier has dropped.
    CarrierDown,
}

// =============================================================================
// Signal Sentinels (non-ECM bit stream)
// =============================================================================

/// Training failed on the fast carrier.
pub const SIG_STATUS_TRAINING_FAILED: i32 = -1;
/// Training succeeded on the fast carrier.
pub const SIG_STATUS_TRAINING_SUCCEEDED: i32 = -2;
/// Fast carrier detected.
pub const SIG_STATUS_CARRIER_UP: i32 = -3;
/// Fast carrier lost.
pub const SIG_STATUS_CARRIER_DOWN: i32 = -4;
/// End of transmit data in the get direction, or end of receive data in
/// the put direction.
pub const SIG_STATUS_END_OF_DATA: i32 = -5;

/// End-of-data marker for the byte-wide get direction.
pub const T30_END_OF_DATA_BYTE: i32 = 0x100;

// =============================================================================
// Page Statistics
// =============================================================================

/// Row statistics reported by the T.4 decoder at the end of a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PageStats {
    /// Total decoded rows
    pub total_rows: u32,
    /// Rows that failed to decode cleanly
    pub bad_rows: u32,
}

/// Received copy quality, judged from [`PageStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CopyQuality {
    /// Good copy; confirm with MCF
    Good,
    /// Usable copy, but ask for retraining; RTP
    Poor,
    /// Unusable copy; ask for retransmission; RTN
    Bad,
}

impl CopyQuality {
    /// Judge copy quality from decoder row statistics.
    ///
    /// With `B` bad rows out of `L` total: good when `50*B < L`, poor when
    /// `20*B < L`, bad otherwise.
    #[must_use]
    pub const fn judge(stats: PageStats) -> Self {
        let b = stats.bad_rows as u64;
        let l = stats.total_rows as u64;
        if 50 * b < l {
            CopyQuality::Good
        } else if 20 * b < l {
            CopyQuality::Poor
        } else {
            CopyQuality::Bad
        }
    }
}

/// What the transmit document has left after the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NextTxPage {
    /// No more pages; the post-page command will be EOP
    #[default]
    None,
    /// Another page with the same format follows; MPS
    SameFormat,
    /// Another page needing renegotiation follows; EOM
    DifferentFormat,
}

// =============================================================================
// Environment Trait
// =============================================================================

/// The capability set supplied by the owner of a T.30 session.
///
/// The mandatory methods wire the session to the HDLC transport and the
/// modem front end. The notification hooks and the document seam have
/// workable defaults so a pure receiver or a test double only implements
/// what it uses.
///
/// # Contract
///
/// * Methods are invoked synchronously from the session entry points and
///   must not call back into the session.
/// * Frames passed to [`send_hdlc`](Self::send_hdlc) are complete wire
///   frames (address + control + FCF + FIF). `None` closes the burst:
///   flush the transmit queue and expect a response.
///
/// # Example Implementation
///
/// ```ignore
/// struct Glue { /* modems, codec */ }
///
/// impl Environment for Glue {
///     fn send_hdlc(&mut self, frame: Option<&[u8]>) {
///         match frame {
///             Some(f) => self.hdlc_tx.queue(f),
///             None => self.hdlc_tx.flush(),
///         }
///     }
///
///     fn set_rx_type(&mut self, ty: ModemType, short_train: bool, use_hdlc: bool) {
///         self.front_end.select_rx(ty, short_train, use_hdlc);
///     }
///
///     // ... other methods
/// }
/// ```
pub trait Environment {
    /// Queue an HDLC frame for transmission; `None` terminates the burst.
    fn send_hdlc(&mut self, frame: Option<&[u8]>);

    /// Select the receive modem.
    ///
    /// `short_train` selects the abbreviated V.17 training sequence;
    /// `use_hdlc` wraps the carrier in the HDLC framer (V.21 procedures
    /// and ECM image data).
    fn set_rx_type(&mut self, ty: ModemType, short_train: bool, use_hdlc: bool);

    /// Select the transmit modem. Arguments as for
    /// [`set_rx_type`](Self::set_rx_type).
    ///
    /// A [`ModemType::Pause`] request queues silence ahead of the next
    /// selection rather than replacing it.
    fn set_tx_type(&mut self, ty: ModemType, short_train: bool, use_hdlc: bool);

    /// Phase B notification: negotiation frame (DIS/DTC/DCS) accepted.
    ///
    /// Returning an error aborts the call with that status.
    fn phase_b(&mut self, fcf: u8) -> Result<(), Status> {
        let _ = fcf;
        Ok(())
    }

    /// Phase D notification: a post-page command or response was exchanged.
    ///
    /// Returning an error aborts the call with that status.
    fn phase_d(&mut self, fcf: u8) -> Result<(), Status> {
        let _ = fcf;
        Ok(())
    }

    /// Phase E notification: the call has completed with the given status.
    fn phase_e(&mut self, status: Status) {
        let _ = status;
    }

    // =========================================================================
    // Transmit document seam (T.4 encoder)
    // =========================================================================

    /// Open the next page of the transmit document.
    fn tx_start_page(&mut self) -> Result<(), Status> {
        Err(Status::NoPage)
    }

    /// Re-open the page most recently opened, for retransmission after RTN.
    fn tx_restart_page(&mut self) -> Result<(), Status> {
        Err(Status::NoPage)
    }

    /// Close the current transmit page after confirmation.
    fn tx_end_page(&mut self) {}

    /// Pull the next image bit for non-ECM transmission; `None` at end of
    /// page.
    fn tx_bit(&mut self) -> Option<u8> {
        None
    }

    /// Fill `buf` with encoded image data for ECM transmission.
    ///
    /// A return shorter than `buf.len()` marks the end of the page.
    fn tx_chunk(&mut self, buf: &mut [u8]) -> usize {
        let _ = buf;
        0
    }

    /// Report what follows the current page.
    fn tx_more_pages(&mut self) -> NextTxPage {
        NextTxPage::None
    }

    /// Width of the current page in pels.
    fn tx_image_width(&mut self) -> u16 {
        1728
    }

    /// Resolution of the current page in pels per metre (x, y).
    fn tx_resolution(&mut self) -> (u32, u32) {
        (crate::capability::resolution::X_R8, crate::capability::resolution::Y_STANDARD)
    }

    // =========================================================================
    // Receive document seam (T.4 decoder)
    // =========================================================================

    /// Open a page on the receive document.
    fn rx_start_page(&mut self) -> Result<(), Status> {
        Ok(())
    }

    /// Close the current receive page and report its row statistics.
    fn rx_end_page(&mut self) -> PageStats {
        PageStats::default()
    }

    /// Push one received image bit (non-ECM). Returns `true` when the
    /// decoder has seen the end-of-page sequence.
    fn rx_bit(&mut self, bit: u8) -> bool {
        let _ = bit;
        false
    }

    /// Push a block of received image data (ECM commit). Returns `true`
    /// when the decoder has seen the end-of-page sequence.
    fn rx_chunk(&mut self, data: &[u8]) -> bool {
        let _ = data;
        false
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_quality_thresholds() {
        // 1500 rows, 10 bad: 50*10 = 500 < 1500 -> good
        let good = PageStats { total_rows: 1500, bad_rows: 10 };
        assert_eq!(CopyQuality::judge(good), CopyQuality::Good);

        // 1500 rows, 50 bad: 50*50 = 2500 >= 1500, 20*50 = 1000 < 1500 -> poor
        let poor = PageStats { total_rows: 1500, bad_rows: 50 };
        assert_eq!(CopyQuality::judge(poor), CopyQuality::Poor);

        // 1500 rows, 100 bad: 20*100 = 2000 >= 1500 -> bad
        let bad = PageStats { total_rows: 1500, bad_rows: 100 };
        assert_eq!(CopyQuality::judge(bad), CopyQuality::Bad);
    }

    #[test]
    fn copy_quality_clean_page() {
        let stats = PageStats { total_rows: 2200, bad_rows: 0 };
        assert_eq!(CopyQuality::judge(stats), CopyQuality::Good);
    }

    #[test]
    fn copy_quality_empty_page_is_bad() {
        // 0 rows, 0 bad: 0 < 0 is false on both thresholds
        let stats = PageStats::default();
        assert_eq!(CopyQuality::judge(stats), CopyQuality::Bad);
    }

    #[test]
    fn modulation_names() {
        assert_eq!(Modulation::V17.as_str(), "V.17");
        assert_eq!(Modulation::V29.as_str(), "V.29");
        assert_eq!(Modulation::V27ter.as_str(), "V.27ter");
    }

    #[test]
    fn sentinel_values() {
        assert_eq!(SIG_STATUS_TRAINING_FAILED, -1);
        assert_eq!(SIG_STATUS_TRAINING_SUCCEEDED, -2);
        assert_eq!(SIG_STATUS_CARRIER_UP, -3);
        assert_eq!(SIG_STATUS_CARRIER_DOWN, -4);
        assert_eq!(SIG_STATUS_END_OF_DATA, -5);
        assert_eq!(T30_END_OF_DATA_BYTE, 0x100);
    }
}
