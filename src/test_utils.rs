//! Testing utilities and mock implementations
//!
//! This module provides a mock environment for exercising the session
//! controller on the host without modems or an image codec.
//!
//! Only available when running `cargo test`.

#![cfg(test)]
#![allow(missing_docs)]

extern crate std;

use std::vec::Vec;

use crate::env::{Environment, ModemType, NextTxPage, PageStats};
use crate::frames::FCF_MASK;
use crate::session::error::Status;

// =============================================================================
// Mock Environment
// =============================================================================

/// Scripted environment for testing the session without hardware.
///
/// Records every emitted HDLC frame, modem selection and phase event,
/// and plays the part of the T.4 codec from a small script.
///
/// # Example
///
/// ```ignore
/// let mut env = MockEnvironment::new();
/// env.tx_pages = 1;
///
/// let mut session = T30Session::new(config, env);
/// session.restart();
/// assert!(session.env().sent(fcf::DIS));
/// ```
#[derive(Debug, Default)]
pub struct MockEnvironment {
    /// Frames pushed through `send_hdlc(Some(..))`, in order
    pub sent_frames: Vec<Vec<u8>>,
    /// Number of burst terminators (`send_hdlc(None)`)
    pub burst_ends: usize,
    /// Receive modem selections: (type, short_train, use_hdlc)
    pub rx_types: Vec<(ModemType, bool, bool)>,
    /// Transmit modem selections: (type, short_train, use_hdlc)
    pub tx_types: Vec<(ModemType, bool, bool)>,
    /// FCF values reported to the phase B hook
    pub phase_b_events: Vec<u8>,
    /// FCF values reported to the phase D hook
    pub phase_d_events: Vec<u8>,
    /// Status reported to the phase E hook
    pub phase_e_status: Option<Status>,

    // --- Transmit document script ---
    /// Pages queued for transmission
    pub tx_pages: usize,
    /// Octets of encoded data per page (ECM path)
    pub tx_page_octets: usize,
    /// Bits of encoded data per page (non-ECM path)
    pub tx_page_bits: usize,
    /// Resolution reported for the document
    pub tx_resolution: (u32, u32),
    /// Width reported for the document
    pub tx_width: u16,
    /// Pages opened with `tx_start_page`
    pub tx_pages_started: usize,
    /// Pages re-opened with `tx_restart_page`
    pub tx_pages_restarted: usize,
    /// Pages closed with `tx_end_page`
    pub tx_pages_ended: usize,
    octets_left_in_page: usize,
    bits_left_in_page: usize,

    // --- Receive document script ---
    /// Bits pushed through `rx_bit`
    pub rx_bits: usize,
    /// Chunks pushed through `rx_chunk`
    pub rx_chunks: Vec<Vec<u8>>,
    /// Statistics reported at `rx_end_page`
    pub rx_stats: PageStats,
    /// `rx_bit` reports end-of-page after this many bits
    pub rx_end_page_after_bits: Option<usize>,
    /// Pages opened with `rx_start_page`
    pub rx_pages_started: usize,
    /// Pages closed with `rx_end_page`
    pub rx_pages_ended: usize,
}

impl MockEnvironment {
    /// Create an idle mock with no document scripted.
    pub fn new() -> Self {
        Self {
            tx_resolution: (
                crate::capability::resolution::X_R8,
                crate::capability::resolution::Y_STANDARD,
            ),
            tx_width: 1728,
            rx_stats: PageStats { total_rows: 1500, bad_rows: 0 },
            ..Self::default()
        }
    }

    /// A mock scripted as a transmitter with `pages` pages of `octets`
    /// encoded octets each.
    pub fn transmitter(pages: usize, octets: usize) -> Self {
        Self {
            tx_pages: pages,
            tx_page_octets: octets,
            tx_page_bits: octets * 8,
            ..Self::new()
        }
    }

    /// Every frame sent with the given (masked) FCF.
    pub fn frames_with_fcf(&self, code: u8) -> Vec<&Vec<u8>> {
        self.sent_frames
            .iter()
            .filter(|f| f.len() >= 3 && f[2] & FCF_MASK == code & FCF_MASK)
            .collect()
    }

    /// Whether a frame with the given (masked) FCF was sent.
    pub fn sent(&self, code: u8) -> bool {
        !self.frames_with_fcf(code).is_empty()
    }

    /// The most recently sent frame.
    pub fn last_frame(&self) -> Option<&Vec<u8>> {
        self.sent_frames.last()
    }

    /// The most recently selected transmit modem.
    pub fn last_tx_type(&self) -> Option<ModemType> {
        self.tx_types.last().map(|(ty, _, _)| *ty)
    }

    /// The most recently selected receive modem.
    pub fn last_rx_type(&self) -> Option<ModemType> {
        self.rx_types.last().map(|(ty, _, _)| *ty)
    }

    /// Forget recorded traffic (keeps the document script).
    pub fn clear_traffic(&mut self) {
        self.sent_frames.clear();
        self.burst_ends = 0;
        self.rx_types.clear();
        self.tx_types.clear();
    }
}

impl Environment for MockEnvironment {
    fn send_hdlc(&mut self, frame: Option<&[u8]>) {
        match frame {
            Some(f) => self.sent_frames.push(f.to_vec()),
            None => self.burst_ends += 1,
        }
    }

    fn set_rx_type(&mut self, ty: ModemType, short_train: bool, use_hdlc: bool) {
        self.rx_types.push((ty, short_train, use_hdlc));
    }

    fn set_tx_type(&mut self, ty: ModemType, short_train: bool, use_hdlc: bool) {
        self.tx_types.push((ty, short_train, use_hdlc));
    }

    fn phase_b(&mut self, fcf: u8) -> Result<(), Status> {
        self.phase_b_events.push(fcf);
        Ok(())
    }

    fn phase_d(&mut self, fcf: u8) -> Result<(), Status> {
        self.phase_d_events.push(fcf);
        Ok(())
    }

    fn phase_e(&mut self, status: Status) {
        self.phase_e_status = Some(status);
    }

    fn tx_start_page(&mut self) -> Result<(), Status> {
        if self.tx_pages == 0 {
            return Err(Status::NoPage);
        }
        self.tx_pages -= 1;
        self.tx_pages_started += 1;
        self.octets_left_in_page = self.tx_page_octets;
        self.bits_left_in_page = self.tx_page_bits;
        Ok(())
    }

    fn tx_restart_page(&mut self) -> Result<(), Status> {
        self.tx_pages_restarted += 1;
        self.octets_left_in_page = self.tx_page_octets;
        self.bits_left_in_page = self.tx_page_bits;
        Ok(())
    }

    fn tx_end_page(&mut self) {
        self.tx_pages_ended += 1;
    }

    fn tx_bit(&mut self) -> Option<u8> {
        if self.bits_left_in_page == 0 {
            return None;
        }
        self.bits_left_in_page -= 1;
        Some((self.bits_left_in_page & 1) as u8)
    }

    fn tx_chunk(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.octets_left_in_page);
        for (i, slot) in buf[..n].iter_mut().enumerate() {
            *slot = (self.octets_left_in_page.wrapping_sub(i) & 0xFF) as u8;
        }
        self.octets_left_in_page -= n;
        n
    }

    fn tx_more_pages(&mut self) -> NextTxPage {
        if self.tx_pages > 0 { NextTxPage::SameFormat } else { NextTxPage::None }
    }

    fn tx_image_width(&mut self) -> u16 {
        self.tx_width
    }

    fn tx_resolution(&mut self) -> (u32, u32) {
        self.tx_resolution
    }

    fn rx_start_page(&mut self) -> Result<(), Status> {
        self.rx_pages_started += 1;
        Ok(())
    }

    fn rx_end_page(&mut self) -> PageStats {
        self.rx_pages_ended += 1;
        self.rx_stats
    }

    fn rx_bit(&mut self, _bit: u8) -> bool {
        self.rx_bits += 1;
        self.rx_end_page_after_bits.is_some_and(|n| self.rx_bits >= n)
    }

    fn rx_chunk(&mut self, data: &[u8]) -> bool {
        self.rx_chunks.push(data.to_vec());
        false
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::fcf;

    #[test]
    fn mock_records_frames() {
        let mut env = MockEnvironment::new();
        env.send_hdlc(Some(&[0xFF, 0x13, fcf::CFR]));
        env.send_hdlc(None);

        assert!(env.sent(fcf::CFR));
        assert!(!env.sent(fcf::DCN));
        assert_eq!(env.burst_ends, 1);
    }

    #[test]
    fn mock_fcf_filter_masks_dis_received_bit() {
        let mut env = MockEnvironment::new();
        env.send_hdlc(Some(&[0xFF, 0x13, fcf::DCS | 0x01]));
        assert!(env.sent(fcf::DCS));
    }

    #[test]
    fn mock_tx_document_script() {
        let mut env = MockEnvironment::transmitter(2, 100);

        env.tx_start_page().unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(env.tx_chunk(&mut buf), 64);
        assert_eq!(env.tx_chunk(&mut buf), 36);
        assert_eq!(env.tx_chunk(&mut buf), 0);
        assert_eq!(env.tx_more_pages(), NextTxPage::SameFormat);

        env.tx_start_page().unwrap();
        assert_eq!(env.tx_more_pages(), NextTxPage::None);

        assert_eq!(env.tx_start_page().unwrap_err(), Status::NoPage);
    }

    #[test]
    fn mock_tx_bits_run_out() {
        let mut env = MockEnvironment::transmitter(1, 2);
        env.tx_start_page().unwrap();
        for _ in 0..16 {
            assert!(env.tx_bit().is_some());
        }
        assert!(env.tx_bit().is_none());
    }

    #[test]
    fn mock_rx_end_page_trigger() {
        let mut env = MockEnvironment::new();
        env.rx_end_page_after_bits = Some(3);
        assert!(!env.rx_bit(0));
        assert!(!env.rx_bit(1));
        assert!(env.rx_bit(0));
    }
}
