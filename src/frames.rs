//! HDLC Frame Constants and Codecs
//!
//! T.30 control frames travel as HDLC UI frames on the V.21 channel 2
//! carrier. Every frame starts with the fixed address octet `FF`, a
//! control octet (`03` non-final, `13` final), and a facsimile control
//! field (FCF) octet. Station identifiers ride in fixed 20-character
//! information fields, reversed on the wire and padded with spaces.

// =============================================================================
// Frame Framing Octets
// =============================================================================

/// HDLC broadcast address octet, first in every T.30 frame.
pub const ADDRESS_FIELD: u8 = 0xFF;
/// Control octet for a non-final frame.
pub const CONTROL_FIELD_NON_FINAL: u8 = 0x03;
/// Control octet for a final frame (P/F bit set).
pub const CONTROL_FIELD_FINAL: u8 = 0x13;

/// Mask applied to a received FCF to strip the DIS-received bit before
/// dispatch.
pub const FCF_MASK: u8 = 0xFE;

/// Wire length of a 20-character identifier frame (3 header + 20 payload).
pub const IDENT_FRAME_LEN: usize = 23;
/// Maximum identifier length in characters.
pub const MAX_IDENT_LEN: usize = 20;
/// Maximum non-standard facilities payload in octets.
pub const MAX_NSF_LEN: usize = 100;

// =============================================================================
// Facsimile Control Field Values
// =============================================================================

/// FCF octet values.
///
/// Values whose low bit varies with the DIS-received marker are given in
/// their base (bit clear) form; [`FCF_MASK`] recovers the base form on
/// receive. Commands end in `0xE`, responses in `0xC`, so every pair
/// stays distinct after masking.
pub mod fcf {
    /// Null FCF, used as the PPS block-continuation marker
    pub const NULL: u8 = 0x00;

    // --- Phase B identification and command frames --------------------------
    /// Digital identification signal
    pub const DIS: u8 = 0x80;
    /// Digital transmit command
    pub const DTC: u8 = 0x81;
    /// Digital command signal
    pub const DCS: u8 = 0x82;
    /// Called subscriber identification
    pub const CSI: u8 = 0x40;
    /// Calling subscriber identification
    pub const CIG: u8 = 0x41;
    /// Transmitting subscriber identification
    pub const TSI: u8 = 0x42;
    /// Non-standard facilities
    pub const NSF: u8 = 0x20;
    /// Non-standard facilities command
    pub const NSC: u8 = 0x21;
    /// Non-standard facilities set-up
    pub const NSS: u8 = 0x22;
    /// Subaddress
    pub const SUB: u8 = 0xC2;
    /// Password (for transmission)
    pub const PWD: u8 = 0xC3;
    /// Selective polling address
    pub const SEP: u8 = 0xA1;
    /// Polled subaddress
    pub const PSA: u8 = 0xA3;
    /// Sender identification
    pub const SID: u8 = 0xA2;

    // --- Training ------------------------------------------------------------
    /// Confirmation to receive
    pub const CFR: u8 = 0x84;
    /// Failure to train
    pub const FTT: u8 = 0x44;

    // --- Post-page commands ---------------------------------------------------
    /// End of message (more documents follow, renegotiate)
    pub const EOM: u8 = 0x8E;
    /// Multipage signal (more pages, same format)
    pub const MPS: u8 = 0x4E;
    /// End of procedure
    pub const EOP: u8 = 0x2E;
    /// EOM with operator intervention requested
    pub const PRI_EOM: u8 = 0x9E;
    /// MPS with operator intervention requested
    pub const PRI_MPS: u8 = 0x5E;
    /// EOP with operator intervention requested
    pub const PRI_EOP: u8 = 0x3E;

    // --- Post-page responses ---------------------------------------------------
    /// Message confirmation
    pub const MCF: u8 = 0x8C;
    /// Retrain positive
    pub const RTP: u8 = 0xCC;
    /// Retrain negative
    pub const RTN: u8 = 0x4C;
    /// Procedure interrupt positive
    pub const PIP: u8 = 0xAC;
    /// Procedure interrupt negative
    pub const PIN: u8 = 0x2C;

    // --- Error correction mode -------------------------------------------------
    /// Facsimile coded data (ECM image frame)
    pub const FCD: u8 = 0x60;
    /// Return to control for partial page
    pub const RCP: u8 = 0x61;
    /// Partial page signal
    pub const PPS: u8 = 0xBE;
    /// Partial page request
    pub const PPR: u8 = 0xBC;
    /// End of retransmission
    pub const EOR: u8 = 0xCE;
    /// Response for end of retransmission
    pub const ERR: u8 = 0x1C;
    /// Continue to correct (rate renegotiation)
    pub const CTC: u8 = 0x48;
    /// Response for continue to correct
    pub const CTR: u8 = 0xC4;
    /// Receive ready
    pub const RR: u8 = 0xEE;
    /// Receive not ready
    pub const RNR: u8 = 0xEC;

    // --- Session control ---------------------------------------------------------
    /// Disconnect
    pub const DCN: u8 = 0xFA;
    /// Command repeat
    pub const CRP: u8 = 0x1A;
    /// Field not valid
    pub const FNV: u8 = 0xCA;
}

/// Returns a short name for a raw FCF octet, for log lines.
#[must_use]
pub const fn fcf_name(code: u8) -> &'static str {
    match code {
        fcf::NULL => "NULL",
        fcf::DIS => "DIS",
        fcf::DTC => "DTC",
        0x82 | 0x83 => "DCS",
        fcf::CSI => "CSI",
        fcf::CIG => "CIG",
        fcf::TSI => "TSI",
        fcf::NSF => "NSF",
        fcf::NSC => "NSC",
        0x22 | 0x23 => "NSS",
        fcf::SUB => "SUB",
        fcf::PWD => "PWD",
        fcf::SEP => "SEP",
        fcf::PSA => "PSA",
        fcf::SID => "SID",
        0x84 | 0x85 => "CFR",
        0x44 | 0x45 => "FTT",
        0x8E | 0x8F => "EOM",
        0x4E | 0x4F => "MPS",
        0x2E | 0x2F => "EOP",
        0x9E | 0x9F => "PRI-EOM",
        0x5E | 0x5F => "PRI-MPS",
        0x3E | 0x3F => "PRI-EOP",
        0x8C | 0x8D => "MCF",
        0xCC | 0xCD => "RTP",
        0x4C | 0x4D => "RTN",
        0xAC | 0xAD => "PIP",
        0x2C | 0x2D => "PIN",
        fcf::FCD => "FCD",
        fcf::RCP => "RCP",
        0xBE | 0xBF => "PPS",
        0xBC | 0xBD => "PPR",
        0xCE | 0xCF => "EOR",
        0x1C | 0x1D => "ERR",
        0x48 | 0x49 => "CTC",
        0xC4 | 0xC5 => "CTR",
        0xEE | 0xEF => "RR",
        0xEC | 0xED => "RNR",
        0xFA | 0xFB => "DCN",
        0x1A | 0x1B => "CRP",
        0xCA | 0xCB => "FNV",
        _ => "???",
    }
}

// =============================================================================
// Identifier Codec
// =============================================================================

/// Encode a station identifier into a 23-octet frame.
///
/// The characters go on the wire in reverse order and the field is padded
/// with trailing spaces to exactly 20 octets.
pub fn encode_ident_frame(out: &mut [u8; IDENT_FRAME_LEN], frame_fcf: u8, ident: &[u8]) {
    out[0] = ADDRESS_FIELD;
    out[1] = CONTROL_FIELD_NON_FINAL;
    out[2] = frame_fcf;

    let len = ident.len().min(MAX_IDENT_LEN);
    let mut p = 3;
    let mut i = len;
    while i > 0 {
        i -= 1;
        out[p] = ident[i];
        p += 1;
    }
    while p < IDENT_FRAME_LEN {
        out[p] = b' ';
        p += 1;
    }
}

/// Decode a 20-character identifier field back into `out`.
///
/// Reverses the wire order and trims the space padding. Returns the
/// decoded length. Short fields decode to however many characters are
/// present.
pub fn decode_ident_field(field: &[u8], out: &mut [u8; MAX_IDENT_LEN]) -> usize {
    let len = field.len().min(MAX_IDENT_LEN);
    let mut n = 0;
    let mut i = len;
    while i > 0 {
        i -= 1;
        // skip the leading (wire-order) space padding
        if n == 0 && field[i] == b' ' {
            continue;
        }
        out[n] = field[i];
        n += 1;
    }
    // padding is at the start of the wire field, which is the end of the
    // decoded string; trailing spaces inside the identifier are dropped too
    while n > 0 && out[n - 1] == b' ' {
        n -= 1;
    }
    n
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_round_trip() {
        let mut frame = [0u8; IDENT_FRAME_LEN];
        encode_ident_frame(&mut frame, fcf::CSI, b"+1 555 0100");

        assert_eq!(frame[0], ADDRESS_FIELD);
        assert_eq!(frame[1], CONTROL_FIELD_NON_FINAL);
        assert_eq!(frame[2], fcf::CSI);
        // first payload octet is the last character of the identifier
        assert_eq!(frame[3], b'0');

        let mut out = [0u8; MAX_IDENT_LEN];
        let n = decode_ident_field(&frame[3..], &mut out);
        assert_eq!(&out[..n], b"+1 555 0100");
    }

    #[test]
    fn ident_full_20_chars_survives() {
        let ident = b"01234567890123456789";
        let mut frame = [0u8; IDENT_FRAME_LEN];
        encode_ident_frame(&mut frame, fcf::TSI, ident);

        let mut out = [0u8; MAX_IDENT_LEN];
        let n = decode_ident_field(&frame[3..], &mut out);
        assert_eq!(&out[..n], ident);
    }

    #[test]
    fn ident_empty_encodes_all_spaces() {
        let mut frame = [0u8; IDENT_FRAME_LEN];
        encode_ident_frame(&mut frame, fcf::CIG, b"");
        assert!(frame[3..].iter().all(|&b| b == b' '));

        let mut out = [0u8; MAX_IDENT_LEN];
        assert_eq!(decode_ident_field(&frame[3..], &mut out), 0);
    }

    #[test]
    fn ident_wire_order_is_reversed() {
        let mut frame = [0u8; IDENT_FRAME_LEN];
        encode_ident_frame(&mut frame, fcf::TSI, b"AB");
        assert_eq!(frame[3], b'B');
        assert_eq!(frame[4], b'A');
        assert_eq!(frame[5], b' ');
    }

    #[test]
    fn fcf_mask_strips_dis_received_bit() {
        assert_eq!(fcf::DCS | 0x01, 0x83);
        assert_eq!((fcf::DCS | 0x01) & FCF_MASK, fcf::DCS);
        assert_eq!((fcf::EOP | 0x01) & FCF_MASK, fcf::EOP);
    }

    #[test]
    fn masked_codes_stay_distinct() {
        let finals = [
            fcf::DIS, fcf::DCS, fcf::CFR, fcf::FTT, fcf::EOM, fcf::MPS, fcf::EOP,
            fcf::PRI_EOM, fcf::PRI_MPS, fcf::PRI_EOP, fcf::MCF, fcf::RTP, fcf::RTN,
            fcf::PIP, fcf::PIN, fcf::PPS, fcf::PPR, fcf::EOR, fcf::ERR, fcf::CTC,
            fcf::CTR, fcf::RR, fcf::RNR, fcf::DCN, fcf::CRP,
        ];
        for (i, a) in finals.iter().enumerate() {
            for b in &finals[i + 1..] {
                assert_ne!(a & FCF_MASK, b & FCF_MASK, "{:#x} vs {:#x}", a, b);
            }
        }
    }

    #[test]
    fn fcf_names_cover_core_frames() {
        assert_eq!(fcf_name(fcf::DIS), "DIS");
        assert_eq!(fcf_name(fcf::DTC), "DTC");
        assert_eq!(fcf_name(fcf::DCN), "DCN");
        assert_eq!(fcf_name(0x83), "DCS");
        assert_eq!(fcf_name(0x76), "???");
    }
}
