//! Modem Fallback Ladder
//!
//! When training fails (FTT after TCF, or a burned PPR budget in ECM),
//! the transmitter walks down a fixed ladder of (bit rate, modulation)
//! pairs until both ends agree. Each entry carries the DCS
//! data-signalling-rate code that selects it on the wire.

use crate::env::Modulation;
use crate::session::config::ModemSupport;

// =============================================================================
// Ladder Entries
// =============================================================================

/// One rung of the fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackEntry {
    /// Bit rate in bits per second
    pub bit_rate: u16,
    /// Modulation at this rate
    pub modulation: Modulation,
    /// Modem families this rung belongs to
    pub which: ModemSupport,
    /// DCS data-signalling-rate code (bits 11-14 mask)
    pub dcs_code: u8,
}

/// The fallback ladder, fastest first.
pub const FALLBACK_SEQUENCE: [FallbackEntry; 8] = [
    FallbackEntry { bit_rate: 14400, modulation: Modulation::V17, which: ModemSupport::V17, dcs_code: 0x20 },
    FallbackEntry { bit_rate: 12000, modulation: Modulation::V17, which: ModemSupport::V17, dcs_code: 0x28 },
    FallbackEntry { bit_rate: 9600, modulation: Modulation::V17, which: ModemSupport::V17, dcs_code: 0x24 },
    FallbackEntry { bit_rate: 9600, modulation: Modulation::V29, which: ModemSupport::V29, dcs_code: 0x04 },
    FallbackEntry { bit_rate: 7200, modulation: Modulation::V17, which: ModemSupport::V17, dcs_code: 0x2C },
    FallbackEntry { bit_rate: 7200, modulation: Modulation::V29, which: ModemSupport::V29, dcs_code: 0x0C },
    FallbackEntry { bit_rate: 4800, modulation: Modulation::V27ter, which: ModemSupport::V27TER, dcs_code: 0x08 },
    FallbackEntry { bit_rate: 2400, modulation: Modulation::V27ter, which: ModemSupport::V27TER, dcs_code: 0x00 },
];

// =============================================================================
// Ladder Walks
// =============================================================================

/// Index of the fastest rung usable with the given permitted families.
#[must_use]
pub fn first_entry(permitted: ModemSupport) -> Option<usize> {
    FALLBACK_SEQUENCE.iter().position(|e| permitted.intersects(e.which))
}

/// Step down from `current` to the next usable rung.
#[must_use]
pub fn step(current: usize, permitted: ModemSupport) -> Option<usize> {
    FALLBACK_SEQUENCE
        .iter()
        .enumerate()
        .skip(current + 1)
        .find(|(_, e)| permitted.intersects(e.which))
        .map(|(i, _)| i)
}

/// Find the rung selected by a received DCS rate code.
#[must_use]
pub fn entry_by_dcs_code(code: u8) -> Option<usize> {
    FALLBACK_SEQUENCE.iter().position(|e| e.dcs_code == code)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_codes_match_wire_values() {
        assert_eq!(FALLBACK_SEQUENCE[0].dcs_code, 0x20);
        assert_eq!(FALLBACK_SEQUENCE[3].dcs_code, 0x04);
        assert_eq!(FALLBACK_SEQUENCE[7].dcs_code, 0x00);
    }

    #[test]
    fn starting_indices_per_family() {
        assert_eq!(first_entry(ModemSupport::V17 | ModemSupport::V29 | ModemSupport::V27TER), Some(0));
        assert_eq!(first_entry(ModemSupport::V29 | ModemSupport::V27TER), Some(3));
        assert_eq!(first_entry(ModemSupport::V27TER), Some(6));
        assert_eq!(first_entry(ModemSupport::empty()), None);
    }

    #[test]
    fn step_never_raises_bit_rate_and_terminates() {
        let permitted = ModemSupport::V17 | ModemSupport::V29 | ModemSupport::V27TER;
        let mut current = first_entry(permitted).unwrap();
        let mut rate = FALLBACK_SEQUENCE[current].bit_rate;
        let mut steps = 0;

        while let Some(next) = step(current, permitted) {
            assert!(FALLBACK_SEQUENCE[next].bit_rate <= rate);
            rate = FALLBACK_SEQUENCE[next].bit_rate;
            current = next;
            steps += 1;
            assert!(steps <= FALLBACK_SEQUENCE.len());
        }
        assert_eq!(current, 7);
    }

    #[test]
    fn step_skips_unsupported_families() {
        // V.29-only peer: 9600 V.29 then 7200 V.29 then nothing
        let permitted = ModemSupport::V29;
        let first = first_entry(permitted).unwrap();
        assert_eq!(FALLBACK_SEQUENCE[first].bit_rate, 9600);

        let second = step(first, permitted).unwrap();
        assert_eq!(FALLBACK_SEQUENCE[second].bit_rate, 7200);
        assert_eq!(FALLBACK_SEQUENCE[second].modulation, Modulation::V29);

        assert_eq!(step(second, permitted), None);
    }

    #[test]
    fn dcs_code_lookup() {
        assert_eq!(entry_by_dcs_code(0x04), Some(3));
        assert_eq!(entry_by_dcs_code(0x0C), Some(5));
        assert_eq!(entry_by_dcs_code(0x14), None);
    }
}
