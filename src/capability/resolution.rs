//! Resolution, Width and Scan-Time Tables
//!
//! Negotiation of image geometry is table driven: an (x, y) resolution
//! pair (in pels per metre) maps to a unique set of DCS bits, the pel
//! width of a page maps through a per-resolution-class width matrix to a
//! recording-width code, and the receiver's minimum-scan-line-time field
//! is translated to the DCS code the transmitter will actually honor.

use super::bit;

// =============================================================================
// Resolution Constants (pels per metre)
// =============================================================================

/// R8 horizontal resolution (8.04 pels/mm, 1728 pels over 215 mm)
pub const X_R8: u32 = 8037;
/// R16 horizontal resolution
pub const X_R16: u32 = 16074;
/// 200 dpi horizontal resolution
pub const X_DPI200: u32 = 7874;
/// 300 dpi horizontal resolution
pub const X_DPI300: u32 = 11811;
/// 400 dpi horizontal resolution
pub const X_DPI400: u32 = 15748;
/// 600 dpi horizontal resolution
pub const X_DPI600: u32 = 23622;
/// 1200 dpi horizontal resolution
pub const X_DPI1200: u32 = 47244;

/// Standard vertical resolution (3.85 lines/mm)
pub const Y_STANDARD: u32 = 3850;
/// Fine vertical resolution (7.7 lines/mm)
pub const Y_FINE: u32 = 7700;
/// Superfine vertical resolution (15.4 lines/mm)
pub const Y_SUPERFINE: u32 = 15400;
/// 100 dpi vertical resolution
pub const Y_DPI100: u32 = 3937;
/// 200 dpi vertical resolution
pub const Y_DPI200: u32 = 7874;
/// 300 dpi vertical resolution
pub const Y_DPI300: u32 = 11811;
/// 400 dpi vertical resolution
pub const Y_DPI400: u32 = 15748;
/// 600 dpi vertical resolution
pub const Y_DPI600: u32 = 23622;
/// 800 dpi vertical resolution
pub const Y_DPI800: u32 = 31496;
/// 1200 dpi vertical resolution
pub const Y_DPI1200: u32 = 47244;

// =============================================================================
// Resolution Table
// =============================================================================

/// One negotiable (x, y) resolution pair.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionEntry {
    /// Horizontal resolution, pels per metre
    pub x: u32,
    /// Vertical resolution, pels per metre
    pub y: u32,
    /// DIS capability bit the far end must advertise; `None` for the
    /// mandatory base resolution
    pub dis_bit: Option<u8>,
    /// DCS bits selecting this resolution
    pub dcs_bits: &'static [u8],
    /// Row in [`WIDTHS`] for this horizontal resolution
    pub x_class: usize,
    /// Row in [`TRANSLATED_MIN_SCAN_TIME`]: 0 standard, 1 fine, 2 higher
    pub vres_class: usize,
}

/// All negotiable resolution pairs. Pairs outside this table fail with
/// `ResolutionNotSupported`.
pub const RESOLUTIONS: [ResolutionEntry; 14] = [
    ResolutionEntry { x: X_R8, y: Y_STANDARD, dis_bit: None, dcs_bits: &[], x_class: 0, vres_class: 0 },
    ResolutionEntry { x: X_R8, y: Y_FINE, dis_bit: Some(bit::FINE), dcs_bits: &[bit::FINE], x_class: 0, vres_class: 1 },
    ResolutionEntry { x: X_R8, y: Y_SUPERFINE, dis_bit: Some(bit::SUPERFINE), dcs_bits: &[bit::SUPERFINE], x_class: 0, vres_class: 2 },
    ResolutionEntry { x: X_R16, y: Y_SUPERFINE, dis_bit: Some(bit::RES_400), dcs_bits: &[bit::RES_400], x_class: 2, vres_class: 2 },
    ResolutionEntry { x: X_DPI200, y: Y_DPI100, dis_bit: None, dcs_bits: &[bit::INCH_PREFERRED], x_class: 0, vres_class: 0 },
    ResolutionEntry { x: X_DPI200, y: Y_DPI200, dis_bit: Some(bit::FINE), dcs_bits: &[bit::FINE, bit::INCH_PREFERRED], x_class: 0, vres_class: 1 },
    ResolutionEntry { x: X_DPI200, y: Y_DPI400, dis_bit: Some(bit::SUPERFINE), dcs_bits: &[bit::SUPERFINE, bit::INCH_PREFERRED], x_class: 0, vres_class: 2 },
    ResolutionEntry { x: X_DPI300, y: Y_DPI300, dis_bit: Some(bit::RES_300), dcs_bits: &[bit::RES_300], x_class: 1, vres_class: 2 },
    ResolutionEntry { x: X_DPI400, y: Y_DPI400, dis_bit: Some(bit::RES_400), dcs_bits: &[bit::RES_400, bit::INCH_PREFERRED], x_class: 2, vres_class: 2 },
    ResolutionEntry { x: X_DPI600, y: Y_DPI600, dis_bit: Some(bit::RES_600), dcs_bits: &[bit::RES_600], x_class: 3, vres_class: 2 },
    ResolutionEntry { x: X_DPI1200, y: Y_DPI1200, dis_bit: Some(bit::RES_1200), dcs_bits: &[bit::RES_1200], x_class: 5, vres_class: 2 },
    ResolutionEntry { x: X_DPI300, y: Y_DPI600, dis_bit: Some(bit::RES_300_600), dcs_bits: &[bit::RES_300_600], x_class: 1, vres_class: 2 },
    ResolutionEntry { x: X_DPI400, y: Y_DPI800, dis_bit: Some(bit::RES_400_800), dcs_bits: &[bit::RES_400_800], x_class: 2, vres_class: 2 },
    ResolutionEntry { x: X_DPI600, y: Y_DPI1200, dis_bit: Some(bit::RES_600_1200), dcs_bits: &[bit::RES_600_1200], x_class: 3, vres_class: 2 },
];

/// Look up the table entry for an exact (x, y) pair.
#[must_use]
pub fn lookup_resolution(x: u32, y: u32) -> Option<&'static ResolutionEntry> {
    RESOLUTIONS.iter().find(|e| e.x == x && e.y == y)
}

// =============================================================================
// Width Matrix
// =============================================================================

/// Supported page widths in pels, by horizontal resolution class (rows)
/// and recording width class (columns 215 mm, 255 mm, 303 mm). `-1`
/// marks an unsupported combination.
pub const WIDTHS: [[i32; 4]; 6] = [
    [1728, 2048, 2432, -1],    // R8 / 200 dpi
    [2592, 3072, 3648, -1],    // 300 dpi
    [3456, 4096, 4864, -1],    // R16 / 400 dpi
    [5184, 6144, 7296, -1],    // 600 dpi
    [6912, 8192, 9728, -1],    // 800 dpi
    [10368, 12288, 14592, -1], // 1200 dpi
];

/// Map a pel width to its recording-width code (0 = 215 mm, 1 = 255 mm,
/// 2 = 303 mm) within a horizontal resolution class.
#[must_use]
pub fn width_code(x_class: usize, width: u16) -> Option<u8> {
    let row = WIDTHS.get(x_class)?;
    row.iter().position(|&w| w == i32::from(width)).map(|c| c as u8)
}

/// Pel width for a recording-width code within a resolution class.
#[must_use]
pub fn width_for_code(x_class: usize, code: u8) -> Option<u16> {
    let w = *WIDTHS.get(x_class)?.get(code as usize)?;
    u16::try_from(w).ok()
}

// =============================================================================
// Minimum Scan Line Time
// =============================================================================

/// DCS minimum-scan-time code: 0 ms
pub const MIN_SCAN_0MS: u8 = 7;
/// DCS minimum-scan-time code: 5 ms
pub const MIN_SCAN_5MS: u8 = 1;
/// DCS minimum-scan-time code: 10 ms
pub const MIN_SCAN_10MS: u8 = 2;
/// DCS minimum-scan-time code: 20 ms
pub const MIN_SCAN_20MS: u8 = 0;
/// DCS minimum-scan-time code: 40 ms
pub const MIN_SCAN_40MS: u8 = 4;

/// Translation from the receiver's advertised minimum scan time (DIS bits
/// 21-23) to the DCS code we will use, by negotiated vertical resolution
/// class. Higher vertical resolutions halve the per-row time the far end
/// needs.
pub const TRANSLATED_MIN_SCAN_TIME: [[u8; 8]; 3] = [
    [
        MIN_SCAN_20MS, MIN_SCAN_5MS, MIN_SCAN_10MS, MIN_SCAN_20MS,
        MIN_SCAN_40MS, MIN_SCAN_40MS, MIN_SCAN_10MS, MIN_SCAN_0MS,
    ],
    [
        MIN_SCAN_20MS, MIN_SCAN_5MS, MIN_SCAN_10MS, MIN_SCAN_10MS,
        MIN_SCAN_40MS, MIN_SCAN_20MS, MIN_SCAN_5MS, MIN_SCAN_0MS,
    ],
    [
        MIN_SCAN_10MS, MIN_SCAN_5MS, MIN_SCAN_5MS, MIN_SCAN_5MS,
        MIN_SCAN_20MS, MIN_SCAN_10MS, MIN_SCAN_5MS, MIN_SCAN_0MS,
    ],
];

/// Translate the far end's DIS minimum-scan-time field into the DCS code
/// for the given vertical resolution class.
#[must_use]
pub fn translate_min_scan_time(dis_code: u8, vres_class: usize) -> u8 {
    let row = vres_class.min(2);
    TRANSLATED_MIN_SCAN_TIME[row][(dis_code & 0x07) as usize]
}

// =============================================================================
// Unit Tests
// =============================================================================
