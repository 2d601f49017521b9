//! Configuration types for the T.30 session controller

use crate::capability::resolution::MIN_SCAN_0MS;
use crate::frames::{MAX_IDENT_LEN, MAX_NSF_LEN};
use crate::session::error::{ConfigError, ConfigResult};

bitflags::bitflags! {
    /// Supported modem families for T.30 negotiation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModemSupport: u8 {
        /// V.27ter (2400/4800 bps)
        const V27TER = 0x01;
        /// V.29 (7200/9600 bps)
        const V29 = 0x02;
        /// V.17 (7200-14400 bps)
        const V17 = 0x04;
        /// Internet-aware FAX (IAF)
        const IAF = 0x10;
    }

    /// Internet-aware fax operating modes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IafMode: u8 {
        /// The transport provides flow control
        const FLOW_CONTROL = 0x01;
        /// The transport provides continuous flow
        const CONTINUOUS_FLOW = 0x02;
        /// Skip the TCF training check (T.38 without a PSTN leg)
        const NO_TCF = 0x04;
    }

    /// Supported image compressions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Compressions: u8 {
        /// T.4 one-dimensional (MH)
        const T4_1D = 0x01;
        /// T.4 two-dimensional (MR)
        const T4_2D = 0x02;
        /// T.6 (MMR, requires ECM)
        const T6 = 0x04;
    }

    /// Supported receive resolutions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Resolutions: u8 {
        /// R8 x 3.85 lines/mm (mandatory)
        const STANDARD = 0x01;
        /// R8 x 7.7 lines/mm and 200 x 200
        const FINE = 0x02;
        /// R8 x 15.4 lines/mm and 200 x 400
        const SUPERFINE = 0x04;
        /// 300 x 300 family
        const R300 = 0x08;
        /// R16 x 15.4 and 400 x 400 family
        const R400 = 0x10;
        /// 600 x 600 family
        const R600 = 0x20;
        /// 1200 x 1200 family
        const R1200 = 0x40;
    }

    /// Supported recording widths and lengths.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ImageSizes: u16 {
        /// 215 mm scan line (mandatory)
        const WIDTH_215 = 0x0001;
        /// 255 mm scan line
        const WIDTH_255 = 0x0002;
        /// 303 mm scan line
        const WIDTH_303 = 0x0004;
        /// A4 recording length (297 mm)
        const LENGTH_A4 = 0x0010;
        /// B4 recording length (364 mm)
        const LENGTH_B4 = 0x0020;
        /// Unlimited recording length
        const LENGTH_UNLIMITED = 0x0040;
        /// North American letter
        const LETTER = 0x0100;
        /// North American legal
        const LEGAL = 0x0200;
    }
}

impl Default for ModemSupport {
    /// Default: V.27ter + V.29 + V.17 (standard fax modems).
    fn default() -> Self {
        Self::V27TER | Self::V29 | Self::V17
    }
}

impl Default for IafMode {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for Compressions {
    fn default() -> Self {
        Self::T4_1D | Self::T4_2D
    }
}

impl Default for Resolutions {
    fn default() -> Self {
        Self::STANDARD | Self::FINE
    }
}

impl Default for ImageSizes {
    fn default() -> Self {
        Self::WIDTH_215 | Self::LENGTH_A4 | Self::LENGTH_B4 | Self::LENGTH_UNLIMITED
    }
}

// =============================================================================
// Fixed-Capacity Strings
// =============================================================================

/// A station identifier: up to 20 printable ASCII characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ident {
    buf: [u8; MAX_IDENT_LEN],
    len: u8,
}

impl Ident {
    /// The empty identifier.
    pub const EMPTY: Self = Self { buf: [b' '; MAX_IDENT_LEN], len: 0 };

    /// Validate and store an identifier string.
    pub fn new(s: &str) -> ConfigResult<Self> {
        if s.len() > MAX_IDENT_LEN {
            return Err(ConfigError::IdentTooLong);
        }
        if !s.bytes().all(|b| (0x20..0x7F).contains(&b)) {
            return Err(ConfigError::InvalidIdent);
        }
        let mut ident = Self::EMPTY;
        ident.buf[..s.len()].copy_from_slice(s.as_bytes());
        ident.len = s.len() as u8;
        Ok(ident)
    }

    /// Store raw octets decoded off the wire, unchecked beyond length.
    pub(crate) fn from_wire(bytes: &[u8]) -> Self {
        let n = bytes.len().min(MAX_IDENT_LEN);
        let mut ident = Self::EMPTY;
        ident.buf[..n].copy_from_slice(&bytes[..n]);
        ident.len = n as u8;
        ident
    }

    /// The identifier characters.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    /// The identifier as a string slice; non-ASCII wire junk reads empty.
    #[must_use]
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    /// Whether the identifier is unset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Ident {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A non-standard facilities payload: up to 100 opaque octets, the first
/// of which is the T.35 country code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nsf {
    buf: [u8; MAX_NSF_LEN],
    len: u8,
}

impl Nsf {
    /// The empty blob.
    pub const EMPTY: Self = Self { buf: [0; MAX_NSF_LEN], len: 0 };

    /// Validate and store an NSF payload.
    pub fn new(bytes: &[u8]) -> ConfigResult<Self> {
        if bytes.len() > MAX_NSF_LEN {
            return Err(ConfigError::NsfTooLong);
        }
        let mut nsf = Self::EMPTY;
        nsf.buf[..bytes.len()].copy_from_slice(bytes);
        nsf.len = bytes.len() as u8;
        Ok(nsf)
    }

    pub(crate) fn from_wire(bytes: &[u8]) -> Self {
        let n = bytes.len().min(MAX_NSF_LEN);
        let mut nsf = Self::EMPTY;
        nsf.buf[..n].copy_from_slice(&bytes[..n]);
        nsf.len = n as u8;
        nsf
    }

    /// The payload octets.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    /// Whether the blob is unset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Nsf {
    fn default() -> Self {
        Self::EMPTY
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// T.30 session configuration.
///
/// Built once before [`restart`](crate::T30Session::restart) with the
/// `with_*` methods; the session rejects changes while a call is active.
///
/// # Example
/// ```ignore
/// let config = T30Config::new(true)
///     .with_tx_document(true)
///     .with_ecm(true)
///     .with_local_ident("+1 555 0100")?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct T30Config {
    /// This session placed the call (true) or answered it (false)
    pub calling_party: bool,
    /// A document is queued for transmission
    pub tx_document: bool,
    /// Receiving documents is permitted
    pub rx_allowed: bool,
    /// ECM may be negotiated
    pub ecm_allowed: bool,
    /// Modem families offered in negotiation
    pub supported_modems: ModemSupport,
    /// Compressions offered in negotiation
    pub supported_compressions: Compressions,
    /// Resolutions offered in negotiation
    pub supported_resolutions: Resolutions,
    /// Recording widths and lengths offered in negotiation
    pub supported_image_sizes: ImageSizes,
    /// Internet-aware fax modes in force
    pub iaf: IafMode,
    /// Advertise T.37 store-and-forward capability
    pub t37_capable: bool,
    /// Advertise T.38 real-time capability
    pub t38_capable: bool,
    /// Local station identifier (CSI/TSI/CIG)
    pub local_ident: Ident,
    /// Subaddress sent with DCS (SUB)
    pub sub_address: Ident,
    /// Password sent with DCS (PWD)
    pub password: Ident,
    /// Selective polling address sent with DTC (SEP)
    pub sep_address: Ident,
    /// Non-standard facilities payload (NSF)
    pub nsf: Nsf,
    /// Answer bad frames with CRP instead of silence
    pub crp_enabled: bool,
    /// Times to claim not-ready (RNR) before answering a PPS, for flow
    /// control testing
    pub receiver_not_ready_count: u8,
    /// Minimum scan line time we need as a receiver (DIS bits 21-23)
    pub rx_min_scan_time_code: u8,
}

impl T30Config {
    /// Create a configuration for a calling or answering session with
    /// the standard capability set.
    #[must_use]
    pub const fn new(calling_party: bool) -> Self {
        Self {
            calling_party,
            tx_document: false,
            rx_allowed: true,
            ecm_allowed: true,
            supported_modems: ModemSupport::V27TER
                .union(ModemSupport::V29)
                .union(ModemSupport::V17),
            supported_compressions: Compressions::T4_1D.union(Compressions::T4_2D),
            supported_resolutions: Resolutions::STANDARD.union(Resolutions::FINE),
            supported_image_sizes: ImageSizes::WIDTH_215
                .union(ImageSizes::LENGTH_A4)
                .union(ImageSizes::LENGTH_B4)
                .union(ImageSizes::LENGTH_UNLIMITED),
            iaf: IafMode::empty(),
            t37_capable: false,
            t38_capable: false,
            local_ident: Ident::EMPTY,
            sub_address: Ident::EMPTY,
            password: Ident::EMPTY,
            sep_address: Ident::EMPTY,
            nsf: Nsf::EMPTY,
            crp_enabled: false,
            receiver_not_ready_count: 0,
            rx_min_scan_time_code: MIN_SCAN_0MS,
        }
    }

    /// Queue (or clear) a document for transmission.
    #[must_use]
    pub const fn with_tx_document(mut self, tx_document: bool) -> Self {
        self.tx_document = tx_document;
        self
    }

    /// Permit or forbid receiving.
    #[must_use]
    pub const fn with_rx_allowed(mut self, rx_allowed: bool) -> Self {
        self.rx_allowed = rx_allowed;
        self
    }

    /// Allow or forbid ECM negotiation.
    #[must_use]
    pub const fn with_ecm(mut self, ecm_allowed: bool) -> Self {
        self.ecm_allowed = ecm_allowed;
        self
    }

    /// Set the offered modem families.
    #[must_use]
    pub const fn with_supported_modems(mut self, modems: ModemSupport) -> Self {
        self.supported_modems = modems;
        self
    }

    /// Set the offered compressions.
    #[must_use]
    pub const fn with_supported_compressions(mut self, compressions: Compressions) -> Self {
        self.supported_compressions = compressions;
        self
    }

    /// Set the offered resolutions.
    #[must_use]
    pub const fn with_supported_resolutions(mut self, resolutions: Resolutions) -> Self {
        self.supported_resolutions = resolutions;
        self
    }

    /// Set the offered recording sizes.
    #[must_use]
    pub const fn with_supported_image_sizes(mut self, sizes: ImageSizes) -> Self {
        self.supported_image_sizes = sizes;
        self
    }

    /// Set the Internet-aware fax modes.
    #[must_use]
    pub const fn with_iaf_mode(mut self, iaf: IafMode) -> Self {
        self.iaf = iaf;
        self
    }

    /// Enable CRP responses to corrupt frames.
    #[must_use]
    pub const fn with_crp(mut self, crp_enabled: bool) -> Self {
        self.crp_enabled = crp_enabled;
        self
    }

    /// Claim not-ready this many times before answering a PPS.
    #[must_use]
    pub const fn with_receiver_not_ready_count(mut self, count: u8) -> Self {
        self.receiver_not_ready_count = count;
        self
    }

    /// Set the local station identifier.
    pub fn with_local_ident(mut self, ident: &str) -> ConfigResult<Self> {
        self.local_ident = Ident::new(ident)?;
        Ok(self)
    }

    /// Set the subaddress transmitted with DCS.
    pub fn with_sub_address(mut self, sub: &str) -> ConfigResult<Self> {
        self.sub_address = Ident::new(sub)?;
        Ok(self)
    }

    /// Set the password transmitted with DCS.
    pub fn with_password(mut self, password: &str) -> ConfigResult<Self> {
        self.password = Ident::new(password)?;
        Ok(self)
    }

    /// Set the selective polling address transmitted with DTC.
    pub fn with_sep_address(mut self, sep: &str) -> ConfigResult<Self> {
        self.sep_address = Ident::new(sep)?;
        Ok(self)
    }

    /// Set the non-standard facilities payload.
    pub fn with_nsf(mut self, nsf: &[u8]) -> ConfigResult<Self> {
        self.nsf = Nsf::new(nsf)?;
        Ok(self)
    }
}

impl Default for T30Config {
    fn default() -> Self {
        Self::new(false)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_modem_support_is_standard_set() {
        let modems = ModemSupport::default();
        assert!(modems.contains(ModemSupport::V27TER));
        assert!(modems.contains(ModemSupport::V29));
        assert!(modems.contains(ModemSupport::V17));
        assert!(!modems.contains(ModemSupport::IAF));
    }

    #[test]
    fn ident_validation() {
        assert!(Ident::new("+1 555 0100").is_ok());
        assert_eq!(Ident::new("012345678901234567890").unwrap_err(), ConfigError::IdentTooLong);
        assert_eq!(Ident::new("caf\u{e9}").unwrap_err(), ConfigError::InvalidIdent);
        assert_eq!(Ident::new("tab\there").unwrap_err(), ConfigError::InvalidIdent);
    }

    #[test]
    fn ident_round_trips_as_str() {
        let ident = Ident::new("FAX STATION 1").unwrap();
        assert_eq!(ident.as_str(), "FAX STATION 1");
        assert!(!ident.is_empty());
        assert!(Ident::EMPTY.is_empty());
    }

    #[test]
    fn nsf_length_limit() {
        assert!(Nsf::new(&[0u8; 100]).is_ok());
        assert_eq!(Nsf::new(&[0u8; 101]).unwrap_err(), ConfigError::NsfTooLong);
    }

    #[test]
    fn builder_chain() {
        let config = T30Config::new(true)
            .with_tx_document(true)
            .with_ecm(false)
            .with_receiver_not_ready_count(2)
            .with_local_ident("STATION")
            .unwrap();

        assert!(config.calling_party);
        assert!(config.tx_document);
        assert!(!config.ecm_allowed);
        assert_eq!(config.receiver_not_ready_count, 2);
        assert_eq!(config.local_ident.as_str(), "STATION");
    }

    #[test]
    fn config_is_const_constructible() {
        const CONFIG: T30Config = T30Config::new(false).with_ecm(true);
        assert!(!CONFIG.calling_party);
        assert!(CONFIG.ecm_allowed);
    }
}
