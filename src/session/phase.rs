//! Call Phases and Flow-Chart States
//!
//! A session tracks two interleaved state spaces: the coarse T.30 call
//! phase (A through E), which decides what the modems are doing, and the
//! fine flow-chart state, which decides how the next HDLC frame is
//! interpreted. The phase controller in the session keeps them
//! consistent; this module holds the enumerations.

// =============================================================================
// Call Phase
// =============================================================================

/// The coarse T.30 call phase.
///
/// Each phase selects one receive and one transmit modem type. A phase
/// change requested while the receive carrier is still up is deferred
/// until the carrier drops (`queue_phase`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Not in a call
    #[default]
    Idle,
    /// Phase A, answering: sending CED
    ACed,
    /// Phase A, calling: sending CNG
    ACng,
    /// Phase B, listening for negotiation frames
    BRx,
    /// Phase B, sending negotiation frames
    BTx,
    /// Phase C, receiving non-ECM image data
    CNonEcmRx,
    /// Phase C, sending non-ECM image data (or TCF)
    CNonEcmTx,
    /// Phase C, receiving ECM image frames
    CEcmRx,
    /// Phase C, sending ECM image frames
    CEcmTx,
    /// Phase D, listening for post-page signals
    DRx,
    /// Phase D, sending post-page signals
    DTx,
    /// Phase E, call release in progress
    E,
    /// The call is over
    CallFinished,
}

impl Phase {
    /// Returns a short name for log lines
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::ACed => "A (CED)",
            Phase::ACng => "A (CNG)",
            Phase::BRx => "B rx",
            Phase::BTx => "B tx",
            Phase::CNonEcmRx => "C non-ECM rx",
            Phase::CNonEcmTx => "C non-ECM tx",
            Phase::CEcmRx => "C ECM rx",
            Phase::CEcmTx => "C ECM tx",
            Phase::DRx => "D rx",
            Phase::DTx => "D tx",
            Phase::E => "E",
            Phase::CallFinished => "call finished",
        }
    }
}

// =============================================================================
// Flow-Chart State
// =============================================================================

/// Position in the T.30 flow charts.
///
/// Names follow the chart labels: `T`/`R`/`D`/`I`-series states run on
/// the calling (usually transmitting) side, `F`-series on the answering
/// (usually receiving) side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Answerer: CED in progress, nothing heard yet
    #[default]
    Answering,
    /// Terminal state after disconnecting
    B,
    /// Waiting for our DCN to finish sending
    C,
    /// Caller: DCS burst going out
    D,
    /// Caller: TCF going out
    DTcf,
    /// Caller: awaiting the TCF verdict
    DPostTcf,
    /// Answerer: receiving TCF
    FTcf,
    /// Answerer: CFR sent, document expected
    FCfr,
    /// Answerer: FTT sent, new DCS expected
    FFtt,
    /// Answerer: receiving a non-ECM document
    FDocNonEcm,
    /// Answerer: non-ECM page done, awaiting the post-page command
    FPostDocNonEcm,
    /// Answerer: receiving ECM frames
    FDocEcm,
    /// Answerer: RCP seen, awaiting PPS
    FPostDocEcm,
    /// Answerer: MCF sent for a partial page
    FPostRcpMcf,
    /// Answerer: PPR sent, retransmission expected
    FPostRcpPpr,
    /// Answerer: RNR sent, RR expected
    FPostRcpRnr,
    /// Answerer: DIS sent, command expected
    R,
    /// Caller: awaiting DIS
    T,
    /// Caller: sending a non-ECM document page
    I,
    /// Caller: post-page command going out
    II,
    /// Caller: awaiting the post-page response
    IIQ,
    /// Receiver: MCF sent after a complete page
    IIIQMcf,
    /// Receiver: RTP sent after a marginal page
    IIIQRtp,
    /// Receiver: RTN sent after a bad page
    IIIQRtn,
    /// Caller: ECM frame burst going out
    IV,
    /// Caller: PPS-NULL sent at a block boundary
    IVPpsNull,
    /// Caller: PPS-Q sent at a page boundary
    IVPpsQ,
    /// Caller: RNR received, polling with RR
    IVPpsRnr,
    /// Caller: CTC sent, CTR expected
    IVCtc,
    /// Caller: EOR sent, ERR expected
    IVEor,
    /// Caller: RNR received after EOR, polling with RR
    IVEorRnr,
    /// The call is over
    CallFinished,
}

impl State {
    /// Returns the flow-chart label for log lines
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            State::Answering => "ANSWERING",
            State::B => "B",
            State::C => "C",
            State::D => "D",
            State::DTcf => "D-TCF",
            State::DPostTcf => "D-POST-TCF",
            State::FTcf => "F-TCF",
            State::FCfr => "F-CFR",
            State::FFtt => "F-FTT",
            State::FDocNonEcm => "F-DOC-NON-ECM",
            State::FPostDocNonEcm => "F-POST-DOC-NON-ECM",
            State::FDocEcm => "F-DOC-ECM",
            State::FPostDocEcm => "F-POST-DOC-ECM",
            State::FPostRcpMcf => "F-POST-RCP-MCF",
            State::FPostRcpPpr => "F-POST-RCP-PPR",
            State::FPostRcpRnr => "F-POST-RCP-RNR",
            State::R => "R",
            State::T => "T",
            State::I => "I",
            State::II => "II",
            State::IIQ => "II-Q",
            State::IIIQMcf => "III-Q-MCF",
            State::IIIQRtp => "III-Q-RTP",
            State::IIIQRtn => "III-Q-RTN",
            State::IV => "IV",
            State::IVPpsNull => "IV-PPS-NULL",
            State::IVPpsQ => "IV-PPS-Q",
            State::IVPpsRnr => "IV-PPS-RNR",
            State::IVCtc => "IV-CTC",
            State::IVEor => "IV-EOR",
            State::IVEorRnr => "IV-EOR-RNR",
            State::CallFinished => "CALL-FINISHED",
        }
    }
}

/// Which waiting context a running T2 belongs to, for timeout reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum T2Context {
    /// Waiting for a phase B command
    #[default]
    Command,
    /// Waiting for the document carrier
    Fax,
    /// Waiting for phase D signals
    PhaseD,
    /// Waiting for the next page command
    NextPage,
    /// Waiting for RR
    ReceiveReady,
    /// Waiting for the final DCN
    Dcn,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_are_distinct_for_c_variants() {
        assert_ne!(Phase::CNonEcmRx.as_str(), Phase::CEcmRx.as_str());
        assert_ne!(Phase::CNonEcmTx.as_str(), Phase::CNonEcmRx.as_str());
    }

    #[test]
    fn state_labels_match_flow_charts() {
        assert_eq!(State::DPostTcf.as_str(), "D-POST-TCF");
        assert_eq!(State::IIQ.as_str(), "II-Q");
        assert_eq!(State::IVPpsNull.as_str(), "IV-PPS-NULL");
        assert_eq!(State::FPostRcpRnr.as_str(), "F-POST-RCP-RNR");
    }

    #[test]
    fn defaults() {
        assert_eq!(Phase::default(), Phase::Idle);
        assert_eq!(State::default(), State::Answering);
    }
}
