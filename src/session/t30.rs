//! Core T.30 session implementation.
//!
//! This module contains the main [`T30Session`] structure and the facade
//! entry points the front end drives:
//!
//! - [`restart`](T30Session::restart) and [`terminate`](T30Session::terminate)
//! - [`hdlc_accept`](T30Session::hdlc_accept) for decoded V.21 traffic
//! - [`non_ecm_put_bit`](T30Session::non_ecm_put_bit) /
//!   [`non_ecm_get_bit`](T30Session::non_ecm_get_bit) and friends for the
//!   image-carrier bit streams
//! - [`front_end_status`](T30Session::front_end_status) for send/receive
//!   completion reports
//! - [`timer_tick`](T30Session::timer_tick) for the sample clock
//!
//! Frame interpretation lives in the [`states`](super::states) module;
//! this one owns phase control, timers, the send primitives and the
//! transmit-side data paths.

use crate::capability::resolution::{self, ResolutionEntry};
use crate::capability::{self, DisDtcFrame};
use crate::env::{
    Environment, FrontEndEvent, HdlcEvent, ModemType, NextTxPage,
    SIG_STATUS_CARRIER_DOWN, SIG_STATUS_CARRIER_UP, SIG_STATUS_END_OF_DATA,
    SIG_STATUS_TRAINING_FAILED, SIG_STATUS_TRAINING_SUCCEEDED, T30_END_OF_DATA_BYTE,
};
use crate::fallback::{self, FALLBACK_SEQUENCE};
use crate::frames::{
    ADDRESS_FIELD, CONTROL_FIELD_FINAL, CONTROL_FIELD_NON_FINAL, IDENT_FRAME_LEN, fcf, fcf_name,
    encode_ident_frame,
};
use crate::session::config::{Compressions, Ident, ModemSupport, Nsf, T30Config, IafMode};
use crate::session::ecm::{ECM_FRAME_MAP_LEN, EcmBuffer, MAX_ECM_FRAME_OCTETS};
use crate::session::error::{ConfigError, ConfigResult, Status};
use crate::session::phase::{Phase, State, T2Context};
use crate::session::timers::Timers;
use crate::t30_debug;

// =============================================================================
// Session Constants
// =============================================================================

/// Bound on command/response retries before the session gives up.
pub const MAX_MESSAGE_TRIES: u8 = 3;

/// Consecutive PPR bursts tolerated before switching rate (CTC) or
/// abandoning the remainder (EOR).
pub const PPR_LIMIT_BEFORE_CTC_OR_EOR: u8 = 4;

/// TCF duration in milliseconds (1.5 s of zeros at the candidate rate).
pub const TCF_DURATION_MS: u32 = 1500;

// =============================================================================
// Negotiated Parameters
// =============================================================================

/// The parameters negotiated for the current document transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferParams {
    /// Image carrier bit rate in bits per second
    pub bit_rate: u16,
    /// Image carrier modulation
    pub modulation: crate::env::Modulation,
    /// Error correction mode in use
    pub ecm: bool,
    /// ECM frame payload size (64 or 256 octets)
    pub octets_per_ecm_frame: u16,
    /// Page width in pels
    pub image_width: u16,
    /// Horizontal resolution in pels per metre
    pub x_resolution: u32,
    /// Vertical resolution in pels per metre
    pub y_resolution: u32,
    /// Two-dimensional (or T.6) coding selected
    pub compression: Compressions,
}

/// A PPS awaiting an answer while we pretend to be busy (RNR flow).
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingPps {
    pub fcf2: u8,
    pub page: u8,
    pub block: u8,
}

// =============================================================================
// T.30 Session
// =============================================================================

/// A T.30 Group-3 facsimile session controller.
///
/// A session acts as a single party (caller or answerer, fixed by its
/// configuration), owns its [`Environment`], and is driven entirely by
/// the facade entry points. It never blocks; every entry point runs to
/// completion and returns.
///
/// # Example
/// ```ignore
/// let config = T30Config::new(true).with_tx_document(true);
/// let mut session = T30Session::new(config, glue);
/// session.restart();
///
/// loop {
///     session.timer_tick(SAMPLES_PER_CHUNK);
///     // feed hdlc_accept / non_ecm_put_bit / front_end_status
///     // from the modem layer as events arrive
/// }
/// ```
pub struct T30Session<E: Environment> {
    pub(crate) env: E,
    pub(crate) config: T30Config,

    pub(crate) status: Status,
    pub(crate) phase: Phase,
    pub(crate) next_phase: Option<Phase>,
    pub(crate) state: State,
    phase_e_reported: bool,

    pub(crate) timers: Timers,
    pub(crate) t2_context: T2Context,
    pub(crate) retries: u8,

    pub(crate) dis_received: bool,
    pub(crate) far_end_detected: bool,
    pub(crate) rx_signal_present: bool,
    pub(crate) rx_trained: bool,

    // Negotiation state
    pub(crate) local_dis: DisDtcFrame,
    pub(crate) remote_dis: DisDtcFrame,
    pub(crate) remote_dis_valid: bool,
    pub(crate) dcs: DisDtcFrame,
    pub(crate) permitted_modems: ModemSupport,
    pub(crate) current_fallback: usize,
    pub(crate) short_train: bool,
    pub(crate) use_ecm: bool,
    pub(crate) octets_per_ecm_frame: usize,
    pub(crate) x_resolution: u32,
    pub(crate) y_resolution: u32,
    pub(crate) image_width: u16,
    pub(crate) selected_compression: Compressions,

    // TCF handling
    tcf_test_bits: i32,
    tcf_current_zeros: u32,
    tcf_most_zeros: u32,

    // Document flow
    pub(crate) next_tx_step: u8,
    pub(crate) next_rx_step: u8,
    pub(crate) retransmit_page: bool,
    pub(crate) tx_page_count: u16,
    pub(crate) rx_page_count: u16,

    // ECM flow
    pub(crate) ecm: EcmBuffer,
    pub(crate) ecm_page: u8,
    pub(crate) ecm_block: u8,
    pub(crate) ecm_frames_this_burst: usize,
    pub(crate) ppr_count: u8,
    pub(crate) last_ppr_map: [u8; ECM_FRAME_MAP_LEN],
    pub(crate) pending_pps: Option<PendingPps>,
    pub(crate) receiver_not_ready_count: u8,

    // Far-end identity
    pub(crate) far_ident: Ident,
    pub(crate) far_sub_address: Ident,
    pub(crate) far_password: Ident,
    pub(crate) far_sep_address: Ident,
    pub(crate) far_nsf: Nsf,
}

impl<E: Environment> T30Session<E> {
    /// Create a new session over the given environment.
    ///
    /// This is a const function suitable for static initialization. The
    /// session starts idle; call [`restart`](Self::restart) to begin the
    /// call.
    pub const fn new(config: T30Config, env: E) -> Self {
        Self {
            env,
            config,
            status: Status::Ok,
            phase: Phase::Idle,
            next_phase: None,
            state: State::Answering,
            phase_e_reported: false,
            timers: Timers::new(),
            t2_context: T2Context::Command,
            retries: 0,
            dis_received: false,
            far_end_detected: false,
            rx_signal_present: false,
            rx_trained: false,
            local_dis: DisDtcFrame::new(fcf::DIS),
            remote_dis: DisDtcFrame::new(fcf::DIS),
            remote_dis_valid: false,
            dcs: DisDtcFrame::new(fcf::DCS),
            permitted_modems: ModemSupport::empty(),
            current_fallback: 0,
            short_train: false,
            use_ecm: false,
            octets_per_ecm_frame: MAX_ECM_FRAME_OCTETS,
            x_resolution: resolution::X_R8,
            y_resolution: resolution::Y_STANDARD,
            image_width: 1728,
            selected_compression: Compressions::T4_1D,
            tcf_test_bits: 0,
            tcf_current_zeros: 0,
            tcf_most_zeros: 0,
            next_tx_step: fcf::EOP,
            next_rx_step: fcf::NULL,
            retransmit_page: false,
            tx_page_count: 0,
            rx_page_count: 0,
            ecm: EcmBuffer::new(),
            ecm_page: 0,
            ecm_block: 0,
            ecm_frames_this_burst: 0,
            ppr_count: 0,
            last_ppr_map: [0; ECM_FRAME_MAP_LEN],
            pending_pps: None,
            receiver_not_ready_count: 0,
            far_ident: Ident::EMPTY,
            far_sub_address: Ident::EMPTY,
            far_password: Ident::EMPTY,
            far_sep_address: Ident::EMPTY,
            far_nsf: Nsf::EMPTY,
        }
    }

    // =========================================================================
    // State Accessors
    // =========================================================================

    /// The current session status.
    #[inline(always)]
    pub fn status(&self) -> Status {
        self.status
    }

    /// The current call phase.
    #[inline(always)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The current flow-chart state.
    #[inline(always)]
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether a call is currently in progress.
    #[must_use]
    pub fn call_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle | Phase::CallFinished)
    }

    /// The far end's station identifier, as received.
    pub fn far_ident(&self) -> &Ident {
        &self.far_ident
    }

    /// The far end's subaddress, as received.
    pub fn far_sub_address(&self) -> &Ident {
        &self.far_sub_address
    }

    /// The far end's password, as received.
    pub fn far_password(&self) -> &Ident {
        &self.far_password
    }

    /// The far end's selective polling address, as received.
    pub fn far_sep_address(&self) -> &Ident {
        &self.far_sep_address
    }

    /// Whether the receive fast modem reported successful training.
    pub fn rx_trained(&self) -> bool {
        self.rx_trained
    }

    /// The far end's non-standard facilities payload, as received.
    pub fn far_nsf(&self) -> &Nsf {
        &self.far_nsf
    }

    /// Pages confirmed in the transmit direction this call.
    pub fn tx_page_count(&self) -> u16 {
        self.tx_page_count
    }

    /// Pages confirmed in the receive direction this call.
    pub fn rx_page_count(&self) -> u16 {
        self.rx_page_count
    }

    /// The environment the session drives.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Mutable access to the environment between entry-point calls.
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// The parameters negotiated for the transfer in progress.
    #[must_use]
    pub fn transfer_parameters(&self) -> TransferParams {
        let entry = &FALLBACK_SEQUENCE[self.current_fallback];
        TransferParams {
            bit_rate: entry.bit_rate,
            modulation: entry.modulation,
            ecm: self.use_ecm,
            octets_per_ecm_frame: self.octets_per_ecm_frame as u16,
            image_width: self.image_width,
            x_resolution: self.x_resolution,
            y_resolution: self.y_resolution,
            compression: self.selected_compression,
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// The active configuration.
    pub fn config(&self) -> &T30Config {
        &self.config
    }

    /// Replace the configuration. Rejected while a call is active.
    pub fn set_config(&mut self, config: T30Config) -> ConfigResult<()> {
        if self.call_active() {
            return Err(ConfigError::CallInProgress);
        }
        self.config = config;
        Ok(())
    }

    /// Set the local station identifier. Rejected while a call is active.
    pub fn set_local_ident(&mut self, ident: &str) -> ConfigResult<()> {
        if self.call_active() {
            return Err(ConfigError::CallInProgress);
        }
        self.config.local_ident = Ident::new(ident)?;
        Ok(())
    }

    /// Queue or clear a transmit document. Rejected while a call is active.
    pub fn set_tx_document(&mut self, tx_document: bool) -> ConfigResult<()> {
        if self.call_active() {
            return Err(ConfigError::CallInProgress);
        }
        self.config.tx_document = tx_document;
        Ok(())
    }

    /// Set the non-standard facilities payload. Rejected while a call is
    /// active.
    pub fn set_nsf(&mut self, nsf: &[u8]) -> ConfigResult<()> {
        if self.call_active() {
            return Err(ConfigError::CallInProgress);
        }
        self.config.nsf = Nsf::new(nsf)?;
        Ok(())
    }

    // =========================================================================
    // Call Control
    // =========================================================================

    /// Reset the session and begin a call.
    ///
    /// A calling session starts in phase A sending CNG with T0 armed; an
    /// answering session starts sending CED with T1 armed.
    pub fn restart(&mut self) {
        self.status = Status::Ok;
        self.next_phase = None;
        self.phase = Phase::Idle;
        self.phase_e_reported = false;
        self.timers.cancel_all();
        self.t2_context = T2Context::Command;
        self.retries = 0;
        self.dis_received = false;
        self.far_end_detected = false;
        self.rx_signal_present = false;
        self.rx_trained = false;
        self.remote_dis_valid = false;
        self.permitted_modems = ModemSupport::empty();
        self.current_fallback = fallback::first_entry(self.config.supported_modems).unwrap_or(0);
        self.short_train = false;
        self.use_ecm = false;
        self.octets_per_ecm_frame = MAX_ECM_FRAME_OCTETS;
        self.tcf_test_bits = 0;
        self.tcf_current_zeros = 0;
        self.tcf_most_zeros = 0;
        self.next_tx_step = fcf::EOP;
        self.next_rx_step = fcf::NULL;
        self.retransmit_page = false;
        self.tx_page_count = 0;
        self.rx_page_count = 0;
        self.ecm.clear();
        self.ecm_page = 0;
        self.ecm_block = 0;
        self.ecm_frames_this_burst = 0;
        self.ppr_count = 0;
        self.last_ppr_map = [0; ECM_FRAME_MAP_LEN];
        self.pending_pps = None;
        self.receiver_not_ready_count = self.config.receiver_not_ready_count;
        self.far_ident = Ident::EMPTY;
        self.far_sub_address = Ident::EMPTY;
        self.far_password = Ident::EMPTY;
        self.far_sep_address = Ident::EMPTY;
        self.far_nsf = Nsf::EMPTY;

        self.local_dis = self.build_dis_or_dtc(fcf::DIS);

        if self.config.calling_party {
            self.set_state(State::T);
            self.timers.start_t0();
            self.set_phase(Phase::ACng);
        } else {
            self.set_state(State::Answering);
            self.timers.start_t1();
            self.set_phase(Phase::ACed);
        }
    }

    /// Cooperatively cancel the call.
    ///
    /// Forces the session into phase E / `CallFinished`. A session that
    /// was not already closing reports [`Status::CallDropped`].
    pub fn terminate(&mut self) {
        if self.state != State::CallFinished {
            if self.status.is_ok()
                && !matches!(self.state, State::B | State::C)
            {
                self.set_status(Status::CallDropped);
            }
            self.timers.cancel_all();
            self.set_state(State::CallFinished);
            self.set_phase(Phase::CallFinished);
        }
    }

    // =========================================================================
    // Timer Tick
    // =========================================================================

    /// Advance the sample clock.
    ///
    /// Call once per received/produced audio block with the block length
    /// in samples.
    pub fn timer_tick(&mut self, samples: u32) {
        let fired = self.timers.tick(samples);
        if !fired.any() {
            return;
        }
        if fired.t0 {
            self.timer_t0_expired();
        }
        if fired.t1 {
            self.timer_t1_expired();
        }
        if fired.t2 {
            self.timer_t2_expired();
        }
        if fired.t3 {
            self.timer_t3_expired();
        }
        if fired.t4 {
            self.timer_t4_expired();
        }
        if fired.t5 {
            self.timer_t5_expired();
        }
    }

    fn timer_t0_expired(&mut self) {
        t30_debug!("T0 expired in state {}", self.state.as_str());
        self.set_status(Status::T0Expired);
        self.disconnect();
    }

    fn timer_t1_expired(&mut self) {
        t30_debug!("T1 expired in state {}", self.state.as_str());
        self.set_status(Status::T1Expired);
        if self.config.calling_party {
            self.disconnect();
        } else {
            self.send_dcn();
        }
    }

    fn timer_t2_expired(&mut self) {
        t30_debug!("T2 expired in state {}", self.state.as_str());
        let status = match self.t2_context {
            T2Context::Command => Status::T2Expired,
            T2Context::Fax => Status::T2ExpiredFax,
            T2Context::PhaseD => Status::T2ExpiredPhaseD,
            T2Context::NextPage => Status::T2ExpiredNextPage,
            T2Context::ReceiveReady => Status::T2ExpiredRr,
            T2Context::Dcn => Status::T2ExpiredDcn,
        };
        self.set_status(status);
        if self.t2_context == T2Context::Dcn {
            // The far end is done with us whether the DCN arrives or not
            self.disconnect();
        } else if self.config.calling_party {
            self.send_dcn();
        } else {
            // Re-announce our capabilities and resynchronize
            self.set_phase(Phase::BTx);
            self.send_dis_or_dtc_sequence(fcf::DIS);
        }
    }

    fn timer_t3_expired(&mut self) {
        t30_debug!("T3 expired in state {}", self.state.as_str());
        self.set_status(Status::T3Expired);
        self.send_dcn();
    }

    fn timer_t4_expired(&mut self) {
        t30_debug!("T4 expired in state {}, retry {}", self.state.as_str(), self.retries);
        self.retries += 1;
        if self.retries >= MAX_MESSAGE_TRIES {
            let status = match self.state {
                State::R | State::T | State::D | State::DTcf | State::DPostTcf => Status::PhBDeadTx,
                State::II
                | State::IIQ
                | State::IV
                | State::IVPpsNull
                | State::IVPpsQ
                | State::IVPpsRnr
                | State::IVCtc
                | State::IVEor
                | State::IVEorRnr => Status::PhDDeadTx,
                _ => Status::RetryDcn,
            };
            self.set_status(status);
            self.send_dcn();
        } else {
            self.repeat_last_command();
        }
    }

    fn timer_t5_expired(&mut self) {
        t30_debug!("T5 expired in state {}", self.state.as_str());
        self.set_status(Status::T5Expired);
        self.send_dcn();
    }

    // =========================================================================
    // Phase Control
    // =========================================================================

    pub(crate) fn set_status(&mut self, status: Status) {
        if self.status != status {
            t30_debug!("status {} -> {}", self.status.as_str(), status.as_str());
            self.status = status;
        }
    }

    pub(crate) fn set_state(&mut self, state: State) {
        if self.state != state {
            t30_debug!("state {} -> {}", self.state.as_str(), state.as_str());
            self.state = state;
        }
    }

    /// Switch phase immediately, reconfiguring the modems.
    pub(crate) fn set_phase(&mut self, phase: Phase) {
        if phase == self.phase {
            return;
        }
        t30_debug!("phase {} -> {}", self.phase.as_str(), phase.as_str());
        self.phase = phase;
        self.next_phase = None;

        let entry = &FALLBACK_SEQUENCE[self.current_fallback];
        let fast = ModemType::Fast { modulation: entry.modulation, bit_rate: entry.bit_rate };

        match phase {
            Phase::Idle => {}
            Phase::ACed => {
                self.env.set_rx_type(ModemType::V21, false, true);
                self.env.set_tx_type(ModemType::Ced, false, false);
            }
            Phase::ACng => {
                self.env.set_rx_type(ModemType::V21, false, true);
                self.env.set_tx_type(ModemType::Cng, false, false);
            }
            Phase::BRx | Phase::DRx => {
                self.env.set_rx_type(ModemType::V21, false, true);
                self.env.set_tx_type(ModemType::None, false, false);
            }
            Phase::BTx | Phase::DTx => {
                self.env.set_rx_type(ModemType::None, false, false);
                // T.30 wants 75 ms of silence on the line turnaround
                self.env.set_tx_type(ModemType::Pause { ms: 75 }, false, false);
                self.env.set_tx_type(ModemType::V21, false, true);
            }
            Phase::CNonEcmRx => {
                self.rx_trained = false;
                self.start_t2(T2Context::Fax);
                self.env.set_rx_type(fast, self.short_train, false);
                self.env.set_tx_type(ModemType::None, false, false);
            }
            Phase::CNonEcmTx => {
                self.env.set_rx_type(ModemType::None, false, false);
                self.env.set_tx_type(fast, self.short_train, false);
            }
            Phase::CEcmRx => {
                self.rx_trained = false;
                self.start_t2(T2Context::Fax);
                self.env.set_rx_type(fast, self.short_train, true);
                self.env.set_tx_type(ModemType::None, false, false);
            }
            Phase::CEcmTx => {
                self.env.set_rx_type(ModemType::None, false, false);
                self.env.set_tx_type(fast, self.short_train, true);
            }
            Phase::E => {
                self.env.set_rx_type(ModemType::None, false, false);
                self.env.set_tx_type(ModemType::None, false, false);
                if !self.phase_e_reported {
                    self.phase_e_reported = true;
                    self.env.phase_e(self.status);
                }
            }
            Phase::CallFinished => {
                self.env.set_rx_type(ModemType::Done, false, false);
                self.env.set_tx_type(ModemType::Done, false, false);
                if !self.phase_e_reported {
                    self.phase_e_reported = true;
                    self.env.phase_e(self.status);
                }
            }
        }
    }

    /// Install `phase` now, or defer it until the receive signal drops.
    pub(crate) fn queue_phase(&mut self, phase: Phase) {
        if self.rx_signal_present && phase != self.phase {
            t30_debug!("phase {} queued behind carrier", phase.as_str());
            self.next_phase = Some(phase);
        } else {
            self.set_phase(phase);
        }
    }

    pub(crate) fn start_t2(&mut self, context: T2Context) {
        self.t2_context = context;
        self.timers.start_t2();
    }

    /// Tear the call down through phase E.
    pub(crate) fn disconnect(&mut self) {
        t30_debug!("disconnecting with status {}", self.status.as_str());
        self.timers.cancel_all();
        self.set_state(State::B);
        self.set_phase(Phase::E);
    }

    /// Queue a DCN and run the disconnect once it has gone out.
    pub(crate) fn send_dcn(&mut self) {
        self.timers.cancel_all();
        self.set_state(State::C);
        self.set_phase(Phase::DTx);
        self.send_simple_frame(fcf::DCN);
    }

    // =========================================================================
    // Frame Emission Primitives
    // =========================================================================

    /// The DIS-received marker OR-ed into outgoing final frames.
    #[inline(always)]
    pub(crate) fn dis_bit(&self) -> u8 {
        u8::from(self.dis_received)
    }

    pub(crate) fn send_frame(&mut self, frame: &[u8]) {
        t30_debug!("tx frame {} len {}", fcf_name(frame[2]), frame.len() as u32);
        self.env.send_hdlc(Some(frame));
    }

    /// Close the current frame burst.
    pub(crate) fn end_burst(&mut self) {
        self.env.send_hdlc(None);
    }

    /// Send a three-octet final frame, with the burst terminator.
    pub(crate) fn send_simple_frame(&mut self, frame_fcf: u8) {
        let frame = [ADDRESS_FIELD, CONTROL_FIELD_FINAL, frame_fcf | self.dis_bit()];
        self.send_frame(&frame);
        self.end_burst();
    }

    /// Send a 20-character identifier frame (non-final).
    pub(crate) fn send_ident_frame(&mut self, frame_fcf: u8, ident: Ident) {
        if ident.is_empty() {
            return;
        }
        let mut frame = [0u8; IDENT_FRAME_LEN];
        encode_ident_frame(&mut frame, frame_fcf, ident.as_bytes());
        self.send_frame(&frame);
    }

    /// Send the NSF blob (non-final), if configured.
    fn send_nsf_frame(&mut self, frame_fcf: u8) {
        if self.config.nsf.is_empty() {
            return;
        }
        let mut frame = [0u8; 3 + crate::frames::MAX_NSF_LEN];
        frame[0] = ADDRESS_FIELD;
        frame[1] = CONTROL_FIELD_NON_FINAL;
        frame[2] = frame_fcf;
        let n = self.config.nsf.as_bytes().len();
        frame[3..3 + n].copy_from_slice(self.config.nsf.as_bytes());
        self.send_frame(&frame[..3 + n]);
    }

    /// Announce capabilities: NSF/NSC, CSI/CIG, then DIS/DTC (final).
    pub(crate) fn send_dis_or_dtc_sequence(&mut self, frame_fcf: u8) {
        self.set_state(State::R);
        self.local_dis = self.build_dis_or_dtc(frame_fcf);
        self.local_dis.prune();

        if frame_fcf == fcf::DTC {
            self.send_nsf_frame(fcf::NSC);
            self.send_ident_frame(fcf::CIG, self.config.local_ident);
            self.send_ident_frame(fcf::SEP, self.config.sep_address);
        } else {
            self.send_nsf_frame(fcf::NSF);
            self.send_ident_frame(fcf::CSI, self.config.local_ident);
        }
        let octets_len = self.local_dis.as_octets().len();
        let mut wire = [0u8; capability::MAX_FRAME_LEN];
        wire[..octets_len].copy_from_slice(self.local_dis.as_octets());
        self.send_frame(&wire[..octets_len]);
        self.end_burst();
    }

    /// Send TSI/PWD/SUB then DCS (final).
    pub(crate) fn send_dcs_sequence(&mut self) {
        self.set_state(State::D);
        self.set_phase(Phase::BTx);

        self.send_ident_frame(fcf::TSI, self.config.local_ident);
        if self.remote_dis.bit(capability::bit::PASSWORD) {
            self.send_ident_frame(fcf::PWD, self.config.password);
        }
        if self.remote_dis.bit(capability::bit::SUBADDRESSING) {
            self.send_ident_frame(fcf::SUB, self.config.sub_address);
        }
        self.dcs.prune();
        let octets_len = self.dcs.as_octets().len();
        let mut wire = [0u8; capability::MAX_FRAME_LEN];
        wire[..octets_len].copy_from_slice(self.dcs.as_octets());
        self.send_frame(&wire[..octets_len]);
        self.end_burst();
    }

    /// Send a PPS frame carrying the pending post-page command.
    pub(crate) fn send_pps_frame(&mut self) {
        let fcf2 = if self.ecm.at_page_end { self.next_tx_step } else { fcf::NULL };
        let frame = [
            ADDRESS_FIELD,
            CONTROL_FIELD_FINAL,
            fcf::PPS | self.dis_bit(),
            fcf2,
            self.ecm_page,
            self.ecm_block,
            (self.ecm_frames_this_burst.wrapping_sub(1) & 0xFF) as u8,
        ];
        self.send_frame(&frame);
        self.end_burst();
        self.set_state(if fcf2 == fcf::NULL { State::IVPpsNull } else { State::IVPpsQ });
    }

    /// Send a PPR carrying the 32-octet missing-frame bitmap.
    pub(crate) fn send_ppr_frame(&mut self) {
        let mut frame = [0u8; 3 + ECM_FRAME_MAP_LEN];
        frame[0] = ADDRESS_FIELD;
        frame[1] = CONTROL_FIELD_FINAL;
        frame[2] = fcf::PPR | self.dis_bit();
        frame[3..].copy_from_slice(&self.last_ppr_map);
        self.send_frame(&frame);
        self.end_burst();
        self.set_state(State::FPostRcpPpr);
    }

    /// Send a CTC carrying the stepped-down DCS rate code.
    pub(crate) fn send_ctc_frame(&mut self) {
        let code = FALLBACK_SEQUENCE[self.current_fallback].dcs_code;
        let frame = [ADDRESS_FIELD, CONTROL_FIELD_FINAL, fcf::CTC | self.dis_bit(), 0x00, code];
        self.send_frame(&frame);
        self.end_burst();
        self.set_state(State::IVCtc);
    }

    /// Send an EOR carrying the abandoned post-page command.
    pub(crate) fn send_eor_frame(&mut self) {
        let fcf2 = if self.ecm.at_page_end { self.next_tx_step } else { fcf::NULL };
        let frame = [ADDRESS_FIELD, CONTROL_FIELD_FINAL, fcf::EOR | self.dis_bit(), fcf2];
        self.send_frame(&frame);
        self.end_burst();
        self.set_state(State::IVEor);
    }

    // =========================================================================
    // Capability Frame Construction
    // =========================================================================

    /// Build our DIS (or DTC) from the configured capabilities.
    pub(crate) fn build_dis_or_dtc(&self, frame_fcf: u8) -> DisDtcFrame {
        use capability::bit;
        use crate::session::config::{ImageSizes, Resolutions};

        let cfg = &self.config;
        let mut frame = DisDtcFrame::new(frame_fcf);

        if cfg.t37_capable {
            frame.set_bit(bit::T37);
        }
        if cfg.t38_capable {
            frame.set_bit(bit::T38);
        }
        if cfg.tx_document {
            frame.set_bit(bit::READY_TO_TRANSMIT);
        }
        if cfg.rx_allowed {
            frame.set_bit(bit::RECEIVE_FAX);
            frame.set_bit(bit::PASSWORD);
        }
        frame.set_rate_code(capability::encode_rate_capabilities(cfg.supported_modems));
        if cfg.supported_resolutions.contains(Resolutions::FINE) {
            frame.set_bit(bit::FINE);
        }
        if cfg.supported_compressions.contains(Compressions::T4_2D) {
            frame.set_bit(bit::TWO_D_CODING);
        }
        if cfg.supported_image_sizes.contains(ImageSizes::WIDTH_255) {
            frame.set_bit(bit::WIDTH_255);
        }
        if cfg.supported_image_sizes.contains(ImageSizes::WIDTH_303) {
            frame.set_bit(bit::WIDTH_255);
            frame.set_bit(bit::WIDTH_303);
        }
        if cfg.supported_image_sizes.contains(ImageSizes::LENGTH_B4) {
            frame.set_bit(bit::LENGTH_B4);
        }
        if cfg.supported_image_sizes.contains(ImageSizes::LENGTH_UNLIMITED) {
            frame.set_bit(bit::LENGTH_UNLIMITED);
        }
        frame.set_min_scan_code(cfg.rx_min_scan_time_code);
        if cfg.ecm_allowed {
            frame.set_bit(bit::ECM);
            if cfg.supported_compressions.contains(Compressions::T6) {
                frame.set_bit(bit::T6_CODING);
            }
        }
        if cfg.supported_resolutions.contains(Resolutions::SUPERFINE) {
            frame.set_bit(bit::SUPERFINE);
        }
        if cfg.supported_resolutions.contains(Resolutions::R300) {
            frame.set_bit(bit::RES_300);
        }
        if cfg.supported_resolutions.contains(Resolutions::R400) {
            frame.set_bit(bit::RES_400);
        }
        frame.set_bit(bit::INCH_PREFERRED);
        frame.set_bit(bit::METRIC_PREFERRED);
        frame.set_bit(bit::MIN_SCAN_HALVING);
        if cfg.tx_document && !cfg.sep_address.is_empty() {
            frame.set_bit(bit::SELECTIVE_POLLING);
        }
        frame.set_bit(bit::SUBADDRESSING);
        if cfg.supported_image_sizes.contains(ImageSizes::LETTER) {
            frame.set_bit(bit::LETTER);
        }
        if cfg.supported_image_sizes.contains(ImageSizes::LEGAL) {
            frame.set_bit(bit::LEGAL);
        }
        if cfg.supported_resolutions.contains(Resolutions::R600) {
            frame.set_bit(bit::RES_600);
        }
        if cfg.supported_resolutions.contains(Resolutions::R1200) {
            frame.set_bit(bit::RES_1200);
        }
        if cfg.iaf.contains(IafMode::FLOW_CONTROL) {
            frame.set_bit(bit::T38_FLOW_CONTROL);
        }
        if cfg.iaf.contains(IafMode::CONTINUOUS_FLOW) {
            frame.set_bit(bit::T38_CONTINUOUS_FLOW);
        }
        frame.prune();
        frame
    }

    /// Build the DCS for the current page against the remote DIS.
    ///
    /// Fails when the page geometry cannot be negotiated.
    pub(crate) fn build_dcs(&mut self, entry: &ResolutionEntry) -> Result<(), Status> {
        use capability::bit;

        let mut dcs = DisDtcFrame::new(fcf::DCS | self.dis_bit());
        dcs.set_bit(bit::RECEIVE_FAX);
        dcs.set_rate_code(FALLBACK_SEQUENCE[self.current_fallback].dcs_code);

        // Resolution
        if let Some(needed) = entry.dis_bit {
            if !self.remote_dis.bit(needed) {
                return Err(Status::ResolutionNotSupported);
            }
        }
        for &b in entry.dcs_bits {
            dcs.set_bit(b);
        }
        self.x_resolution = entry.x;
        self.y_resolution = entry.y;

        // Width
        let width = self.image_width;
        let Some(code) = resolution::width_code(entry.x_class, width) else {
            return Err(Status::SizeNotSupported);
        };
        match code {
            1 => {
                if !self.remote_dis.bit(bit::WIDTH_255) {
                    return Err(Status::SizeNotSupported);
                }
                dcs.set_bit(bit::WIDTH_255);
            }
            2 => {
                if !self.remote_dis.bit(bit::WIDTH_303) {
                    return Err(Status::SizeNotSupported);
                }
                dcs.set_bit(bit::WIDTH_303);
            }
            _ => {}
        }

        // Recording length: ask for the most the far end and we both allow
        if self.remote_dis.bit(bit::LENGTH_UNLIMITED) {
            dcs.set_bit(bit::LENGTH_UNLIMITED);
        } else if self.remote_dis.bit(bit::LENGTH_B4) {
            dcs.set_bit(bit::LENGTH_B4);
        }

        // Compression
        self.selected_compression = if self.use_ecm
            && self.config.supported_compressions.contains(Compressions::T6)
            && self.remote_dis.bit(bit::T6_CODING)
        {
            dcs.set_bit(bit::T6_CODING);
            Compressions::T6
        } else if self.config.supported_compressions.contains(Compressions::T4_2D)
            && self.remote_dis.bit(bit::TWO_D_CODING)
        {
            dcs.set_bit(bit::TWO_D_CODING);
            Compressions::T4_2D
        } else {
            Compressions::T4_1D
        };

        // Minimum scan time; ECM transfers always run at 0 ms
        let min_scan = if self.use_ecm {
            resolution::MIN_SCAN_0MS
        } else {
            resolution::translate_min_scan_time(self.remote_dis.min_scan_code(), entry.vres_class)
        };
        dcs.set_min_scan_code(min_scan);

        if self.use_ecm {
            dcs.set_bit(bit::ECM);
            if self.octets_per_ecm_frame == 64 {
                dcs.set_bit(bit::FRAME_SIZE_64);
            }
        }

        dcs.prune();
        self.dcs = dcs;
        Ok(())
    }

    // =========================================================================
    // Non-ECM Bit Stream (put direction, from the receive modem)
    // =========================================================================

    /// Deliver one bit (or a signal sentinel) from the non-ECM receive
    /// modem.
    pub fn non_ecm_put_bit(&mut self, bit: i32) {
        if bit < 0 {
            self.non_ecm_signal(bit);
            return;
        }
        match self.state {
            State::FTcf => self.tcf_count_bit(bit as u8 & 1),
            State::FDocNonEcm => self.doc_rx_bit(bit as u8 & 1),
            _ => {}
        }
    }

    /// Deliver one byte from the non-ECM receive modem.
    pub fn non_ecm_put_byte(&mut self, byte: i32) {
        if byte < 0 {
            self.non_ecm_signal(byte);
            return;
        }
        for shift in (0..8).rev() {
            self.non_ecm_put_bit(((byte >> shift) & 1) as i32);
        }
    }

    /// Deliver a chunk of bytes from the non-ECM receive modem.
    pub fn non_ecm_put_chunk(&mut self, data: &[u8]) {
        for &byte in data {
            self.non_ecm_put_byte(i32::from(byte));
        }
    }

    fn non_ecm_signal(&mut self, signal: i32) {
        match signal {
            SIG_STATUS_TRAINING_FAILED => {
                t30_debug!("non-ECM carrier training failed");
                self.rx_trained = false;
            }
            SIG_STATUS_TRAINING_SUCCEEDED => {
                t30_debug!("non-ECM carrier trained");
                self.rx_trained = true;
                self.timers.stop_t2();
            }
            SIG_STATUS_CARRIER_UP => {
                self.rx_signal_present = true;
            }
            SIG_STATUS_CARRIER_DOWN | SIG_STATUS_END_OF_DATA => {
                self.rx_signal_present = false;
                self.non_ecm_rx_done();
                if let Some(phase) = self.next_phase.take() {
                    self.set_phase(phase);
                }
            }
            _ => {
                t30_debug!("unknown non-ECM signal {}", signal);
            }
        }
    }

    /// The non-ECM receive carrier has ended; act on what we collected.
    fn non_ecm_rx_done(&mut self) {
        match self.state {
            State::FTcf => self.tcf_judge(),
            State::FDocNonEcm => self.non_ecm_page_received(),
            _ => {}
        }
    }

    fn tcf_count_bit(&mut self, bit: u8) {
        if bit == 0 {
            self.tcf_current_zeros += 1;
            if self.tcf_current_zeros > self.tcf_most_zeros {
                self.tcf_most_zeros = self.tcf_current_zeros;
            }
        } else {
            self.tcf_current_zeros = 0;
        }
    }

    /// Compare the longest zero run against the candidate bit rate: one
    /// second's worth of clean zeros trains us.
    fn tcf_judge(&mut self) {
        let bit_rate = u32::from(FALLBACK_SEQUENCE[self.current_fallback].bit_rate);
        t30_debug!("TCF: longest zero run {} at {} bps", self.tcf_most_zeros, bit_rate);
        self.timers.stop_t2_t4();
        if self.tcf_most_zeros >= bit_rate {
            self.set_phase(Phase::DTx);
            self.set_state(State::FCfr);
            self.send_simple_frame(fcf::CFR);
        } else {
            self.set_phase(Phase::DTx);
            self.set_state(State::FFtt);
            self.send_simple_frame(fcf::FTT);
        }
        self.tcf_current_zeros = 0;
        self.tcf_most_zeros = 0;
    }

    fn doc_rx_bit(&mut self, bit: u8) {
        if self.env.rx_bit(bit) {
            // End-of-page mark decoded; the post-page command follows on V.21
            self.non_ecm_page_received();
        }
    }

    fn non_ecm_page_received(&mut self) {
        if self.state == State::FDocNonEcm {
            self.set_state(State::FPostDocNonEcm);
            self.queue_phase(Phase::DRx);
            self.start_t2(T2Context::NextPage);
        }
    }

    // =========================================================================
    // Non-ECM Bit Stream (get direction, to the transmit modem)
    // =========================================================================

    /// Produce the next bit for the non-ECM transmit modem.
    ///
    /// During D-TCF this is the zero-bit training check; during state I it
    /// taps the document encoder. Returns
    /// [`SIG_STATUS_END_OF_DATA`] when the current step is finished.
    pub fn non_ecm_get_bit(&mut self) -> i32 {
        match self.state {
            State::DTcf => {
                if self.tcf_test_bits > 0 {
                    self.tcf_test_bits -= 1;
                    0
                } else {
                    SIG_STATUS_END_OF_DATA
                }
            }
            State::I => match self.env.tx_bit() {
                Some(bit) => i32::from(bit & 1),
                None => SIG_STATUS_END_OF_DATA,
            },
            _ => SIG_STATUS_END_OF_DATA,
        }
    }

    /// Produce the next byte for the non-ECM transmit modem, or `0x100`
    /// at the end of the data.
    pub fn non_ecm_get_byte(&mut self) -> i32 {
        let mut byte = 0i32;
        for _ in 0..8 {
            let bit = self.non_ecm_get_bit();
            if bit == SIG_STATUS_END_OF_DATA {
                return T30_END_OF_DATA_BYTE;
            }
            byte = (byte << 1) | bit;
        }
        byte
    }

    /// Fill `buf` with transmit data; returns the number of bytes
    /// produced. Short counts mark the end of the data.
    pub fn non_ecm_get_chunk(&mut self, buf: &mut [u8]) -> usize {
        for (i, slot) in buf.iter_mut().enumerate() {
            let byte = self.non_ecm_get_byte();
            if byte == T30_END_OF_DATA_BYTE {
                return i;
            }
            *slot = byte as u8;
        }
        buf.len()
    }

    /// Arm the TCF generator for the current rate.
    pub(crate) fn arm_tcf(&mut self) {
        let bit_rate = u32::from(FALLBACK_SEQUENCE[self.current_fallback].bit_rate);
        self.tcf_test_bits = (TCF_DURATION_MS * bit_rate / 1000) as i32;
    }

    /// Reset the receive-side TCF zero-run counters.
    pub(crate) fn reset_tcf_counters(&mut self) {
        self.tcf_current_zeros = 0;
        self.tcf_most_zeros = 0;
    }

    // =========================================================================
    // ECM Transmit Path
    // =========================================================================

    /// Fill the partial-page buffer with the next block of encoder output.
    pub(crate) fn get_partial_ecm_page(&mut self) {
        self.ecm.clear();
        self.ppr_count = 0;
        let frame_octets = self.octets_per_ecm_frame;
        let mut chunk = [0u8; MAX_ECM_FRAME_OCTETS];

        for i in 0..crate::session::ecm::MAX_ECM_FRAMES {
            let n = self.env.tx_chunk(&mut chunk[..frame_octets]);
            if n > 0 {
                self.ecm.fill(i, n).copy_from_slice(&chunk[..n]);
            }
            if n < frame_octets {
                self.ecm.at_page_end = true;
                self.ecm.frames = if n > 0 { i + 1 } else { i };
                self.next_tx_step = match self.env.tx_more_pages() {
                    NextTxPage::SameFormat => fcf::MPS,
                    NextTxPage::DifferentFormat => fcf::EOM,
                    NextTxPage::None => fcf::EOP,
                };
                t30_debug!("ECM page end after {} frames", self.ecm.frames as u32);
                return;
            }
        }
        self.ecm.frames = crate::session::ecm::MAX_ECM_FRAMES;
        self.ecm.at_page_end = false;
    }

    /// Send every pending FCD frame, then the RCP triple.
    pub(crate) fn send_ecm_burst(&mut self) {
        let mut scratch = [0u8; 4 + MAX_ECM_FRAME_OCTETS];
        self.ecm_frames_this_burst = 0;

        for i in 0..self.ecm.frames {
            let len = {
                let Some(payload) = self.ecm.payload(i) else { continue };
                scratch[0] = ADDRESS_FIELD;
                scratch[1] = CONTROL_FIELD_NON_FINAL;
                scratch[2] = fcf::FCD;
                scratch[3] = i as u8;
                scratch[4..4 + payload.len()].copy_from_slice(payload);
                4 + payload.len()
            };
            self.env.send_hdlc(Some(&scratch[..len]));
            self.ecm_frames_this_burst += 1;
        }
        let rcp = [ADDRESS_FIELD, CONTROL_FIELD_NON_FINAL, fcf::RCP];
        for _ in 0..3 {
            self.env.send_hdlc(Some(&rcp));
        }
        self.end_burst();
        t30_debug!("ECM burst: {} FCD frames", self.ecm_frames_this_burst as u32);
    }

    // =========================================================================
    // Front-End Status
    // =========================================================================

    /// Deliver a front-end status report.
    pub fn front_end_status(&mut self, event: FrontEndEvent) {
        match event {
            FrontEndEvent::SendStepComplete => self.send_step_complete(),
            FrontEndEvent::ReceiveComplete => {
                self.rx_signal_present = false;
                self.non_ecm_rx_done();
                if let Some(phase) = self.next_phase.take() {
                    self.set_phase(phase);
                }
            }
            FrontEndEvent::SignalPresent => {
                self.rx_signal_present = true;
            }
            FrontEndEvent::SignalAbsent => {
                self.rx_signal_present = false;
                if let Some(phase) = self.next_phase.take() {
                    self.set_phase(phase);
                }
            }
        }
    }

    /// The front end finished the last transmit step; advance the flow.
    fn send_step_complete(&mut self) {
        match self.state {
            State::Answering => {
                // CED has been sent; announce our capabilities
                self.set_phase(Phase::BTx);
                self.send_dis_or_dtc_sequence(fcf::DIS);
            }
            State::R => {
                // DIS/DTC burst is out; listen for the command
                self.set_phase(Phase::BRx);
                self.timers.start_t4();
            }
            State::D => {
                // DCS burst is out
                if self.config.iaf.contains(IafMode::NO_TCF) {
                    self.start_page_transmission();
                } else {
                    self.arm_tcf();
                    self.set_state(State::DTcf);
                    self.set_phase(Phase::CNonEcmTx);
                }
            }
            State::DTcf => {
                // TCF is out; await the verdict
                self.set_state(State::DPostTcf);
                self.set_phase(Phase::BRx);
                self.timers.start_t4();
            }
            State::I => {
                // Page data sent; issue the post-page command. The page is
                // not closed until the far end confirms it.
                self.next_tx_step = match self.env.tx_more_pages() {
                    NextTxPage::SameFormat => fcf::MPS,
                    NextTxPage::DifferentFormat => fcf::EOM,
                    NextTxPage::None => fcf::EOP,
                };
                self.set_state(State::II);
                self.set_phase(Phase::DTx);
                self.send_simple_frame(self.next_tx_step);
            }
            State::II => {
                self.set_state(State::IIQ);
                self.set_phase(Phase::BRx);
                self.timers.start_t4();
            }
            State::IV => {
                // FCD burst is out; follow with the PPS
                self.set_phase(Phase::DTx);
                self.send_pps_frame();
            }
            State::IVPpsNull | State::IVPpsQ | State::IVPpsRnr | State::IVCtc | State::IVEor
            | State::IVEorRnr => {
                self.set_phase(Phase::BRx);
                self.timers.start_t4();
            }
            State::FCfr => {
                // CFR is out; turn the line around for the document
                self.begin_document_reception();
            }
            State::FFtt => {
                // FTT is out; wait for the next DCS
                self.set_phase(Phase::BRx);
                self.start_t2(T2Context::Command);
            }
            State::IIIQMcf | State::IIIQRtp | State::IIIQRtn => {
                self.post_page_response_sent();
            }
            State::FPostRcpMcf => {
                self.post_rcp_mcf_sent();
            }
            State::FPostRcpPpr => {
                // Retransmission of the missing frames follows
                self.set_state(State::FDocEcm);
                self.queue_phase(Phase::CEcmRx);
            }
            State::FPostRcpRnr => {
                // The far end will poll us with RR
                self.set_phase(Phase::DRx);
                self.start_t2(T2Context::ReceiveReady);
            }
            State::C => {
                // DCN has gone out; the call is over
                self.disconnect();
            }
            _ => {}
        }
    }

    /// The receiver's post-page response went out; set up for what the
    /// command promised.
    fn post_page_response_sent(&mut self) {
        match self.next_rx_step {
            fcf::MPS | fcf::PRI_MPS => {
                if self.state == State::IIIQMcf {
                    if let Err(status) = self.env.rx_start_page() {
                        self.set_status(status);
                        self.send_dcn();
                        return;
                    }
                    self.set_state(State::FDocNonEcm);
                    self.queue_phase(Phase::CNonEcmRx);
                } else {
                    // RTP/RTN: the far end renegotiates first
                    self.set_phase(Phase::BRx);
                    self.start_t2(T2Context::Command);
                }
            }
            fcf::EOM | fcf::PRI_EOM => {
                // Back to the start of phase B
                self.set_phase(Phase::BTx);
                self.send_dis_or_dtc_sequence(fcf::DIS);
            }
            _ => {
                // EOP: all that remains is the DCN
                self.set_phase(Phase::DRx);
                self.start_t2(T2Context::Dcn);
            }
        }
    }

    fn post_rcp_mcf_sent(&mut self) {
        match self.next_rx_step {
            fcf::NULL => {
                self.set_state(State::FDocEcm);
                self.queue_phase(Phase::CEcmRx);
            }
            fcf::MPS | fcf::PRI_MPS => {
                if let Err(status) = self.env.rx_start_page() {
                    self.set_status(status);
                    self.send_dcn();
                    return;
                }
                self.set_state(State::FDocEcm);
                self.queue_phase(Phase::CEcmRx);
            }
            fcf::EOM | fcf::PRI_EOM => {
                self.set_phase(Phase::BTx);
                self.send_dis_or_dtc_sequence(fcf::DIS);
            }
            _ => {
                // EOP: wait for the DCN
                self.set_phase(Phase::DRx);
                self.start_t2(T2Context::Dcn);
            }
        }
    }

    /// Open the page and switch to the image phase on the transmit side.
    pub(crate) fn start_page_transmission(&mut self) {
        let opened = if self.retransmit_page {
            self.env.tx_restart_page()
        } else {
            self.env.tx_start_page()
        };
        self.retransmit_page = false;
        if let Err(status) = opened {
            self.set_status(status);
            self.send_dcn();
            return;
        }

        if self.use_ecm {
            self.ecm_block = 0;
            self.get_partial_ecm_page();
            self.set_state(State::IV);
            self.queue_phase(Phase::CEcmTx);
            self.send_ecm_burst();
        } else {
            self.set_state(State::I);
            self.queue_phase(Phase::CNonEcmTx);
        }
    }

    /// Turn the line around after CFR and set up document reception.
    fn begin_document_reception(&mut self) {
        if let Err(status) = self.env.rx_start_page() {
            self.set_status(status);
            self.send_dcn();
            return;
        }
        if self.use_ecm {
            self.ecm.clear();
            self.set_state(State::FDocEcm);
            self.queue_phase(Phase::CEcmRx);
        } else {
            self.set_state(State::FDocNonEcm);
            self.queue_phase(Phase::CNonEcmRx);
        }
    }

    // =========================================================================
    // HDLC Input
    // =========================================================================

    /// Deliver an event from the V.21 HDLC receiver.
    pub fn hdlc_accept(&mut self, event: HdlcEvent<'_>) {
        match event {
            HdlcEvent::Flags => {
                // Preamble: the far end is talking to us
                if !self.far_end_detected {
                    self.far_end_detected = true;
                    if self.timers.t0_t1_running() {
                        self.timers.t0_to_t1();
                    }
                    if matches!(self.phase, Phase::ACed | Phase::ACng) {
                        self.set_phase(Phase::BRx);
                    }
                }
                self.timers.stop_t2();
            }
            HdlcEvent::CarrierUp => {
                self.rx_signal_present = true;
            }
            HdlcEvent::CarrierDown => {
                self.rx_signal_present = false;
                if let Some(phase) = self.next_phase.take() {
                    self.set_phase(phase);
                }
            }
            HdlcEvent::Frame { data, crc_ok } => {
                if !crc_ok {
                    t30_debug!("bad frame checksum, len {}", data.len() as u32);
                    if self.config.crp_enabled && data.len() >= 3 {
                        self.send_simple_frame(fcf::CRP);
                    }
                    return;
                }
                self.frame_received(data);
            }
        }
    }

    fn frame_received(&mut self, data: &[u8]) {
        if data.len() < 3 {
            t30_debug!("short frame, len {}", data.len() as u32);
            return;
        }
        if data[0] != ADDRESS_FIELD {
            t30_debug!("bad address octet {}", data[0]);
            return;
        }
        // Any well-formed frame proves the far end is alive
        self.far_end_detected = true;
        self.timers.stop_t0_t1();

        let final_frame = data[1] & 0x10 != 0;
        t30_debug!(
            "rx frame {} len {} final {}",
            fcf_name(data[2]),
            data.len() as u32,
            final_frame as u32
        );
        if final_frame {
            self.process_rx_final_frame(data);
        } else {
            self.process_rx_non_final_frame(data);
        }
    }
}
