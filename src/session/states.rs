//! Flow-Chart Frame Dispatch
//!
//! One handler per flow-chart state consumes each received final frame;
//! non-final frames deliver auxiliary payloads (identities, passwords,
//! ECM image data) and are processed on their own path. Frames that
//! arrive out of context are logged and dropped; they never crash the
//! machine.

use crate::capability::{self, DisDtcFrame};
use crate::env::Environment;
use crate::fallback::{self, FALLBACK_SEQUENCE};
use crate::frames::{FCF_MASK, MAX_IDENT_LEN, decode_ident_field, fcf, fcf_name};
use crate::session::config::{Ident, Nsf};
use crate::session::ecm::MAX_ECM_FRAME_OCTETS;
use crate::session::error::Status;
use crate::session::phase::{Phase, State, T2Context};
use crate::session::t30::{PendingPps, T30Session, MAX_MESSAGE_TRIES, PPR_LIMIT_BEFORE_CTC_OR_EOR};
use crate::t30_debug;

impl<E: Environment> T30Session<E> {
    // =========================================================================
    // Non-Final Frames
    // =========================================================================

    pub(crate) fn process_rx_non_final_frame(&mut self, data: &[u8]) {
        let mut ident = [0u8; MAX_IDENT_LEN];
        match data[2] {
            fcf::CSI | fcf::CIG | fcf::TSI => {
                let n = decode_ident_field(&data[3..], &mut ident);
                self.far_ident = Ident::from_wire(&ident[..n]);
            }
            fcf::SID => {
                let n = decode_ident_field(&data[3..], &mut ident);
                self.far_password = Ident::from_wire(&ident[..n]);
            }
            fcf::NSF | fcf::NSC | fcf::NSS => {
                self.far_nsf = Nsf::from_wire(&data[3..]);
                if data.len() >= 4 {
                    t30_debug!("NSF: T.35 country code {}", data[3]);
                }
            }
            fcf::SUB => {
                let n = decode_ident_field(&data[3..], &mut ident);
                self.far_sub_address = Ident::from_wire(&ident[..n]);
            }
            fcf::PWD => {
                let n = decode_ident_field(&data[3..], &mut ident);
                self.far_password = Ident::from_wire(&ident[..n]);
            }
            fcf::SEP => {
                let n = decode_ident_field(&data[3..], &mut ident);
                self.far_sep_address = Ident::from_wire(&ident[..n]);
            }
            fcf::PSA => {
                let n = decode_ident_field(&data[3..], &mut ident);
                self.far_sep_address = Ident::from_wire(&ident[..n]);
            }
            fcf::FCD => self.process_rx_fcd(data),
            fcf::RCP => self.process_rx_rcp(),
            other => {
                // CSA/CIA/TSA/ISP/IRA and anything newer: note and move on
                t30_debug!("unhandled non-final frame {} ({})", fcf_name(other), other);
            }
        }
    }

    fn process_rx_fcd(&mut self, data: &[u8]) {
        if !matches!(self.state, State::FDocEcm | State::FPostRcpPpr) {
            t30_debug!("FCD outside ECM reception, state {}", self.state.as_str());
            return;
        }
        if data.len() < 5 || data.len() > 4 + MAX_ECM_FRAME_OCTETS {
            t30_debug!("FCD with unexpected length {}", data.len() as u32);
            return;
        }
        self.timers.stop_t2();
        let seq = data[3];
        self.ecm.store(seq, &data[4..]);
    }

    fn process_rx_rcp(&mut self) {
        if self.state == State::FDocEcm {
            // The burst is over; the PPS follows on V.21
            self.set_state(State::FPostDocEcm);
            self.queue_phase(Phase::DRx);
            self.start_t2(T2Context::PhaseD);
        }
    }

    // =========================================================================
    // Final-Frame Dispatch
    // =========================================================================

    pub(crate) fn process_rx_final_frame(&mut self, data: &[u8]) {
        let code = data[2] & FCF_MASK;
        match self.state {
            State::Answering => self.process_state_answering(code, data),
            State::B => self.process_unexpected_frame(code),
            State::C => self.process_unexpected_frame(code),
            State::D | State::DTcf => self.process_unexpected_frame(code),
            State::DPostTcf => self.process_state_d_post_tcf(code, data),
            State::FTcf => self.process_unexpected_frame(code),
            State::FCfr => self.process_state_f_cfr(code, data),
            State::FFtt => self.process_state_f_ftt(code, data),
            State::FDocNonEcm | State::FPostDocNonEcm => {
                self.process_state_f_doc_non_ecm(code, data);
            }
            State::FDocEcm | State::FPostDocEcm => self.process_state_f_doc_ecm(code, data),
            State::FPostRcpMcf => self.process_state_f_post_rcp_mcf(code, data),
            State::FPostRcpPpr => self.process_state_f_post_rcp_ppr(code, data),
            State::FPostRcpRnr => self.process_state_f_post_rcp_rnr(code, data),
            State::R => self.process_state_r(code, data),
            State::T => self.process_state_t(code, data),
            State::I | State::II => self.process_unexpected_frame(code),
            State::IIQ => self.process_state_ii_q(code),
            State::IIIQMcf => self.process_state_iii_q(code, data, fcf::MCF),
            State::IIIQRtp => self.process_state_iii_q(code, data, fcf::RTP),
            State::IIIQRtn => self.process_state_iii_q(code, data, fcf::RTN),
            State::IV => self.process_unexpected_frame(code),
            State::IVPpsNull | State::IVPpsQ => self.process_state_iv_pps(code, data),
            State::IVPpsRnr => self.process_state_iv_rnr(code, data, false),
            State::IVCtc => self.process_state_iv_ctc(code),
            State::IVEor => self.process_state_iv_eor(code),
            State::IVEorRnr => self.process_state_iv_rnr(code, data, true),
            State::CallFinished => {}
        }
    }

    fn process_unexpected_frame(&mut self, code: u8) {
        t30_debug!(
            "unexpected frame {} in state {}",
            fcf_name(code),
            self.state.as_str()
        );
    }

    // =========================================================================
    // Phase B: Capability Exchange
    // =========================================================================

    fn process_state_answering(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::DIS => self.process_rx_dis_dtc(data),
            fcf::DCS => self.process_rx_dcs(data),
            fcf::DCN => {
                self.set_status(Status::DcnWhyRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    fn process_state_t(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::DIS => self.process_rx_dis_dtc(data),
            fcf::DCN => {
                self.set_status(Status::DcnWhyRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    fn process_state_r(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::DCS => self.process_rx_dcs(data),
            fcf::DIS => self.process_rx_dis_dtc(data),
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnWhyRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    /// A DIS (or DTC) arrived: learn the far end's capabilities and pick
    /// a direction.
    pub(crate) fn process_rx_dis_dtc(&mut self, data: &[u8]) {
        let Some(frame) = DisDtcFrame::from_wire(data) else {
            t30_debug!("DIS too short, len {}", data.len() as u32);
            return;
        };
        self.timers.stop_t2_t4();
        self.remote_dis = frame;
        self.remote_dis_valid = true;
        let is_dtc = data[2] == fcf::DTC;
        if !is_dtc {
            self.dis_received = true;
        }
        self.permitted_modems = capability::decode_rate_capabilities(frame.rate_code())
            & self.config.supported_modems;

        if let Err(status) = self.env.phase_b(data[2]) {
            self.set_status(status);
            self.send_dcn();
            return;
        }

        if self.config.tx_document || is_dtc {
            if !self.remote_dis.bit(capability::bit::RECEIVE_FAX) {
                self.set_status(Status::RxIncapable);
                self.send_dcn();
                return;
            }
            self.start_sending_document();
        } else if self.config.rx_allowed
            && self.remote_dis.bit(capability::bit::READY_TO_TRANSMIT)
        {
            // The far end has a document for us: poll for it
            self.set_phase(Phase::BTx);
            self.send_dis_or_dtc_sequence(fcf::DTC);
        } else if self.config.rx_allowed {
            // We came to collect and the far end has nothing to send
            self.set_status(Status::TxIncapable);
            self.send_dcn();
        } else {
            self.set_status(Status::Incompatible);
            self.send_dcn();
        }
    }

    /// Negotiate rate, resolution and width for the queued document and
    /// send the DCS sequence.
    pub(crate) fn start_sending_document(&mut self) {
        if !self.remote_dis_valid {
            self.set_status(Status::Incompatible);
            self.send_dcn();
            return;
        }
        let Some(start) = fallback::first_entry(self.permitted_modems) else {
            self.set_status(Status::Incompatible);
            self.send_dcn();
            return;
        };
        self.current_fallback = start;

        self.use_ecm = self.config.ecm_allowed && self.remote_dis.bit(capability::bit::ECM);
        self.octets_per_ecm_frame =
            if self.remote_dis.bit(capability::bit::FRAME_SIZE_64) { 64 } else { 256 };

        let (x, y) = self.env.tx_resolution();
        self.image_width = self.env.tx_image_width();
        let Some(entry) = capability::resolution::lookup_resolution(x, y) else {
            self.set_status(Status::ResolutionNotSupported);
            self.send_dcn();
            return;
        };
        if let Err(status) = self.build_dcs(entry) {
            self.set_status(status);
            self.send_dcn();
            return;
        }
        t30_debug!(
            "sending DCS: {} bps, ECM {}",
            FALLBACK_SEQUENCE[self.current_fallback].bit_rate,
            self.use_ecm as u32
        );
        self.send_dcs_sequence();
    }

    /// A DCS arrived: adopt the far end's choices and prepare to receive.
    pub(crate) fn process_rx_dcs(&mut self, data: &[u8]) {
        use capability::bit;

        let Some(frame) = DisDtcFrame::from_wire(data) else {
            t30_debug!("DCS too short, len {}", data.len() as u32);
            return;
        };
        self.timers.stop_t2_t4();
        self.dcs = frame;

        let Some(entry) = fallback::entry_by_dcs_code(frame.rate_code()) else {
            t30_debug!("DCS with unknown rate code {}", frame.rate_code());
            self.set_status(Status::Incompatible);
            self.send_dcn();
            return;
        };
        self.current_fallback = entry;

        self.use_ecm = frame.bit(bit::ECM);
        self.octets_per_ecm_frame = if frame.bit(bit::FRAME_SIZE_64) { 64 } else { 256 };

        // Image geometry as commanded
        let inch = frame.bit(bit::INCH_PREFERRED);
        use capability::resolution as res;
        let (x, y, x_class) = if frame.bit(bit::RES_1200) {
            (res::X_DPI1200, res::Y_DPI1200, 5)
        } else if frame.bit(bit::RES_600_1200) {
            (res::X_DPI600, res::Y_DPI1200, 3)
        } else if frame.bit(bit::RES_600) {
            (res::X_DPI600, res::Y_DPI600, 3)
        } else if frame.bit(bit::RES_400_800) {
            (res::X_DPI400, res::Y_DPI800, 2)
        } else if frame.bit(bit::RES_300_600) {
            (res::X_DPI300, res::Y_DPI600, 1)
        } else if frame.bit(bit::RES_400) {
            if inch {
                (res::X_DPI400, res::Y_DPI400, 2)
            } else {
                (res::X_R16, res::Y_SUPERFINE, 2)
            }
        } else if frame.bit(bit::RES_300) {
            (res::X_DPI300, res::Y_DPI300, 1)
        } else if frame.bit(bit::SUPERFINE) {
            if inch {
                (res::X_DPI200, res::Y_DPI400, 0)
            } else {
                (res::X_R8, res::Y_SUPERFINE, 0)
            }
        } else if frame.bit(bit::FINE) {
            if inch {
                (res::X_DPI200, res::Y_DPI200, 0)
            } else {
                (res::X_R8, res::Y_FINE, 0)
            }
        } else if inch {
            (res::X_DPI200, res::Y_DPI100, 0)
        } else {
            (res::X_R8, res::Y_STANDARD, 0)
        };
        self.x_resolution = x;
        self.y_resolution = y;

        let width_code = if frame.bit(bit::WIDTH_303) {
            2
        } else if frame.bit(bit::WIDTH_255) {
            1
        } else {
            0
        };
        if let Some(width) = res::width_for_code(x_class, width_code) {
            self.image_width = width;
        }
        self.selected_compression = if frame.bit(bit::T6_CODING) {
            crate::session::config::Compressions::T6
        } else if frame.bit(bit::TWO_D_CODING) {
            crate::session::config::Compressions::T4_2D
        } else {
            crate::session::config::Compressions::T4_1D
        };

        if !self.config.rx_allowed {
            self.set_status(Status::Incompatible);
            self.send_dcn();
            return;
        }
        if let Err(status) = self.env.phase_b(data[2]) {
            self.set_status(status);
            self.send_dcn();
            return;
        }

        t30_debug!(
            "DCS accepted: {} bps, ECM {}, width {}",
            FALLBACK_SEQUENCE[self.current_fallback].bit_rate,
            self.use_ecm as u32,
            self.image_width
        );
        if self.config.iaf.contains(crate::session::config::IafMode::NO_TCF) {
            // No training check on an IP leg; confirm straight away
            self.set_phase(Phase::DTx);
            self.set_state(State::FCfr);
            self.send_simple_frame(fcf::CFR);
        } else {
            self.reset_tcf_counters();
            self.set_state(State::FTcf);
            self.queue_phase(Phase::CNonEcmRx);
        }
    }

    // =========================================================================
    // Phase B/C: Transmitter Side
    // =========================================================================

    fn process_state_d_post_tcf(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::CFR => {
                self.timers.stop_t2_t4();
                self.retries = 0;
                // V.17 reaches steady state; later pages may short-train
                self.short_train = FALLBACK_SEQUENCE[self.current_fallback].modulation
                    == crate::env::Modulation::V17;
                self.ecm_page = 0;
                self.start_page_transmission();
            }
            fcf::FTT => {
                self.timers.stop_t2_t4();
                self.retries = 0;
                self.short_train = false;
                match fallback::step(self.current_fallback, self.permitted_modems) {
                    Some(next) => {
                        self.current_fallback = next;
                        t30_debug!(
                            "FTT: stepping down to {} bps",
                            FALLBACK_SEQUENCE[next].bit_rate
                        );
                        self.dcs.set_rate_code(FALLBACK_SEQUENCE[next].dcs_code);
                        self.send_dcs_sequence();
                    }
                    None => {
                        self.set_status(Status::CannotTrain);
                        self.send_dcn();
                    }
                }
            }
            fcf::DIS => {
                // The far end never saw our DCS and is still advertising
                self.retries += 1;
                if self.retries >= MAX_MESSAGE_TRIES {
                    self.set_status(Status::PhBDeadTx);
                    self.send_dcn();
                } else {
                    self.process_rx_dis_dtc(data);
                }
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::BadDcsTx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    fn process_state_ii_q(&mut self, code: u8) {
        match code {
            fcf::MCF => {
                self.timers.stop_t2_t4();
                self.timers.stop_t3();
                self.retries = 0;
                self.env.tx_end_page();
                self.tx_page_count += 1;
                if self.env.phase_d(fcf::MCF).is_err() {
                    self.send_dcn();
                    return;
                }
                self.advance_after_page_confirmation();
            }
            fcf::RTP => {
                self.timers.stop_t2_t4();
                self.retries = 0;
                self.env.tx_end_page();
                self.tx_page_count += 1;
                self.short_train = false;
                let _ = self.env.phase_d(fcf::RTP);
                if self.next_tx_step & FCF_MASK == fcf::EOP {
                    self.send_dcn();
                } else {
                    // Renegotiate, then carry on with the next page
                    self.send_dcs_sequence();
                }
            }
            fcf::RTN => {
                self.timers.stop_t2_t4();
                self.short_train = false;
                let _ = self.env.phase_d(fcf::RTN);
                self.retries += 1;
                if self.retries >= MAX_MESSAGE_TRIES {
                    self.set_status(Status::BadPgTx);
                    self.send_dcn();
                    return;
                }
                // Renegotiate and resend the same page
                self.retransmit_page = true;
                self.send_dcs_sequence();
            }
            fcf::PIP | fcf::PIN => {
                self.timers.stop_t2_t4();
                self.timers.start_t3();
                let _ = self.env.phase_d(code);
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnPhdRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    /// MCF for a non-ECM page: move to the next page, renegotiation, or
    /// the end of the call.
    fn advance_after_page_confirmation(&mut self) {
        match self.next_tx_step & FCF_MASK {
            fcf::MPS => {
                self.start_page_transmission();
            }
            fcf::EOM => {
                // Both sides fall back to the start of phase B
                self.set_state(State::T);
                self.timers.start_t1();
                self.queue_phase(Phase::BRx);
            }
            _ => {
                // EOP: done
                self.send_dcn();
            }
        }
    }

    // =========================================================================
    // Phase C/D: Receiver Side, Non-ECM
    // =========================================================================

    fn process_state_f_cfr(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::DCS => self.process_rx_dcs(data),
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnDataRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    fn process_state_f_ftt(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::DCS => self.process_rx_dcs(data),
            fcf::DIS => self.process_rx_dis_dtc(data),
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnDataRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    fn process_state_f_doc_non_ecm(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::MPS | fcf::PRI_MPS | fcf::EOM | fcf::PRI_EOM | fcf::EOP | fcf::PRI_EOP => {
                self.timers.stop_t2_t4();
                self.next_rx_step = code;
                if matches!(code, fcf::PRI_MPS | fcf::PRI_EOM | fcf::PRI_EOP) {
                    // Operator interrupt requested; give them T3 to act
                    self.timers.start_t3();
                }
                let stats = self.env.rx_end_page();
                let quality = crate::env::CopyQuality::judge(stats);
                t30_debug!(
                    "post-page {}: {} rows, {} bad",
                    fcf_name(code),
                    stats.total_rows,
                    stats.bad_rows
                );
                let _ = self.env.phase_d(code);
                self.set_phase(Phase::DTx);
                match quality {
                    crate::env::CopyQuality::Good => {
                        self.rx_page_count += 1;
                        self.set_state(State::IIIQMcf);
                        self.send_simple_frame(fcf::MCF);
                    }
                    crate::env::CopyQuality::Poor => {
                        self.rx_page_count += 1;
                        self.set_state(State::IIIQRtp);
                        self.send_simple_frame(fcf::RTP);
                    }
                    crate::env::CopyQuality::Bad => {
                        self.set_state(State::IIIQRtn);
                        self.send_simple_frame(fcf::RTN);
                    }
                }
            }
            fcf::DCS => self.process_rx_dcs(data),
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnFaxRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    fn process_state_iii_q(&mut self, code: u8, data: &[u8], response: u8) {
        match code {
            fcf::MPS | fcf::PRI_MPS | fcf::EOM | fcf::PRI_EOM | fcf::EOP | fcf::PRI_EOP => {
                // They missed our answer; repeat it
                self.timers.stop_t2_t4();
                self.set_phase(Phase::DTx);
                self.send_simple_frame(response);
            }
            fcf::DCS => {
                // Retraining after RTP/RTN
                self.process_rx_dcs(data);
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                match response {
                    fcf::RTN => self.set_status(Status::DcnNoRtnRx),
                    fcf::RTP => self.set_status(Status::DcnFaxRx),
                    _ => {
                        // After EOP+MCF a DCN is the normal end of the call
                        if self.next_rx_step & FCF_MASK != fcf::EOP {
                            self.set_status(Status::DcnFaxRx);
                        }
                    }
                }
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    // =========================================================================
    // Phase C/D: Receiver Side, ECM
    // =========================================================================

    fn process_state_f_doc_ecm(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::PPS => self.process_rx_pps(data),
            fcf::CTC => self.process_rx_ctc(data),
            fcf::EOR => self.process_rx_eor(data),
            fcf::DCS => self.process_rx_dcs(data),
            fcf::RR => {
                // Stray RR while we owe nothing; answer with our last state
                self.repeat_last_command();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnDataRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    /// PPS: reconcile the frame count, then confirm or request repeats.
    fn process_rx_pps(&mut self, data: &[u8]) {
        if data.len() < 7 {
            t30_debug!("PPS with unexpected length {}", data.len() as u32);
            return;
        }
        self.timers.stop_t2_t4();
        let fcf2 = data[3] & FCF_MASK;
        let page = data[4];
        let block = data[5];
        // An 0xFF count octet is a known peer bug meaning "none"; otherwise
        // the octet carries count-1. Only ever raise the running count.
        let reported = match data[6] {
            0xFF => 0,
            n => usize::from(n) + 1,
        };
        if reported > self.ecm.frames {
            self.ecm.frames = reported;
        }
        t30_debug!(
            "PPS-{} page {} block {} frames {}",
            fcf_name(fcf2),
            page,
            block,
            self.ecm.frames as u32
        );

        if self.receiver_not_ready_count > 0 {
            self.receiver_not_ready_count -= 1;
            self.pending_pps = Some(PendingPps { fcf2, page, block });
            self.set_phase(Phase::DTx);
            self.set_state(State::FPostRcpRnr);
            self.send_simple_frame(fcf::RNR);
            return;
        }
        self.answer_pps(fcf2, page, block);
    }

    /// Answer a (possibly deferred) PPS with MCF or PPR.
    pub(crate) fn answer_pps(&mut self, fcf2: u8, _page: u8, block: u8) {
        let expected = self.ecm.frames;
        let mut map = self.last_ppr_map;
        let first_missing = self.ecm.build_missing_map(expected, &mut map);
        self.last_ppr_map = map;

        self.set_phase(Phase::DTx);
        if first_missing.is_none() {
            // Block complete: hand it to the decoder
            self.commit_partial_page(fcf2);
            self.ecm_block = block.wrapping_add(1);
            self.next_rx_step = fcf2;
            self.set_state(State::FPostRcpMcf);
            self.send_simple_frame(fcf::MCF);
        } else {
            t30_debug!("PPS: frames missing from {}", first_missing.unwrap_or(0) as u32);
            self.send_ppr_frame();
        }
    }

    /// Feed a completed block to the decoder; end the page when the PPS
    /// carried a real post-page command.
    fn commit_partial_page(&mut self, fcf2: u8) {
        for i in 0..self.ecm.frames {
            let mut chunk = [0u8; MAX_ECM_FRAME_OCTETS];
            let len = {
                let Some(payload) = self.ecm.payload(i) else { continue };
                chunk[..payload.len()].copy_from_slice(payload);
                payload.len()
            };
            self.env.rx_chunk(&chunk[..len]);
        }
        self.ecm.clear();
        if fcf2 != fcf::NULL {
            let stats = self.env.rx_end_page();
            t30_debug!("ECM page complete: {} rows", stats.total_rows);
            self.rx_page_count += 1;
            self.ecm_page = self.ecm_page.wrapping_add(1);
            self.ecm_block = 0;
            let _ = self.env.phase_d(fcf2);
        }
    }

    fn process_rx_ctc(&mut self, data: &[u8]) {
        if data.len() < 5 {
            t30_debug!("CTC with unexpected length {}", data.len() as u32);
            return;
        }
        self.timers.stop_t2_t4();
        let code = data[4] & 0x3C;
        if let Some(entry) = fallback::entry_by_dcs_code(code) {
            self.current_fallback = entry;
            t30_debug!("CTC: new rate {} bps", FALLBACK_SEQUENCE[entry].bit_rate);
        }
        self.short_train = false;
        self.set_phase(Phase::DTx);
        self.set_state(State::FDocEcm);
        self.send_simple_frame(fcf::CTR);
        self.queue_phase(Phase::CEcmRx);
    }

    fn process_rx_eor(&mut self, data: &[u8]) {
        if data.len() < 4 {
            t30_debug!("EOR with unexpected length {}", data.len() as u32);
            return;
        }
        self.timers.stop_t2_t4();
        let fcf2 = data[3] & FCF_MASK;
        t30_debug!("EOR-{}: far end abandons the missing frames", fcf_name(fcf2));
        self.set_status(Status::EcmPhdRx);
        self.next_rx_step = fcf2;
        // The incomplete block is dropped, not committed
        self.ecm.clear();
        if fcf2 != fcf::NULL {
            let _ = self.env.rx_end_page();
        }
        self.set_phase(Phase::DTx);
        self.set_state(State::FPostRcpMcf);
        self.send_simple_frame(fcf::ERR);
    }

    fn process_state_f_post_rcp_mcf(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::PPS => self.process_rx_pps(data),
            fcf::EOR => self.process_rx_eor(data),
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                if self.next_rx_step & FCF_MASK != fcf::EOP {
                    self.set_status(Status::DcnFaxRx);
                }
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    fn process_state_f_post_rcp_ppr(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::PPS => self.process_rx_pps(data),
            fcf::CTC => self.process_rx_ctc(data),
            fcf::EOR => self.process_rx_eor(data),
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnDataRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    fn process_state_f_post_rcp_rnr(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::RR => {
                self.timers.stop_t2_t4();
                if self.receiver_not_ready_count > 0 {
                    self.receiver_not_ready_count -= 1;
                    self.set_phase(Phase::DTx);
                    self.send_simple_frame(fcf::RNR);
                } else if let Some(pps) = self.pending_pps.take() {
                    self.answer_pps(pps.fcf2, pps.page, pps.block);
                } else {
                    self.set_phase(Phase::DTx);
                    self.send_simple_frame(fcf::RNR);
                }
            }
            fcf::PPS => self.process_rx_pps(data),
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnRrdRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    // =========================================================================
    // Phase C/D: Transmitter Side, ECM
    // =========================================================================

    fn process_state_iv_pps(&mut self, code: u8, data: &[u8]) {
        match code {
            fcf::MCF => {
                self.timers.stop_t2_t4();
                self.timers.stop_t3();
                self.timers.stop_t5();
                self.retries = 0;
                self.ppr_count = 0;
                self.ecm_confirmed();
            }
            fcf::PPR => self.process_rx_ppr(data),
            fcf::RNR => self.process_rx_rnr(false),
            fcf::PIP | fcf::PIN => {
                self.timers.stop_t2_t4();
                self.timers.start_t3();
                let _ = self.env.phase_d(code);
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnPhdRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    /// The receiver confirmed the burst: advance block, page, or finish.
    fn ecm_confirmed(&mut self) {
        if self.ecm.at_page_end {
            self.env.tx_end_page();
            self.tx_page_count += 1;
            if self.env.phase_d(self.next_tx_step).is_err() {
                self.send_dcn();
                return;
            }
            match self.next_tx_step & FCF_MASK {
                fcf::MPS => {
                    self.ecm_page = self.ecm_page.wrapping_add(1);
                    self.start_page_transmission();
                }
                fcf::EOM => {
                    self.set_state(State::T);
                    self.timers.start_t1();
                    self.queue_phase(Phase::BRx);
                }
                _ => {
                    self.send_dcn();
                }
            }
        } else {
            // PPS-NULL confirmed: next block of the same page
            self.ecm_block = self.ecm_block.wrapping_add(1);
            self.get_partial_ecm_page();
            self.set_state(State::IV);
            self.queue_phase(Phase::CEcmTx);
            self.send_ecm_burst();
        }
    }

    /// A PPR: drop the acknowledged frames and retransmit the remainder,
    /// or change rate once the budget is burned.
    fn process_rx_ppr(&mut self, data: &[u8]) {
        if data.len() != 3 + crate::session::ecm::ECM_FRAME_MAP_LEN {
            t30_debug!("PPR with unexpected length {}", data.len() as u32);
            return;
        }
        self.timers.stop_t2_t4();
        self.retries = 0;
        self.ppr_count += 1;
        if self.ppr_count >= PPR_LIMIT_BEFORE_CTC_OR_EOR {
            self.ppr_count = 0;
            self.set_phase(Phase::DTx);
            match fallback::step(self.current_fallback, self.permitted_modems) {
                Some(next) => {
                    self.current_fallback = next;
                    self.short_train = false;
                    t30_debug!(
                        "PPR budget burned; CTC to {} bps",
                        FALLBACK_SEQUENCE[next].bit_rate
                    );
                    self.send_ctc_frame();
                }
                None => {
                    t30_debug!("PPR budget burned with no slower rate; EOR");
                    self.set_status(Status::EcmPhdTx);
                    self.send_eor_frame();
                }
            }
            return;
        }

        let remaining = self.ecm.apply_ppr_map(&data[3..], self.ecm.frames);
        t30_debug!("PPR: {} frames to resend", remaining as u32);
        self.set_state(State::IV);
        self.queue_phase(Phase::CEcmTx);
        self.send_ecm_burst();
    }

    fn process_rx_rnr(&mut self, after_eor: bool) {
        self.timers.stop_t2_t4();
        if !self.timers.t5_running() {
            self.timers.start_t5();
        }
        self.set_state(if after_eor { State::IVEorRnr } else { State::IVPpsRnr });
        self.set_phase(Phase::DTx);
        self.send_simple_frame(fcf::RR);
    }

    fn process_state_iv_rnr(&mut self, code: u8, data: &[u8], after_eor: bool) {
        match code {
            fcf::RNR => self.process_rx_rnr(after_eor),
            fcf::MCF if !after_eor => {
                self.timers.stop_t2_t4();
                self.timers.stop_t5();
                self.retries = 0;
                self.ppr_count = 0;
                self.ecm_confirmed();
            }
            fcf::PPR if !after_eor => {
                self.timers.stop_t5();
                self.process_rx_ppr(data);
            }
            fcf::ERR if after_eor => {
                self.timers.stop_t2_t4();
                self.timers.stop_t5();
                self.eor_acknowledged();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnRrdRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    fn process_state_iv_ctc(&mut self, code: u8) {
        match code {
            fcf::CTR => {
                self.timers.stop_t2_t4();
                self.retries = 0;
                t30_debug!(
                    "CTR: resuming at {} bps",
                    FALLBACK_SEQUENCE[self.current_fallback].bit_rate
                );
                self.set_state(State::IV);
                self.queue_phase(Phase::CEcmTx);
                self.send_ecm_burst();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnPhdRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    fn process_state_iv_eor(&mut self, code: u8) {
        match code {
            fcf::ERR => {
                self.timers.stop_t2_t4();
                self.retries = 0;
                self.eor_acknowledged();
            }
            fcf::RNR => self.process_rx_rnr(true),
            fcf::CRP => self.repeat_last_command(),
            fcf::DCN => {
                self.set_status(Status::DcnPhdRx);
                self.disconnect();
            }
            _ => self.process_unexpected_frame(code),
        }
    }

    /// ERR after EOR: the far end accepts the loss; wind the flow on.
    fn eor_acknowledged(&mut self) {
        if self.ecm.at_page_end {
            self.env.tx_end_page();
            match self.next_tx_step & FCF_MASK {
                fcf::MPS => {
                    self.ecm_page = self.ecm_page.wrapping_add(1);
                    self.start_page_transmission();
                }
                fcf::EOM => {
                    self.set_state(State::T);
                    self.timers.start_t1();
                    self.queue_phase(Phase::BRx);
                }
                _ => self.send_dcn(),
            }
        } else {
            self.ecm_block = self.ecm_block.wrapping_add(1);
            self.get_partial_ecm_page();
            self.set_state(State::IV);
            self.queue_phase(Phase::CEcmTx);
            self.send_ecm_burst();
        }
    }

    // =========================================================================
    // Command Repeat
    // =========================================================================

    /// Replay the last outgoing message for the current state (CRP, T4
    /// expiry, and "they did not see us" recoveries).
    pub(crate) fn repeat_last_command(&mut self) {
        t30_debug!("repeating last command in state {}", self.state.as_str());
        match self.state {
            State::R => {
                self.set_phase(Phase::BTx);
                self.send_dis_or_dtc_sequence(self.local_dis.frame_type());
            }
            State::D | State::DPostTcf => {
                self.send_dcs_sequence();
            }
            State::II | State::IIQ => {
                self.set_state(State::II);
                self.set_phase(Phase::DTx);
                self.send_simple_frame(self.next_tx_step);
            }
            State::IIIQMcf => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::MCF);
            }
            State::IIIQRtp => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::RTP);
            }
            State::IIIQRtn => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::RTN);
            }
            State::IVPpsNull | State::IVPpsQ => {
                self.set_phase(Phase::DTx);
                self.send_pps_frame();
            }
            State::IVPpsRnr | State::IVEorRnr => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::RR);
            }
            State::IVCtc => {
                self.set_phase(Phase::DTx);
                self.send_ctc_frame();
            }
            State::IVEor => {
                self.set_phase(Phase::DTx);
                self.send_eor_frame();
            }
            State::FCfr => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::CFR);
            }
            State::FFtt => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::FTT);
            }
            State::FPostRcpMcf => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::MCF);
            }
            State::FPostRcpPpr => {
                self.set_phase(Phase::DTx);
                self.send_ppr_frame();
            }
            State::FPostRcpRnr => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::RNR);
            }
            _ => {
                t30_debug!("nothing to repeat in state {}", self.state.as_str());
            }
        }
    }
}
