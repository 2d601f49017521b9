//! Session-level scenario tests.
//!
//! These drive whole call flows against the mock environment: the
//! standard send/receive handshakes, training fallback, ECM selective
//! repeat, flow control, retries and disconnects.

extern crate std;

use std::vec::Vec;

use crate::capability::{DisDtcFrame, bit};
use crate::env::{
    FrontEndEvent, HdlcEvent, ModemType, Modulation, SIG_STATUS_CARRIER_DOWN,
    SIG_STATUS_END_OF_DATA,
};
use crate::frames::{FCF_MASK, fcf};
use crate::session::config::{ModemSupport, T30Config};
use crate::session::error::Status;
use crate::session::phase::Phase;
use crate::session::phase::State;
use crate::session::t30::T30Session;
use crate::session::timers::ms_to_samples;
use crate::test_utils::MockEnvironment;

// =============================================================================
// Helpers
// =============================================================================

type Session = T30Session<MockEnvironment>;

fn deliver(session: &mut Session, data: &[u8]) {
    session.hdlc_accept(HdlcEvent::Frame { data, crc_ok: true });
}

fn deliver_simple(session: &mut Session, code: u8) {
    deliver(session, &[0xFF, 0x13, code]);
}

/// Build a remote DIS advertising receive capability plus extras.
fn remote_dis(rate_code: u8, extra_bits: &[u8]) -> Vec<u8> {
    let mut dis = DisDtcFrame::new(fcf::DIS);
    dis.set_bit(bit::RECEIVE_FAX);
    dis.set_rate_code(rate_code);
    for &b in extra_bits {
        dis.set_bit(b);
    }
    dis.prune();
    dis.as_octets().to_vec()
}

/// Build a remote DCS (from a caller, so the low FCF bit is set).
fn remote_dcs(rate_code: u8, extra_bits: &[u8]) -> Vec<u8> {
    let mut dcs = DisDtcFrame::new(fcf::DCS | 0x01);
    dcs.set_bit(bit::RECEIVE_FAX);
    dcs.set_rate_code(rate_code);
    for &b in extra_bits {
        dcs.set_bit(b);
    }
    dcs.prune();
    dcs.as_octets().to_vec()
}

fn caller_config() -> T30Config {
    T30Config::new(true).with_tx_document(true)
}

fn answerer_config() -> T30Config {
    T30Config::new(false)
}

/// Walk a calling transmitter up to D-POST-TCF (DCS and TCF sent).
fn caller_to_post_tcf(session: &mut Session, dis_octets: &[u8]) {
    session.restart();
    session.hdlc_accept(HdlcEvent::Flags);
    deliver(session, dis_octets);
    assert_eq!(session.state(), State::D);
    session.front_end_status(FrontEndEvent::SendStepComplete); // DCS out
    assert_eq!(session.state(), State::DTcf);
    // Drain the TCF so the generator is exercised
    let mut zeros = 0u32;
    loop {
        match session.non_ecm_get_bit() {
            0 => zeros += 1,
            SIG_STATUS_END_OF_DATA => break,
            other => panic!("unexpected TCF bit {other}"),
        }
    }
    assert!(zeros > 0);
    session.front_end_status(FrontEndEvent::SendStepComplete); // TCF out
    assert_eq!(session.state(), State::DPostTcf);
}

/// Walk an answering receiver up to F-TCF for the given remote DCS.
fn answerer_to_tcf(session: &mut Session, dcs_octets: &[u8]) {
    session.restart();
    session.front_end_status(FrontEndEvent::SendStepComplete); // CED done
    assert!(session.env().sent(fcf::DIS));
    session.front_end_status(FrontEndEvent::SendStepComplete); // DIS out
    deliver(session, dcs_octets);
    assert_eq!(session.state(), State::FTcf);
}

/// Feed a clean TCF at the given rate and drop the carrier.
fn feed_good_tcf(session: &mut Session, bit_rate: u32) {
    for _ in 0..bit_rate + 16 {
        session.non_ecm_put_bit(0);
    }
    session.non_ecm_put_bit(SIG_STATUS_CARRIER_DOWN);
}

// =============================================================================
// Scenario A: full non-ECM handshake at V.29 9600
// =============================================================================

#[test]
fn full_handshake_send_non_ecm_v29() {
    let env = MockEnvironment::transmitter(1, 2000);
    let config = caller_config().with_ecm(false);
    let mut session = T30Session::new(config, env);
    session.restart();

    assert_eq!(session.phase(), Phase::ACng);
    assert_eq!(session.state(), State::T);

    // The answerer is V.29-only with 255 mm width capability
    let dis = remote_dis(0x04, &[bit::WIDTH_255]);
    session.hdlc_accept(HdlcEvent::Flags);
    assert_eq!(session.phase(), Phase::BRx);
    deliver(&mut session, &dis);

    // DCS must select V.29 9600 (dcs_code 0x04)
    {
        let env = session.env();
        let dcs_frames = env.frames_with_fcf(fcf::DCS);
        assert_eq!(dcs_frames.len(), 1);
        assert_eq!(dcs_frames[0][4] & 0x3C, 0x04);
        assert_eq!(dcs_frames[0][2], fcf::DCS | 0x01);
    }

    session.front_end_status(FrontEndEvent::SendStepComplete); // DCS out
    assert_eq!(session.state(), State::DTcf);
    assert_eq!(
        session.env().last_tx_type(),
        Some(ModemType::Fast { modulation: Modulation::V29, bit_rate: 9600 })
    );

    // TCF runs 1.5 s of zeros at 9600 bps
    let mut zeros = 0u32;
    while session.non_ecm_get_bit() == 0 {
        zeros += 1;
    }
    assert_eq!(zeros, 14_400);

    session.front_end_status(FrontEndEvent::SendStepComplete); // TCF out
    deliver_simple(&mut session, fcf::CFR);
    assert_eq!(session.state(), State::I);
    assert_eq!(session.env().tx_pages_started, 1);

    // The image goes out; the front end reports completion
    session.front_end_status(FrontEndEvent::SendStepComplete);
    assert!(session.env().sent(fcf::EOP));
    session.front_end_status(FrontEndEvent::SendStepComplete); // EOP out
    assert_eq!(session.state(), State::IIQ);

    deliver_simple(&mut session, fcf::MCF);
    assert!(session.env().sent(fcf::DCN));
    assert_eq!(session.env().tx_pages_ended, 1);
    assert_eq!(session.tx_page_count(), 1);

    session.front_end_status(FrontEndEvent::SendStepComplete); // DCN out
    assert_eq!(session.phase(), Phase::E);
    assert_eq!(session.status(), Status::Ok);
    assert_eq!(session.env().phase_e_status, Some(Status::Ok));
}

// =============================================================================
// Scenario B: failed training steps the fallback ladder
// =============================================================================

#[test]
fn failed_training_falls_back() {
    let env = MockEnvironment::transmitter(1, 2000);
    let config = caller_config().with_ecm(false);
    let mut session = T30Session::new(config, env);

    let dis = remote_dis(0x0C, &[]); // V.29 + V.27ter capable
    caller_to_post_tcf(&mut session, &dis);
    {
        let dcs_frames = session.env().frames_with_fcf(fcf::DCS);
        assert_eq!(dcs_frames[0][4] & 0x3C, 0x04); // 9600 V.29 first
    }

    deliver_simple(&mut session, fcf::FTT);
    assert_eq!(session.state(), State::D);
    {
        let dcs_frames = session.env().frames_with_fcf(fcf::DCS);
        assert_eq!(dcs_frames.len(), 2);
        assert_eq!(dcs_frames[1][4] & 0x3C, 0x0C); // stepped to 7200 V.29
    }

    // Second TCF at the slower rate, then CFR and a clean finish
    session.front_end_status(FrontEndEvent::SendStepComplete);
    let mut zeros = 0u32;
    while session.non_ecm_get_bit() == 0 {
        zeros += 1;
    }
    assert_eq!(zeros, 10_800); // 1.5 s at 7200 bps
    session.front_end_status(FrontEndEvent::SendStepComplete);
    deliver_simple(&mut session, fcf::CFR);
    assert_eq!(session.state(), State::I);
    assert_eq!(session.status(), Status::Ok);
}

#[test]
fn fallback_exhaustion_cannot_train() {
    let env = MockEnvironment::transmitter(1, 100);
    let config = caller_config()
        .with_ecm(false)
        .with_supported_modems(ModemSupport::V27TER);
    let mut session = T30Session::new(config, env);

    let dis = remote_dis(0x08, &[]); // V.27ter only
    caller_to_post_tcf(&mut session, &dis);

    deliver_simple(&mut session, fcf::FTT); // 4800 -> 2400
    session.front_end_status(FrontEndEvent::SendStepComplete);
    while session.non_ecm_get_bit() == 0 {}
    session.front_end_status(FrontEndEvent::SendStepComplete);

    deliver_simple(&mut session, fcf::FTT); // nothing below 2400
    assert_eq!(session.status(), Status::CannotTrain);
    assert!(session.env().sent(fcf::DCN));
}

// =============================================================================
// Scenario C: ECM selective repeat
// =============================================================================

fn fcd_count(env: &MockEnvironment) -> usize {
    env.sent_frames.iter().filter(|f| f[2] == fcf::FCD).count()
}

fn rcp_count(env: &MockEnvironment) -> usize {
    env.sent_frames.iter().filter(|f| f[2] == fcf::RCP).count()
}

#[test]
fn ecm_selective_repeat() {
    // A page bigger than one block: the first burst is 256 full frames
    let env = MockEnvironment::transmitter(1, 256 * 256 + 100);
    let config = caller_config();
    let mut session = T30Session::new(config, env);

    let dis = remote_dis(0x2C, &[bit::ECM]); // V.17 capable, ECM
    caller_to_post_tcf(&mut session, &dis);
    deliver_simple(&mut session, fcf::CFR);

    assert_eq!(session.state(), State::IV);
    assert_eq!(fcd_count(session.env()), 256);
    assert_eq!(rcp_count(session.env()), 3);

    session.front_end_status(FrontEndEvent::SendStepComplete); // burst out
    {
        let pps = session.env().frames_with_fcf(fcf::PPS);
        assert_eq!(pps.len(), 1);
        assert_eq!(pps[0][3], fcf::NULL); // more blocks follow
        assert_eq!(pps[0][6], 255); // 256 frames in the burst
    }
    session.front_end_status(FrontEndEvent::SendStepComplete); // PPS out
    assert_eq!(session.state(), State::IVPpsNull);

    // The receiver wants frames 3, 17 and 98 again
    let mut ppr = [0u8; 35];
    ppr[0] = 0xFF;
    ppr[1] = 0x13;
    ppr[2] = fcf::PPR;
    ppr[3] = 1 << 3;
    ppr[5] = 1 << 1;
    ppr[15] = 1 << 2;
    session.env_mut().clear_traffic();
    deliver(&mut session, &ppr);

    // Exactly those three frames go out again, then RCP x3 and PPS-NULL
    let seqs: Vec<u8> = session
        .env()
        .sent_frames
        .iter()
        .filter(|f| f[2] == fcf::FCD)
        .map(|f| f[3])
        .collect();
    assert_eq!(seqs, [3, 17, 98]);
    assert_eq!(rcp_count(session.env()), 3);

    session.front_end_status(FrontEndEvent::SendStepComplete);
    {
        let pps = session.env().frames_with_fcf(fcf::PPS);
        assert_eq!(pps.len(), 1);
        assert_eq!(pps[0][3], fcf::NULL);
        assert_eq!(pps[0][6], 2); // three frames in this burst
    }
    session.front_end_status(FrontEndEvent::SendStepComplete);

    deliver_simple(&mut session, fcf::MCF);
    assert_eq!(session.ppr_count, 0);
    // The trailing 100 octets went out as the next block
    assert_eq!(session.state(), State::IV);
    assert!(session.ecm.at_page_end);
}

#[test]
fn ecm_ppr_budget_forces_ctc() {
    let env = MockEnvironment::transmitter(1, 512);
    let config = caller_config();
    let mut session = T30Session::new(config, env);

    let dis = remote_dis(0x2C, &[bit::ECM]);
    caller_to_post_tcf(&mut session, &dis);
    deliver_simple(&mut session, fcf::CFR);
    session.front_end_status(FrontEndEvent::SendStepComplete);
    session.front_end_status(FrontEndEvent::SendStepComplete); // PPS out

    let mut ppr = [0u8; 35];
    ppr[0] = 0xFF;
    ppr[1] = 0x13;
    ppr[2] = fcf::PPR;
    ppr[3] = 0x01; // frame 0 keeps failing
    for _ in 0..3 {
        deliver(&mut session, &ppr);
        session.front_end_status(FrontEndEvent::SendStepComplete); // burst
        session.front_end_status(FrontEndEvent::SendStepComplete); // PPS
    }
    assert!(!session.env().sent(fcf::CTC));

    // The fourth PPR burns the budget: CTC at the next rate down
    deliver(&mut session, &ppr);
    assert!(session.env().sent(fcf::CTC));
    assert_eq!(session.state(), State::IVCtc);
    {
        let ctc = session.env().frames_with_fcf(fcf::CTC);
        assert_eq!(ctc[0][4] & 0x3C, 0x28); // 14400 -> 12000
    }

    // CTR resumes the retransmission
    session.env_mut().clear_traffic();
    session.front_end_status(FrontEndEvent::SendStepComplete);
    deliver_simple(&mut session, fcf::CTR);
    assert_eq!(fcd_count(session.env()), 1);
    assert_eq!(session.state(), State::IV);
}

// =============================================================================
// Scenario D: receiver not ready
// =============================================================================

#[test]
fn receiver_not_ready_flow() {
    let env = MockEnvironment::new();
    let config = answerer_config().with_receiver_not_ready_count(2);
    let mut session = T30Session::new(config, env);

    let dcs = remote_dcs(0x20, &[bit::ECM]); // V.17 14400, ECM
    answerer_to_tcf(&mut session, &dcs);
    feed_good_tcf(&mut session, 14_400);
    assert!(session.env().sent(fcf::CFR));
    session.front_end_status(FrontEndEvent::SendStepComplete); // CFR out
    assert_eq!(session.state(), State::FDocEcm);

    // Two FCD frames, the RCP, then PPS-EOP
    deliver(&mut session, &[0xFF, 0x03, fcf::FCD, 0, 1, 2, 3]);
    deliver(&mut session, &[0xFF, 0x03, fcf::FCD, 1, 4, 5, 6]);
    deliver(&mut session, &[0xFF, 0x03, fcf::RCP]);
    assert_eq!(session.state(), State::FPostDocEcm);

    let pps = [0xFF, 0x13, fcf::PPS | 0x01, fcf::EOP | 0x01, 0, 0, 1];
    deliver(&mut session, &pps);
    assert_eq!(session.env().frames_with_fcf(fcf::RNR).len(), 1);
    assert_eq!(session.state(), State::FPostRcpRnr);
    session.front_end_status(FrontEndEvent::SendStepComplete);

    deliver_simple(&mut session, fcf::RR | 0x01);
    assert_eq!(session.env().frames_with_fcf(fcf::RNR).len(), 2);
    session.front_end_status(FrontEndEvent::SendStepComplete);

    deliver_simple(&mut session, fcf::RR | 0x01);
    assert!(session.env().sent(fcf::MCF));
    assert_eq!(session.env().rx_chunks.len(), 2);
    assert_eq!(session.env().rx_pages_ended, 1);
    assert_eq!(session.rx_page_count(), 1);
}

#[test]
fn sender_arms_t5_on_rnr() {
    let env = MockEnvironment::transmitter(1, 512);
    let config = caller_config();
    let mut session = T30Session::new(config, env);

    let dis = remote_dis(0x2C, &[bit::ECM]);
    caller_to_post_tcf(&mut session, &dis);
    deliver_simple(&mut session, fcf::CFR);
    session.front_end_status(FrontEndEvent::SendStepComplete);
    session.front_end_status(FrontEndEvent::SendStepComplete); // PPS out

    deliver_simple(&mut session, fcf::RNR);
    assert_eq!(session.state(), State::IVPpsRnr);
    assert!(session.timers.t5_running());
    assert!(session.env().sent(fcf::RR));

    session.front_end_status(FrontEndEvent::SendStepComplete); // RR out
    deliver_simple(&mut session, fcf::MCF);
    assert!(!session.timers.t5_running());
}

#[test]
fn t5_expiry_ends_the_call() {
    let env = MockEnvironment::transmitter(1, 512);
    let config = caller_config();
    let mut session = T30Session::new(config, env);

    let dis = remote_dis(0x2C, &[bit::ECM]);
    caller_to_post_tcf(&mut session, &dis);
    deliver_simple(&mut session, fcf::CFR);
    session.front_end_status(FrontEndEvent::SendStepComplete);
    session.front_end_status(FrontEndEvent::SendStepComplete);
    deliver_simple(&mut session, fcf::RNR);

    session.timer_tick(ms_to_samples(65_000) as u32);
    assert_eq!(session.status(), Status::T5Expired);
    assert!(session.env().sent(fcf::DCN));
}

// =============================================================================
// Scenario E: T4 expiry retries, then gives up
// =============================================================================

#[test]
fn t4_expiry_retries_dcs_then_dies() {
    let env = MockEnvironment::transmitter(1, 100);
    let config = caller_config().with_ecm(false);
    let mut session = T30Session::new(config, env);

    let dis = remote_dis(0x04, &[]);
    caller_to_post_tcf(&mut session, &dis);
    assert_eq!(session.env().frames_with_fcf(fcf::DCS).len(), 1);

    for expiry in 1..3 {
        session.timer_tick(ms_to_samples(3_450) as u32);
        assert_eq!(session.env().frames_with_fcf(fcf::DCS).len(), 1 + expiry);
        assert_eq!(session.status(), Status::Ok);
        // Walk the resent DCS and TCF back out to re-arm T4
        session.front_end_status(FrontEndEvent::SendStepComplete);
        while session.non_ecm_get_bit() == 0 {}
        session.front_end_status(FrontEndEvent::SendStepComplete);
        assert_eq!(session.state(), State::DPostTcf);
    }

    session.timer_tick(ms_to_samples(3_450) as u32);
    assert_eq!(session.status(), Status::PhBDeadTx);
    assert!(session.env().sent(fcf::DCN));
}

// =============================================================================
// Scenario F: mid-call DCN on the receiver
// =============================================================================

#[test]
fn mid_call_dcn_reports_dcn_fax_rx() {
    let env = MockEnvironment::new();
    let config = answerer_config();
    let mut session = T30Session::new(config, env);

    let dcs = remote_dcs(0x04, &[]); // V.29 9600, non-ECM
    answerer_to_tcf(&mut session, &dcs);
    feed_good_tcf(&mut session, 9_600);
    assert!(session.env().sent(fcf::CFR));
    session.front_end_status(FrontEndEvent::SendStepComplete);
    assert_eq!(session.state(), State::FDocNonEcm);

    // A few rows of image, then the decoder spots the end of the page
    session.env_mut().rx_end_page_after_bits = Some(64);
    for _ in 0..64 {
        session.non_ecm_put_bit(1);
    }
    assert_eq!(session.state(), State::FPostDocNonEcm);

    deliver_simple(&mut session, fcf::DCN | 0x01);
    assert_eq!(session.status(), Status::DcnFaxRx);
    assert_eq!(session.phase(), Phase::E);
    assert_eq!(session.env().phase_e_status, Some(Status::DcnFaxRx));
}

// =============================================================================
// Receiver page quality responses
// =============================================================================

fn receive_one_page(session: &mut Session) {
    let dcs = remote_dcs(0x04, &[]);
    answerer_to_tcf(session, &dcs);
    feed_good_tcf(session, 9_600);
    session.front_end_status(FrontEndEvent::SendStepComplete); // CFR out
    session.env_mut().rx_end_page_after_bits = Some(16);
    for _ in 0..16 {
        session.non_ecm_put_bit(1);
    }
    assert_eq!(session.state(), State::FPostDocNonEcm);
}

#[test]
fn good_page_gets_mcf() {
    let mut env = MockEnvironment::new();
    env.rx_stats = crate::env::PageStats { total_rows: 1500, bad_rows: 2 };
    let mut session = T30Session::new(answerer_config(), env);
    receive_one_page(&mut session);

    deliver_simple(&mut session, fcf::EOP | 0x01);
    assert!(session.env().sent(fcf::MCF));
    assert_eq!(session.state(), State::IIIQMcf);

    // EOP confirmed; the DCN closes the call with a clean status
    session.front_end_status(FrontEndEvent::SendStepComplete);
    deliver_simple(&mut session, fcf::DCN | 0x01);
    assert_eq!(session.status(), Status::Ok);
    assert_eq!(session.env().phase_e_status, Some(Status::Ok));
}

#[test]
fn poor_page_gets_rtp() {
    let mut env = MockEnvironment::new();
    env.rx_stats = crate::env::PageStats { total_rows: 1500, bad_rows: 50 };
    let mut session = T30Session::new(answerer_config(), env);
    receive_one_page(&mut session);

    deliver_simple(&mut session, fcf::MPS | 0x01);
    assert!(session.env().sent(fcf::RTP));
    assert_eq!(session.state(), State::IIIQRtp);
}

#[test]
fn bad_page_gets_rtn() {
    let mut env = MockEnvironment::new();
    env.rx_stats = crate::env::PageStats { total_rows: 1500, bad_rows: 400 };
    let mut session = T30Session::new(answerer_config(), env);
    receive_one_page(&mut session);

    deliver_simple(&mut session, fcf::MPS | 0x01);
    assert!(session.env().sent(fcf::RTN));
    assert_eq!(session.state(), State::IIIQRtn);

    // The sender renegotiates: a new DCS lands while we wait
    session.front_end_status(FrontEndEvent::SendStepComplete);
    let dcs = remote_dcs(0x0C, &[]);
    deliver(&mut session, &dcs);
    assert_eq!(session.state(), State::FTcf);
}

// =============================================================================
// Timeouts and teardown
// =============================================================================

#[test]
fn t0_expires_with_nobody_there() {
    let mut session = T30Session::new(caller_config(), MockEnvironment::new());
    session.restart();
    session.timer_tick(ms_to_samples(60_000) as u32);
    assert_eq!(session.status(), Status::T0Expired);
    assert_eq!(session.phase(), Phase::E);
    // Nobody answered; no DCN goes out
    assert!(!session.env().sent(fcf::DCN));
}

#[test]
fn t1_expiry_on_answerer_sends_dcn() {
    let mut session = T30Session::new(answerer_config(), MockEnvironment::new());
    session.restart();
    session.front_end_status(FrontEndEvent::SendStepComplete); // CED
    session.front_end_status(FrontEndEvent::SendStepComplete); // DIS out
    session.timer_tick(ms_to_samples(120_000) as u32);
    assert_eq!(session.status(), Status::T1Expired);
    assert!(session.env().sent(fcf::DCN));
}

#[test]
fn good_frame_stops_t1() {
    let mut session = T30Session::new(caller_config(), MockEnvironment::new());
    session.restart();
    session.hdlc_accept(HdlcEvent::Flags);
    deliver(&mut session, &remote_dis(0x04, &[]));
    // T0/T1 are gone; only T4 (DCS response wait) could fire now
    session.front_end_status(FrontEndEvent::SendStepComplete);
    while session.non_ecm_get_bit() == 0 {}
    session.front_end_status(FrontEndEvent::SendStepComplete);
    session.timer_tick(ms_to_samples(200_000) as u32);
    assert_ne!(session.status(), Status::T0Expired);
    assert_ne!(session.status(), Status::T1Expired);
}

#[test]
fn terminate_mid_call_reports_call_dropped() {
    let mut session = T30Session::new(caller_config(), MockEnvironment::new());
    session.restart();
    session.terminate();
    assert_eq!(session.status(), Status::CallDropped);
    assert_eq!(session.phase(), Phase::CallFinished);
    assert_eq!(session.env().phase_e_status, Some(Status::CallDropped));
    assert_eq!(session.env().last_rx_type(), Some(ModemType::Done));
}

#[test]
fn terminate_after_clean_finish_keeps_status() {
    let env = MockEnvironment::transmitter(1, 100);
    let config = caller_config().with_ecm(false);
    let mut session = T30Session::new(config, env);
    caller_to_post_tcf(&mut session, &remote_dis(0x04, &[]));
    deliver_simple(&mut session, fcf::CFR);
    session.front_end_status(FrontEndEvent::SendStepComplete);
    session.front_end_status(FrontEndEvent::SendStepComplete);
    deliver_simple(&mut session, fcf::MCF);
    session.front_end_status(FrontEndEvent::SendStepComplete); // DCN out

    session.terminate();
    assert_eq!(session.status(), Status::Ok);
    assert_eq!(session.phase(), Phase::CallFinished);
}

#[test]
fn config_setters_rejected_mid_call() {
    let mut session = T30Session::new(caller_config(), MockEnvironment::new());
    assert!(session.set_local_ident("OK BEFORE").is_ok());
    session.restart();
    assert!(session.set_local_ident("NOT NOW").is_err());
    assert!(session.set_tx_document(false).is_err());
    session.terminate();
    assert!(session.set_tx_document(false).is_ok());
}

// =============================================================================
// Phase gating
// =============================================================================

#[test]
fn queued_phase_waits_for_carrier_drop() {
    let env = MockEnvironment::new();
    let mut session = T30Session::new(answerer_config(), env);

    let dcs = remote_dcs(0x04, &[]);
    answerer_to_tcf(&mut session, &dcs);
    feed_good_tcf(&mut session, 9_600);
    // Pretend the V.21 carrier is still up when the CFR finishes sending
    session.front_end_status(FrontEndEvent::SignalPresent);
    session.front_end_status(FrontEndEvent::SendStepComplete);
    assert_eq!(session.state(), State::FDocNonEcm);
    assert_ne!(session.phase(), Phase::CNonEcmRx);

    // The deferred phase installs only when the signal drops
    session.front_end_status(FrontEndEvent::SignalAbsent);
    assert_eq!(session.phase(), Phase::CNonEcmRx);
}

// =============================================================================
// Identification frames
// =============================================================================

#[test]
fn station_idents_travel_with_dis_and_dcs() {
    let env = MockEnvironment::new();
    let config = answerer_config().with_local_ident("+1 555 0100").unwrap();
    let mut session = T30Session::new(config, env);
    session.restart();
    session.front_end_status(FrontEndEvent::SendStepComplete); // CED done

    let csi = session.env().frames_with_fcf(fcf::CSI);
    assert_eq!(csi.len(), 1);
    assert_eq!(csi[0].len(), 23);
    // Reversed on the wire
    assert_eq!(csi[0][3], b'0');

    // A TSI from the far end is decoded and stored
    let mut tsi = [0u8; 23];
    crate::frames::encode_ident_frame(&mut tsi, fcf::TSI, b"REMOTE FAX");
    deliver(&mut session, &tsi);
    assert_eq!(session.far_ident().as_str(), "REMOTE FAX");
}

#[test]
fn subaddress_and_password_accompany_dcs() {
    let env = MockEnvironment::transmitter(1, 100);
    let config = caller_config()
        .with_ecm(false)
        .with_sub_address("12345").unwrap()
        .with_password("SECRET").unwrap();
    let mut session = T30Session::new(config, env);
    session.restart();
    session.hdlc_accept(HdlcEvent::Flags);

    // The answerer advertises subaddress and password capability
    deliver(
        &mut session,
        &remote_dis(0x04, &[bit::SUBADDRESSING, bit::PASSWORD]),
    );
    assert!(session.env().sent(fcf::SUB));
    assert!(session.env().sent(fcf::PWD));

    // Last frame of the burst is the DCS itself
    let last = session.env().last_frame().unwrap().clone();
    assert_eq!(last[2] & FCF_MASK, fcf::DCS);
}

// =============================================================================
// Internet-aware fax and polling
// =============================================================================

#[test]
fn iaf_no_tcf_skips_training_check() {
    use crate::session::config::IafMode;

    let env = MockEnvironment::transmitter(1, 512);
    let config = caller_config().with_iaf_mode(IafMode::NO_TCF);
    let mut session = T30Session::new(config, env);
    session.restart();
    session.hdlc_accept(HdlcEvent::Flags);
    deliver(&mut session, &remote_dis(0x2C, &[bit::ECM]));

    // DCS out, then straight to the image phase with no TCF
    session.front_end_status(FrontEndEvent::SendStepComplete);
    assert_eq!(session.state(), State::IV);
    assert!(fcd_count(session.env()) > 0);
}

#[test]
fn polling_sends_dtc_when_far_end_has_document() {
    let env = MockEnvironment::new();
    // A caller with nothing to send, collecting a poll
    let config = T30Config::new(true);
    let mut session = T30Session::new(config, env);
    session.restart();
    session.hdlc_accept(HdlcEvent::Flags);

    let mut dis = DisDtcFrame::new(fcf::DIS);
    dis.set_bit(bit::READY_TO_TRANSMIT);
    dis.set_rate_code(0x2C);
    dis.prune();
    deliver(&mut session, &dis.as_octets().to_vec());

    // We answer with a DTC and wait for the far end's DCS
    let dtc = session.env().frames_with_fcf(fcf::DIS);
    assert!(dtc.iter().any(|f| f[2] == fcf::DTC));
    assert_eq!(session.state(), State::R);
}

#[test]
fn polling_nothing_to_collect_is_tx_incapable() {
    let env = MockEnvironment::new();
    let config = T30Config::new(true);
    let mut session = T30Session::new(config, env);
    session.restart();
    session.hdlc_accept(HdlcEvent::Flags);

    // Far end can neither send nor expects a document from us
    deliver(&mut session, &remote_dis(0x2C, &[]));
    assert_eq!(session.status(), Status::TxIncapable);
    assert!(session.env().sent(fcf::DCN));
}

// =============================================================================
// End-to-end: two sessions, ECM, multiple pages
// =============================================================================

/// Move every queued frame and burst boundary from `from` into `to`,
/// special-casing the TCF which runs on the raw fast carrier.
fn pump_one_direction(from: &mut Session, to: &mut Session) -> bool {
    let frames: Vec<Vec<u8>> = from.env_mut().sent_frames.drain(..).collect();
    let bursts = from.env().burst_ends;
    from.env_mut().burst_ends = 0;

    let mut moved = false;
    for frame in &frames {
        moved = true;
        to.hdlc_accept(HdlcEvent::Frame { data: frame, crc_ok: true });
    }
    for _ in 0..bursts {
        moved = true;
        from.front_end_status(FrontEndEvent::SendStepComplete);
    }
    if from.state() == State::DTcf {
        moved = true;
        loop {
            let bit = from.non_ecm_get_bit();
            if bit == SIG_STATUS_END_OF_DATA {
                break;
            }
            to.non_ecm_put_bit(bit);
        }
        to.non_ecm_put_bit(SIG_STATUS_CARRIER_DOWN);
        from.front_end_status(FrontEndEvent::SendStepComplete);
    }
    moved
}

#[test]
fn ecm_end_to_end_two_pages() {
    let caller_env = MockEnvironment::transmitter(2, 700);
    let caller_cfg = T30Config::new(true)
        .with_tx_document(true)
        .with_local_ident("CALLER").unwrap();
    let mut caller = T30Session::new(caller_cfg, caller_env);

    let answerer_env = MockEnvironment::new();
    let answerer_cfg = T30Config::new(false).with_local_ident("ANSWERER").unwrap();
    let mut answerer = T30Session::new(answerer_cfg, answerer_env);

    caller.restart();
    answerer.restart();
    answerer.front_end_status(FrontEndEvent::SendStepComplete); // CED done
    caller.hdlc_accept(HdlcEvent::Flags);

    for _ in 0..400 {
        let a = pump_one_direction(&mut answerer, &mut caller);
        let b = pump_one_direction(&mut caller, &mut answerer);
        if !a && !b {
            break;
        }
    }

    assert_eq!(caller.phase(), Phase::E);
    assert_eq!(caller.status(), Status::Ok);
    assert_eq!(answerer.status(), Status::Ok);
    assert_eq!(caller.tx_page_count(), 2);
    assert_eq!(answerer.rx_page_count(), 2);
    assert_eq!(answerer.far_ident().as_str(), "CALLER");
    assert_eq!(caller.far_ident().as_str(), "ANSWERER");
    // Everything the encoder produced reached the decoder
    let delivered: usize = answerer.env().rx_chunks.iter().map(Vec::len).sum();
    assert_eq!(delivered, 2 * 700);
}
