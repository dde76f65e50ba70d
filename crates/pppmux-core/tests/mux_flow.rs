//! End-to-end multiplexer scenarios over the public API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use pppmux_core::{
    BindingState, Delivery, ForwardMode, LinkId, LowerSink, Mux, MuxConfig, MuxError, RequestKind,
    ServicePrimitive, SessionId, SubmitOutcome,
};
use pppmux_frame::{protocol_of, LinkFrame, ProtocolId, StatusKind, PPP_HDRLEN};

/// A scriptable lower endpoint: capture everything, toggle readiness.
#[derive(Default)]
struct TestSink {
    ready: AtomicBool,
    sent: Mutex<Vec<LinkFrame>>,
}

impl TestSink {
    fn new(ready: bool) -> Arc<Self> {
        let sink = Arc::new(Self::default());
        sink.ready.store(ready, Ordering::SeqCst);
        sink
    }

    fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    fn data_payloads(&self) -> Vec<Bytes> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|f| match f {
                LinkFrame::Data(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    fn sent_len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl LowerSink for TestSink {
    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn send(&self, frame: LinkFrame) {
        self.sent.lock().unwrap().push(frame);
    }
}

fn mux_with_link() -> (Mux, SessionId, LinkId) {
    let mux = Mux::new();
    let control = mux.open_session(true);
    let link = mux.create_link(control).unwrap();
    (mux, control, link)
}

fn attached_session(mux: &Mux, link: LinkId) -> SessionId {
    let s = mux.open_session(false);
    mux.attach(s, link).unwrap();
    s
}

fn bound_session(mux: &Mux, link: LinkId, sap: u16) -> SessionId {
    let s = attached_session(mux, link);
    mux.bind(s, sap).unwrap();
    s
}

fn session_state(mux: &Mux, id: SessionId) -> BindingState {
    mux.debug_dump()
        .sessions
        .into_iter()
        .find(|s| s.id == id.raw())
        .unwrap()
        .state
}

#[test]
fn first_link_is_zero_and_ids_are_reused() {
    let mux = Mux::new();
    let c0 = mux.open_session(true);
    let c1 = mux.open_session(true);
    assert_eq!(mux.create_link(c0).unwrap().raw(), 0);
    assert_eq!(mux.create_link(c1).unwrap().raw(), 1);

    // closing the first control session removes link 0; the id comes back
    mux.close_session(c0);
    let c2 = mux.open_session(true);
    assert_eq!(mux.create_link(c2).unwrap().raw(), 0);
}

#[test]
fn create_link_requires_privilege() {
    let mux = Mux::new();
    let s = mux.open_session(false);
    assert_eq!(mux.create_link(s), Err(MuxError::PrivilegeDenied));
}

#[test]
fn create_link_rejects_bound_sessions() {
    let (mux, control, link) = mux_with_link();
    // the control session already anchors a link
    assert_eq!(mux.create_link(control), Err(MuxError::AlreadyBound));

    // an attached session is bound elsewhere too
    let s = mux.open_session(true);
    mux.attach(s, link).unwrap();
    assert_eq!(mux.create_link(s), Err(MuxError::AlreadyBound));
}

#[test]
fn state_machine_only_walks_the_legal_path() {
    let (mux, _control, link) = mux_with_link();
    let s = mux.open_session(false);

    // wrong-state attempts fail and leave state unchanged
    assert_eq!(mux.bind(s, 0x21), Err(MuxError::OutOfState));
    assert_eq!(mux.detach(s), Err(MuxError::OutOfState));
    assert_eq!(mux.unbind(s), Err(MuxError::OutOfState));
    assert_eq!(session_state(&mux, s), BindingState::Unattached);

    mux.attach(s, link).unwrap();
    assert_eq!(session_state(&mux, s), BindingState::Unbound);
    assert_eq!(mux.attach(s, link), Err(MuxError::OutOfState));
    assert_eq!(mux.unbind(s), Err(MuxError::OutOfState));

    mux.bind(s, 0x21).unwrap();
    assert_eq!(session_state(&mux, s), BindingState::Idle);
    assert_eq!(mux.bind(s, 0x2b), Err(MuxError::OutOfState));
    assert_eq!(mux.detach(s), Err(MuxError::OutOfState));

    mux.unbind(s).unwrap();
    assert_eq!(session_state(&mux, s), BindingState::Unbound);
    mux.detach(s).unwrap();
    assert_eq!(session_state(&mux, s), BindingState::Unattached);
}

#[test]
fn attach_to_missing_link_fails() {
    let mux = Mux::new();
    let s = mux.open_session(false);
    assert_eq!(mux.attach(s, LinkId::from_raw(7)), Err(MuxError::NoSuchLink));
    assert_eq!(session_state(&mux, s), BindingState::Unattached);
}

#[test]
fn sap_collision_and_rebind_after_unbind() {
    let (mux, _control, link) = mux_with_link();
    let a = attached_session(&mux, link);
    let b = attached_session(&mux, link);

    assert_eq!(mux.bind(a, 0x21).unwrap().raw(), 0x21);
    assert_eq!(mux.bind(b, 0x21), Err(MuxError::AddressInUse(0x21)));

    mux.unbind(a).unwrap();
    assert_eq!(mux.bind(b, 0x21).unwrap().raw(), 0x21);
}

#[test]
fn ethertype_alias_normalizes_and_collides() {
    let (mux, _control, link) = mux_with_link();
    let a = attached_session(&mux, link);
    let b = attached_session(&mux, link);

    // 0x800 binds the canonical PPP id
    assert_eq!(mux.bind(a, 0x800).unwrap().raw(), 0x21);
    // ... and occupies it for everyone else
    assert_eq!(mux.bind(b, 0x21), Err(MuxError::AddressInUse(0x21)));

    let dump = mux.debug_dump();
    let snap = dump.sessions.iter().find(|s| s.id == a.raw()).unwrap();
    assert_eq!(snap.requested_sap, Some(0x800));
    assert_eq!(snap.protocol_id, Some(0x21));
}

#[test]
fn unbind_clears_both_sap_records() {
    let (mux, _control, link) = mux_with_link();
    let s = attached_session(&mux, link);
    mux.bind(s, 0x800).unwrap();
    mux.unbind(s).unwrap();

    let dump = mux.debug_dump();
    let snap = dump.sessions.iter().find(|x| x.id == s.raw()).unwrap();
    assert_eq!(snap.protocol_id, None);
    assert_eq!(snap.requested_sap, None);
}

#[test]
fn invalid_saps_are_rejected() {
    let (mux, _control, link) = mux_with_link();
    let s = attached_session(&mux, link);

    for bad in [0u16, 0x1f, 0x22, 0x121, 0x4001, 0x8021, 0xc021] {
        assert_eq!(mux.bind(s, bad), Err(MuxError::InvalidAddress(bad)));
        assert_eq!(session_state(&mux, s), BindingState::Unbound);
    }
}

#[test]
fn frames_stay_in_order_under_backpressure() {
    let (mux, _control, link) = mux_with_link();
    let sink = TestSink::new(true);
    mux.attach_lower(link, sink.clone()).unwrap();

    let s = bound_session(&mux, link, 0x21);
    mux.set_forward_mode(link, 0x21, ForwardMode::Pass).unwrap();

    const FRAMES: u32 = 1200;
    let mut ready = true;
    for i in 0..FRAMES {
        let outcome = mux
            .submit(s, Bytes::copy_from_slice(&i.to_be_bytes()))
            .unwrap();
        if ready {
            assert_eq!(outcome, SubmitOutcome::Sent);
        } else {
            assert_eq!(outcome, SubmitOutcome::Queued);
        }
        // toggle the sink on a ragged cadence
        if i % 7 == 3 {
            ready = !ready;
            sink.set_ready(ready);
            if ready {
                mux.lower_ready(link);
            }
        }
    }
    sink.set_ready(true);
    mux.lower_ready(link);

    let payloads = sink.data_payloads();
    assert_eq!(payloads.len(), FRAMES as usize);
    for (i, frame) in payloads.iter().enumerate() {
        assert_eq!(protocol_of(frame).unwrap(), ProtocolId::new(0x21));
        let tag = u32::from_be_bytes(frame[PPP_HDRLEN..].try_into().unwrap());
        assert_eq!(tag, i as u32, "frame {i} out of order");
    }
}

#[test]
fn lower_less_link_loops_control_frames_back() {
    let (mux, control, _link) = mux_with_link();

    let frame = pppmux_frame::encode_header(ProtocolId::new(0xc021), b"lcp-configure");
    assert_eq!(mux.submit(control, frame.clone()).unwrap(), SubmitOutcome::Sent);

    match mux.recv(control) {
        Some(Delivery::Data(b)) => assert_eq!(b, frame),
        other => panic!("expected loopback data, got {other:?}"),
    }
}

#[test]
fn lower_less_link_loops_network_frames_to_control() {
    let (mux, control, link) = mux_with_link();
    let s = bound_session(&mux, link, 0x21);
    mux.set_forward_mode(link, 0x21, ForwardMode::Pass).unwrap();

    assert_eq!(
        mux.submit(s, Bytes::from_static(b"ip-packet")).unwrap(),
        SubmitOutcome::Sent
    );

    match mux.recv(control) {
        Some(Delivery::Data(b)) => {
            assert_eq!(protocol_of(&b).unwrap().raw(), 0x21);
            assert_eq!(&b[PPP_HDRLEN..], b"ip-packet");
        }
        other => panic!("expected looped frame, got {other:?}"),
    }
}

#[test]
fn loopback_blocks_and_resumes_when_control_drains() {
    let mux = Mux::with_config(MuxConfig {
        inbound_queue_depth: 2,
        staging_queue_depth: 8,
    });
    let control = mux.open_session(true);
    let link = mux.create_link(control).unwrap();
    let s = bound_session(&mux, link, 0x21);
    mux.set_forward_mode(link, 0x21, ForwardMode::Pass).unwrap();

    assert_eq!(mux.submit(s, Bytes::from_static(b"a")).unwrap(), SubmitOutcome::Sent);
    assert_eq!(mux.submit(s, Bytes::from_static(b"b")).unwrap(), SubmitOutcome::Sent);
    // control inbound is full now
    assert_eq!(mux.submit(s, Bytes::from_static(b"c")).unwrap(), SubmitOutcome::Queued);

    // draining the control session re-enables the blocked sender
    assert!(matches!(mux.recv(control), Some(Delivery::Data(_))));
    assert!(matches!(mux.recv(control), Some(Delivery::Data(_))));
    match mux.recv(control) {
        Some(Delivery::Data(b)) => assert_eq!(&b[PPP_HDRLEN..], b"c"),
        other => panic!("expected queued frame to arrive, got {other:?}"),
    }
}

#[test]
fn drop_mode_flush_counts_errors_not_packets() {
    let (mux, _control, link) = mux_with_link();
    let s = bound_session(&mux, link, 0x21);
    mux.set_forward_mode(link, 0x21, ForwardMode::Queue).unwrap();

    for _ in 0..3 {
        assert_eq!(
            mux.submit(s, Bytes::from_static(b"queued")).unwrap(),
            SubmitOutcome::Queued
        );
    }

    mux.set_forward_mode(link, 0x21, ForwardMode::Drop).unwrap();

    let stats = mux.query_statistics(link).unwrap();
    assert_eq!(stats.out_errors, 3);
    assert_eq!(stats.out_packets, 0);

    // and subsequent submissions drop on arrival
    assert_eq!(
        mux.submit(s, Bytes::from_static(b"late")).unwrap(),
        SubmitOutcome::Dropped
    );
    assert_eq!(mux.query_statistics(link).unwrap().out_errors, 4);
}

#[test]
fn queue_mode_holds_until_pass_retries() {
    let (mux, _control, link) = mux_with_link();
    let sink = TestSink::new(true);
    mux.attach_lower(link, sink.clone()).unwrap();

    let s = bound_session(&mux, link, 0x21);
    mux.set_forward_mode(link, 0x21, ForwardMode::Queue).unwrap();

    mux.submit(s, Bytes::from_static(b"one")).unwrap();
    mux.submit(s, Bytes::from_static(b"two")).unwrap();
    assert_eq!(sink.sent_len(), 0);

    mux.set_forward_mode(link, 0x21, ForwardMode::Pass).unwrap();
    let payloads = sink.data_payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(&payloads[0][PPP_HDRLEN..], b"one");
    assert_eq!(&payloads[1][PPP_HDRLEN..], b"two");
}

#[test]
fn detach_then_attach_looks_fresh() {
    let (mux, _control, link) = mux_with_link();
    let s = bound_session(&mux, link, 0x21);
    mux.set_forward_mode(link, 0x21, ForwardMode::Queue).unwrap();
    mux.submit(s, Bytes::from_static(b"stale")).unwrap();

    mux.unbind(s).unwrap();
    mux.detach(s).unwrap();
    mux.attach(s, link).unwrap();

    let dump = mux.debug_dump();
    let snap = dump.sessions.iter().find(|x| x.id == s.raw()).unwrap();
    assert_eq!(snap.state, BindingState::Unbound);
    assert_eq!(snap.protocol_id, None);
    assert_eq!(snap.requested_sap, None);
    assert_eq!(snap.mode, ForwardMode::Drop);
    assert_eq!(snap.outbound_depth, 0);
    assert!(!snap.blocked);
}

#[test]
fn inbound_routes_by_protocol_number() {
    let (mux, control, link) = mux_with_link();
    let sink = TestSink::new(true);
    mux.attach_lower(link, sink).unwrap();
    let s = bound_session(&mux, link, 0x21);

    // bound network protocol: payload arrives with the header stripped
    let ip = pppmux_frame::encode_header(ProtocolId::new(0x21), b"to-ip");
    mux.receive(link, LinkFrame::Data(ip));
    match mux.recv(s) {
        Some(Delivery::Data(b)) => assert_eq!(b, Bytes::from_static(b"to-ip")),
        other => panic!("expected ip payload, got {other:?}"),
    }

    // control-space protocol: whole frame to the control session
    let lcp = pppmux_frame::encode_header(ProtocolId::new(0xc021), b"lcp");
    mux.receive(link, LinkFrame::Data(lcp.clone()));
    match mux.recv(control) {
        Some(Delivery::Data(b)) => assert_eq!(b, lcp),
        other => panic!("expected lcp frame, got {other:?}"),
    }

    // unbound network protocol: also to the control session
    let ipx = pppmux_frame::encode_header(ProtocolId::new(0x2b), b"ipx");
    mux.receive(link, LinkFrame::Data(ipx.clone()));
    match mux.recv(control) {
        Some(Delivery::Data(b)) => assert_eq!(b, ipx),
        other => panic!("expected unmatched frame at control, got {other:?}"),
    }

    let stats = mux.query_statistics(link).unwrap();
    assert_eq!(stats.in_packets, 3);
}

#[test]
fn staging_preserves_inbound_order_for_slow_receiver() {
    let mux = Mux::with_config(MuxConfig {
        inbound_queue_depth: 2,
        staging_queue_depth: 3,
    });
    let control = mux.open_session(true);
    let link = mux.create_link(control).unwrap();
    let s = bound_session(&mux, link, 0x21);
    mux.set_forward_mode(link, 0x21, ForwardMode::Pass).unwrap();

    for i in 0u8..5 {
        let frame = pppmux_frame::encode_header(ProtocolId::new(0x21), &[i]);
        mux.receive(link, LinkFrame::Data(frame));
    }

    // two delivered, three staged; staging is at capacity
    assert!(!mux.link_can_accept(link));

    // drain one at a time; order must hold across the staged boundary
    for expected in 0u8..5 {
        match mux.recv(s) {
            Some(Delivery::Data(b)) => assert_eq!(b.as_ref(), &[expected]),
            other => panic!("expected byte {expected}, got {other:?}"),
        }
    }
    assert!(mux.link_can_accept(link));
    assert!(mux.recv(s).is_none());
}

#[test]
fn hangup_becomes_end_of_data_for_control() {
    let (mux, control, link) = mux_with_link();
    mux.receive(link, LinkFrame::TerminationSignal);

    match mux.recv(control) {
        Some(Delivery::EndOfData) => {}
        other => panic!("expected end-of-data, got {other:?}"),
    }
}

#[test]
fn control_replies_route_to_requester() {
    let (mux, _control, link) = mux_with_link();
    let sink = TestSink::new(true);
    mux.attach_lower(link, sink.clone()).unwrap();

    let s = mux.open_session(true);
    mux.attach(s, link).unwrap();

    mux.submit_control(s, 42, Bytes::from_static(b"getstat"), RequestKind::Statistics)
        .unwrap();
    assert_eq!(sink.sent_len(), 1);

    // a second request before the reply holds no reservation
    assert_eq!(
        mux.submit_control(s, 43, Bytes::new(), RequestKind::Statistics),
        Err(MuxError::ResourceExhausted)
    );

    // unmatched replies are discarded
    mux.receive(
        link,
        LinkFrame::ControlReply {
            id: 99,
            payload: Bytes::new(),
        },
    );
    assert!(mux.recv(s).is_none());

    mux.receive(
        link,
        LinkFrame::ControlReply {
            id: 42,
            payload: Bytes::from_static(b"stats"),
        },
    );
    match mux.recv(s) {
        Some(Delivery::ControlReply { id, payload }) => {
            assert_eq!(id, 42);
            assert_eq!(payload, Bytes::from_static(b"stats"));
        }
        other => panic!("expected matched reply, got {other:?}"),
    }

    // the reservation is released once the reply lands
    mux.submit_control(s, 44, Bytes::new(), RequestKind::Statistics)
        .unwrap();
}

#[test]
fn control_requests_enforce_privilege_and_terminal() {
    let (mux, _control, link) = mux_with_link();
    let sink = TestSink::new(true);
    mux.attach_lower(link, sink).unwrap();

    let plain = mux.open_session(false);
    mux.attach(plain, link).unwrap();
    assert_eq!(
        mux.submit_control(plain, 1, Bytes::new(), RequestKind::Generic),
        Err(MuxError::PrivilegeDenied)
    );
    // statistics queries are open to everyone
    mux.submit_control(plain, 2, Bytes::new(), RequestKind::Statistics)
        .unwrap();

    let last = mux.open_session(true);
    mux.attach(last, link).unwrap();
    mux.mark_terminal(last).unwrap();
    assert!(matches!(
        mux.submit_control(last, 3, Bytes::new(), RequestKind::Statistics),
        Err(MuxError::InvalidArgument(_))
    ));
}

#[test]
fn status_signals_update_error_counters() {
    let (mux, _control, link) = mux_with_link();
    mux.receive(link, LinkFrame::StatusSignal(StatusKind::InboundError));
    mux.receive(link, LinkFrame::StatusSignal(StatusKind::InboundError));
    mux.receive(link, LinkFrame::StatusSignal(StatusKind::OutboundError));

    let stats = mux.query_statistics(link).unwrap();
    assert_eq!(stats.in_errors, 2);
    assert_eq!(stats.out_errors, 1);
    assert_eq!(stats.in_packets, 0);
}

#[test]
fn idle_time_tracks_directions_independently() {
    let (mux, control, link) = mux_with_link();
    std::thread::sleep(std::time::Duration::from_millis(30));

    let frame = pppmux_frame::encode_header(ProtocolId::new(0xc021), b"x");
    mux.submit(control, frame).unwrap();

    let idle = mux.query_idle_time(link).unwrap();
    assert!(idle.tx_idle < idle.rx_idle);
    assert!(idle.rx_idle >= std::time::Duration::from_millis(30));
}

#[test]
fn mtu_and_mru_clamp_into_range() {
    let (mux, _control, link) = mux_with_link();

    assert_eq!(mux.set_mtu(link, 0), Err(MuxError::InvalidArgument("frame size out of range")));
    assert_eq!(mux.set_mtu(link, 70000), Err(MuxError::InvalidArgument("frame size out of range")));
    assert_eq!(mux.set_mtu(link, 576).unwrap(), 1500);
    assert_eq!(mux.set_mtu(link, 9000).unwrap(), 9000);
    assert_eq!(mux.set_mru(link, 296).unwrap(), 1500);

    let dump = mux.debug_dump();
    let snap = dump.links.iter().find(|l| l.id == link.raw()).unwrap();
    assert_eq!(snap.mtu, 9000);
    assert_eq!(snap.mru, 1500);
}

#[test]
fn oversize_outbound_frames_are_dropped_and_counted() {
    let (mux, _control, link) = mux_with_link();
    let sink = TestSink::new(true);
    mux.attach_lower(link, sink.clone()).unwrap();
    let s = bound_session(&mux, link, 0x21);
    mux.set_forward_mode(link, 0x21, ForwardMode::Pass).unwrap();

    let oversize = Bytes::from(vec![0u8; 1501]);
    assert_eq!(mux.submit(s, oversize).unwrap(), SubmitOutcome::Dropped);
    assert_eq!(sink.sent_len(), 0);
    assert_eq!(mux.query_statistics(link).unwrap().out_errors, 1);
}

#[test]
fn set_forward_mode_needs_a_binding() {
    let (mux, _control, link) = mux_with_link();
    assert_eq!(
        mux.set_forward_mode(link, 0x21, ForwardMode::Pass),
        Err(MuxError::NoSuchBinding(0x21))
    );
    assert_eq!(
        mux.set_forward_mode(LinkId::from_raw(9), 0x21, ForwardMode::Pass),
        Err(MuxError::NoSuchLink)
    );
}

#[test]
fn closing_control_session_tears_the_link_down() {
    let (mux, control, link) = mux_with_link();
    let s = bound_session(&mux, link, 0x21);

    mux.close_session(control);

    assert_eq!(mux.query_statistics(link), Err(MuxError::NoSuchLink));
    assert_eq!(session_state(&mux, s), BindingState::Unattached);

    // frames in flight toward the removed link vanish without a panic
    mux.receive(link, LinkFrame::Data(Bytes::from_static(b"\xff\x03\x00\x21x")));
    assert!(mux.recv(s).is_none());
}

#[test]
fn debug_dump_serializes_to_json() {
    let (mux, control, link) = mux_with_link();
    bound_session(&mux, link, 0x21);

    let json = serde_json::to_value(mux.debug_dump()).unwrap();
    assert_eq!(json["sessions"].as_array().unwrap().len(), 2);
    assert_eq!(json["links"][0]["mtu"], 1500);
    assert_eq!(json["links"][0]["control"], control.raw());
    assert_eq!(json["sessions"][0]["role"], "control");
    assert_eq!(json["sessions"][1]["state"], "idle");
    assert_eq!(json["sessions"][1]["protocol_id"], 0x21);
}

#[test]
fn connection_oriented_primitives_are_unsupported() {
    let (mux, control, _link) = mux_with_link();
    for primitive in [
        ServicePrimitive::Connect,
        ServicePrimitive::Disconnect,
        ServicePrimitive::Reset,
        ServicePrimitive::EnableMulticast,
        ServicePrimitive::DisableMulticast,
        ServicePrimitive::PromiscuousOn,
        ServicePrimitive::PromiscuousOff,
        ServicePrimitive::NegotiateQos,
    ] {
        assert_eq!(mux.service_request(control, primitive), Err(MuxError::Unsupported));
    }
}

#[test]
fn attach_lower_is_exclusive() {
    let (mux, _control, link) = mux_with_link();
    mux.attach_lower(link, TestSink::new(true)).unwrap();
    assert_eq!(
        mux.attach_lower(link, TestSink::new(true)),
        Err(MuxError::AlreadyBound)
    );

    mux.detach_lower(link).unwrap();
    mux.attach_lower(link, TestSink::new(true)).unwrap();
}

#[test]
fn blocked_frames_flow_after_lower_attach() {
    let (mux, control, link) = mux_with_link();
    let s = bound_session(&mux, link, 0x21);
    mux.set_forward_mode(link, 0x21, ForwardMode::Pass).unwrap();

    // loop to control until its queue is gone, then wire a real sink
    mux.submit(s, Bytes::from_static(b"looped")).unwrap();
    assert!(matches!(mux.recv(control), Some(Delivery::Data(_))));

    let sink = TestSink::new(true);
    mux.attach_lower(link, sink.clone()).unwrap();
    mux.submit(s, Bytes::from_static(b"wired")).unwrap();

    let payloads = sink.data_payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(&payloads[0][PPP_HDRLEN..], b"wired");
}
