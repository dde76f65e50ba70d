//! Scripted three-phase scenario: loopback without a lower endpoint,
//! outbound through a wired sink, and an inbound frame from the peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use pppmux_core::{Delivery, ForwardMode, LowerSink, Mux};
use pppmux_frame::{encode_header, LinkFrame};
use tracing::info;

use crate::cmd::DemoArgs;
use crate::exit::{mux_error, CliResult, SUCCESS};
use crate::output::{self, OutputFormat};

/// In-process lower endpoint that records everything sent to it.
struct CapturingSink {
    ready: AtomicBool,
    frames: Mutex<Vec<LinkFrame>>,
}

impl CapturingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(true),
            frames: Mutex::new(Vec::new()),
        })
    }
}

impl LowerSink for CapturingSink {
    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn send(&self, frame: LinkFrame) {
        self.frames.lock().expect("sink lock").push(frame);
    }
}

pub fn run(args: DemoArgs, format: OutputFormat) -> CliResult<i32> {
    let mux = Mux::new();
    let operator = mux.open_session(true);
    let link = mux
        .create_link(operator)
        .map_err(|e| mux_error("create link", e))?;

    let session = mux.open_session(false);
    mux.attach(session, link)
        .map_err(|e| mux_error("attach", e))?;
    let bound = mux
        .bind(session, args.sap)
        .map_err(|e| mux_error("bind", e))?;
    mux.set_forward_mode(link, bound.raw(), ForwardMode::Pass)
        .map_err(|e| mux_error("set forward mode", e))?;

    info!(link = link.raw(), sap = %bound, "demo topology ready");

    // Phase 1: no lower endpoint, so frames loop to the control session.
    for i in 0..args.frames {
        mux.submit(session, Bytes::from(format!("loopback-{i}")))
            .map_err(|e| mux_error("submit", e))?;
    }
    while let Some(delivery) = mux.recv(operator) {
        output::print_delivery("control", &delivery, format);
    }

    // Phase 2: wire a sink beneath the link and push the same traffic.
    let sink = CapturingSink::new();
    mux.attach_lower(link, sink.clone())
        .map_err(|e| mux_error("attach lower", e))?;
    for i in 0..args.frames {
        mux.submit(session, Bytes::from(format!("downstream-{i}")))
            .map_err(|e| mux_error("submit", e))?;
    }
    for frame in sink.frames.lock().expect("sink lock").drain(..) {
        if let LinkFrame::Data(bytes) = frame {
            output::print_delivery("lower", &Delivery::Data(bytes), format);
        }
    }

    // Phase 3: a frame arrives from the peer for the bound protocol.
    mux.receive(link, LinkFrame::Data(encode_header(bound, b"from-peer")));
    while let Some(delivery) = mux.recv(session) {
        output::print_delivery("session", &delivery, format);
    }

    let stats = mux
        .query_statistics(link)
        .map_err(|e| mux_error("query statistics", e))?;
    output::print_stats(link, &stats, format);

    Ok(SUCCESS)
}
