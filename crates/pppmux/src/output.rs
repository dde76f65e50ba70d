use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pppmux_core::{Delivery, LinkId, LinkStats, MuxSnapshot};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct DeliveryOutput<'a> {
    receiver: &'a str,
    kind: &'static str,
    request_id: Option<u32>,
    size: usize,
    payload: String,
}

pub fn print_delivery(receiver: &str, delivery: &Delivery, format: OutputFormat) {
    let (kind, request_id, bytes): (&'static str, Option<u32>, &[u8]) = match delivery {
        Delivery::Data(b) => ("data", None, b.as_ref()),
        Delivery::ControlReply { id, payload } => ("control_reply", Some(*id), payload.as_ref()),
        Delivery::EndOfData => ("end_of_data", None, &[]),
    };

    match format {
        OutputFormat::Json => {
            let out = DeliveryOutput {
                receiver,
                kind,
                request_id,
                size: bytes.len(),
                payload: payload_preview(bytes),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["RECEIVER", "KIND", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    receiver.to_string(),
                    kind.to_string(),
                    bytes.len().to_string(),
                    payload_preview(bytes),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "receiver={receiver} kind={kind} size={} payload={}",
                bytes.len(),
                payload_preview(bytes)
            );
        }
        OutputFormat::Raw => {
            print_raw(bytes);
        }
    }
}

pub fn print_stats(link: LinkId, stats: &LinkStats, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(stats).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "LINK", "IN PKTS", "IN BYTES", "IN ERRS", "OUT PKTS", "OUT BYTES", "OUT ERRS",
                ])
                .add_row(vec![
                    link.raw().to_string(),
                    stats.in_packets.to_string(),
                    stats.in_bytes.to_string(),
                    stats.in_errors.to_string(),
                    stats.out_packets.to_string(),
                    stats.out_bytes.to_string(),
                    stats.out_errors.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "link={} in={}p/{}b ({} err) out={}p/{}b ({} err)",
                link.raw(),
                stats.in_packets,
                stats.in_bytes,
                stats.in_errors,
                stats.out_packets,
                stats.out_bytes,
                stats.out_errors
            );
        }
    }
}

pub fn print_snapshot(snapshot: &MuxSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(snapshot).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut sessions = Table::new();
            sessions
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "SESSION", "ROLE", "STATE", "LINK", "SAP", "MODE", "FLAGS", "OUT Q", "IN Q",
                ]);
            for s in &snapshot.sessions {
                sessions.add_row(vec![
                    s.id.to_string(),
                    lower_debug(&s.role),
                    lower_debug(&s.state),
                    s.link.map_or_else(|| "-".to_string(), |l| l.to_string()),
                    s.protocol_id
                        .map_or_else(|| "-".to_string(), |p| format!("{p:#06x}")),
                    lower_debug(&s.mode),
                    session_flags(s.privileged, s.terminal, s.blocked, s.debug_log),
                    s.outbound_depth.to_string(),
                    s.inbound_depth.to_string(),
                ]);
            }
            println!("{sessions}");

            let mut links = Table::new();
            links
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "LINK", "CONTROL", "SESSIONS", "MTU", "MRU", "LOWER", "STAGED", "IN PKTS",
                    "OUT PKTS", "ERRS",
                ]);
            for l in &snapshot.links {
                links.add_row(vec![
                    l.id.to_string(),
                    l.control.to_string(),
                    l.sessions.len().to_string(),
                    l.mtu.to_string(),
                    l.mru.to_string(),
                    if l.lower_attached { "yes" } else { "no" }.to_string(),
                    l.staging_depth.to_string(),
                    l.stats.in_packets.to_string(),
                    l.stats.out_packets.to_string(),
                    (l.stats.in_errors + l.stats.out_errors).to_string(),
                ]);
            }
            println!("{links}");
        }
        OutputFormat::Pretty => {
            for s in &snapshot.sessions {
                println!(
                    "session {} role={} state={} link={} sap={} mode={} outq={} inq={}",
                    s.id,
                    lower_debug(&s.role),
                    lower_debug(&s.state),
                    s.link.map_or_else(|| "-".to_string(), |l| l.to_string()),
                    s.protocol_id
                        .map_or_else(|| "-".to_string(), |p| format!("{p:#06x}")),
                    lower_debug(&s.mode),
                    s.outbound_depth,
                    s.inbound_depth
                );
            }
            for l in &snapshot.links {
                println!(
                    "link {} control={} sessions={} mtu={} mru={} lower={} staged={}",
                    l.id,
                    l.control,
                    l.sessions.len(),
                    l.mtu,
                    l.mru,
                    l.lower_attached,
                    l.staging_depth
                );
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    use std::io::Write;
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn lower_debug(value: &impl std::fmt::Debug) -> String {
    format!("{value:?}").to_lowercase()
}

fn session_flags(privileged: bool, terminal: bool, blocked: bool, debug_log: bool) -> String {
    let mut flags = String::new();
    for (set, c) in [
        (privileged, 'p'),
        (terminal, 't'),
        (blocked, 'b'),
        (debug_log, 'd'),
    ] {
        if set {
            flags.push(c);
        }
    }
    if flags.is_empty() {
        flags.push('-');
    }
    flags
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
