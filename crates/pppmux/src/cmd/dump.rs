use bytes::Bytes;
use pppmux_core::{ForwardMode, Mux};

use crate::cmd::DumpArgs;
use crate::exit::{mux_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{self, OutputFormat};

// Valid network-layer protocol numbers (odd low byte, even high byte).
const SAMPLE_SAPS: [u16; 5] = [0x21, 0x2b, 0x23, 0x25, 0x29];

pub fn run(args: DumpArgs, format: OutputFormat) -> CliResult<i32> {
    if args.links == 0 {
        return Err(CliError::new(USAGE, "at least one link is required"));
    }

    let mux = Mux::new();
    for link_index in 0..args.links {
        let control = mux.open_session(true);
        let link = mux
            .create_link(control)
            .map_err(|e| mux_error("create link", e))?;

        for i in 0..args.sessions {
            let session = mux.open_session(false);
            mux.attach(session, link)
                .map_err(|e| mux_error("attach", e))?;
            let Some(&sap) = SAMPLE_SAPS.get(i as usize) else {
                continue;
            };
            mux.bind(session, sap).map_err(|e| mux_error("bind", e))?;

            // Park some traffic on the first binding so the snapshot
            // has queue depth to show.
            if link_index == 0 && i == 0 {
                mux.set_forward_mode(link, sap, ForwardMode::Queue)
                    .map_err(|e| mux_error("set forward mode", e))?;
                for n in 0..2 {
                    mux.submit(session, Bytes::from(format!("held-{n}")))
                        .map_err(|e| mux_error("submit", e))?;
                }
            }
        }
    }

    output::print_snapshot(&mux.debug_dump(), format);
    Ok(SUCCESS)
}
