use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod demo;
pub mod dump;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a scripted multiplexer scenario and print the traffic.
    Demo(DemoArgs),
    /// Build a sample topology and print the debug snapshot.
    Dump(DumpArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Demo(args) => demo::run(args, format),
        Command::Dump(args) => dump::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Protocol number to bind (decimal or 0x-hex; the 0x800 IP alias
    /// is accepted).
    #[arg(long, default_value = "0x21", value_parser = parse_sap)]
    pub sap: u16,
    /// Data frames to push through each phase.
    #[arg(long, default_value = "4")]
    pub frames: u32,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Links in the sample topology.
    #[arg(long, default_value = "2")]
    pub links: u32,
    /// Network-protocol sessions attached to each link.
    #[arg(long, default_value = "2")]
    pub sessions: u32,
}

#[derive(Args, Debug, Default)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_sap(input: &str) -> Result<u16, String> {
    let trimmed = input.trim();
    let parsed = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16)
    } else {
        trimmed.parse()
    };
    parsed.map_err(|_| format!("invalid protocol number: {input}"))
}
