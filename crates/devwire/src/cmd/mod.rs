use clap::{Args, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use devwire_frame::Format;
use devwire_transport::UnixSocketProvider;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod convert;
pub mod debug;
pub mod send;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Re-encode a property-list file, or print it.
    Convert(ConvertArgs),
    /// Send one dictionary to a device service.
    Send(SendArgs),
    /// Stream messages from a device service until the operation completes.
    Watch(WatchArgs),
    /// Launch a process under the device debug server and relay its output.
    Debug(DebugArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub service_root: PathBuf,
    pub format: OutputFormat,
}

impl Context {
    pub fn provider(&self) -> UnixSocketProvider {
        UnixSocketProvider::new(&self.service_root)
    }
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Convert(args) => convert::run(args, ctx.format),
        Command::Send(args) => send::run(args, ctx),
        Command::Watch(args) => watch::run(args, ctx),
        Command::Debug(args) => debug::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

/// Property-list wire format selector.
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum PlistFormat {
    #[default]
    Xml,
    Binary,
}

impl From<PlistFormat> for Format {
    fn from(format: PlistFormat) -> Self {
        match format {
            PlistFormat::Xml => Format::Xml,
            PlistFormat::Binary => Format::Binary,
        }
    }
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Property-list file to read (format detected from its header).
    pub input: PathBuf,
    /// Target encoding. Without it the decoded value is printed.
    #[arg(long)]
    pub to: Option<PlistFormat>,
    /// Write the re-encoded bytes here instead of stdout.
    #[arg(long, short = 'o', requires = "to")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device identifier.
    pub device: String,
    /// Service name on the device.
    pub service: String,
    /// Dictionary entry to send (repeatable).
    #[arg(
        long = "field",
        short = 'f',
        value_name = "KEY=VALUE",
        value_parser = parse_field,
        required = true
    )]
    pub fields: Vec<(String, String)>,
    /// Wire encoding for the channel.
    #[arg(long, value_name = "FORMAT", default_value = "xml")]
    pub plist_format: PlistFormat,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Device identifier.
    pub device: String,
    /// Service name on the device.
    pub service: String,
    /// Dictionary entry of a request to send before watching (repeatable).
    #[arg(long = "field", short = 'f', value_name = "KEY=VALUE", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
    /// Wire encoding for the channel.
    #[arg(long, value_name = "FORMAT", default_value = "xml")]
    pub plist_format: PlistFormat,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DebugArgs {
    /// Device identifier.
    pub device: String,
    /// Debug server service name.
    #[arg(long, default_value = devwire_debug::DEBUG_SERVICE)]
    pub service: String,
    /// Detach right after launching instead of resuming.
    #[arg(long)]
    pub launch_only: bool,
    /// Drop console packets whose checksum does not match.
    #[arg(long)]
    pub strict_checksums: bool,
    /// Program path followed by its arguments.
    #[arg(last = true, required = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_field(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {input:?}")),
    }
}

pub(crate) fn read_file(path: &Path) -> CliResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|err| crate::exit::io_error(&format!("failed reading {}", path.display()), err))
}
