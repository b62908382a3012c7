use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use rsb::codec::{PacketFailurePolicy, UnpackMode, UnpackOptions};
use rsb::packet::process::{pack_packet, unpack_packet};
use rsb::process::{pack_bundle, unpack_bundle};

#[derive(Parser)]
#[command(name = "rsb-cli")]
#[command(about = "CLI for RSB bundles and RSG packets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// RSB Operations (Unpack/Pack)
    #[command(subcommand)]
    Rsb(RsbCommands),
    /// RSG Operations (Unpack/Pack)
    #[command(subcommand)]
    Rsg(RsgCommands),
}

#[derive(Subcommand)]
enum RsbCommands {
    /// Unpack an RSB file
    Unpack {
        /// Input RSB file path
        input: PathBuf,
        /// Output directory (optional, defaults to file name stem)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Extract every resource instead of keeping the stored packets
        #[arg(long, default_value_t = false)]
        expand: bool,
        /// Log and drop subgroups whose packet cannot be decoded
        #[arg(long, default_value_t = false)]
        skip_bad_packets: bool,
    },
    /// Pack a directory into an RSB file
    Pack {
        /// Input directory (containing data.json)
        input: PathBuf,
        /// Output RSB file
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum RsgCommands {
    /// Unpack a single RSG packet
    Unpack {
        /// Input RSG file path
        input: PathBuf,
        /// Output directory (optional, defaults to file name stem)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Pack a directory (containing packet.json) into an RSG file
    Pack {
        /// Input directory
        input: PathBuf,
        /// Output RSG file
        output: PathBuf,
    },
}

fn default_output(input: &Path, output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| PathBuf::from(input.file_stem().unwrap_or_default()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rsb(cmd) => match cmd {
            RsbCommands::Unpack {
                input,
                output,
                expand,
                skip_bad_packets,
            } => {
                let options = UnpackOptions {
                    mode: if expand {
                        UnpackMode::Expand
                    } else {
                        UnpackMode::Packet
                    },
                    packet_failure: if skip_bad_packets {
                        PacketFailurePolicy::Skip
                    } else {
                        PacketFailurePolicy::Abort
                    },
                };
                let output = default_output(&input, output);
                unpack_bundle(&input, &output, &options)?;
            }
            RsbCommands::Pack { input, output } => pack_bundle(&input, &output)?,
        },
        Commands::Rsg(cmd) => match cmd {
            RsgCommands::Unpack { input, output } => {
                let output = default_output(&input, output);
                unpack_packet(&input, &output)?;
            }
            RsgCommands::Pack { input, output } => pack_packet(&input, &output)?,
        },
    }

    Ok(())
}
