use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use egk_apdu_transport_pcsc::PcscDeviceManager;
use tracing::info;

mod commands;
mod utils;

use commands::*;
use utils::reader;

#[derive(Parser)]
#[command(version, about = "Talk to German electronic health cards (eGK) over PC/SC")]
struct Cli {
    /// Optional reader name to use (will auto-detect if not specified)
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// Seconds to wait for a card when none is inserted yet
    #[arg(long, global = true, default_value_t = 0)]
    wait: u64,

    /// Trace level output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Card access number used to establish PACE
#[derive(Args, Debug, Clone)]
struct CanArgs {
    /// Card access number printed on the card (prompted for if omitted)
    #[arg(long)]
    can: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers
    List,

    /// Read EF.Version2 and check PACE support
    Version {
        /// Establish PACE first, required on contactless readers
        #[arg(long)]
        can: Option<String>,
    },

    /// Establish a PACE channel and report the outcome
    Pace {
        #[command(flatten)]
        can: CanArgs,
    },

    /// Verify the home PIN
    VerifyPin {
        #[command(flatten)]
        can: CanArgs,

        /// PIN (prompted for if omitted)
        #[arg(long)]
        pin: Option<String>,
    },

    /// Reset the PIN retry counter with the PUK
    Unlock {
        #[command(flatten)]
        can: CanArgs,

        /// PUK (prompted for if omitted)
        #[arg(long)]
        puk: Option<String>,

        /// Also set this new PIN
        #[arg(long)]
        new_pin: Option<String>,
    },

    /// Change the home PIN
    ChangePin {
        #[command(flatten)]
        can: CanArgs,

        /// Current PIN (prompted for if omitted)
        #[arg(long)]
        old: Option<String>,

        /// New PIN (prompted for if omitted)
        #[arg(long)]
        new: Option<String>,
    },

    /// Ask the card for random bytes
    Random {
        #[command(flatten)]
        can: CanArgs,

        /// Number of bytes, 1 to 256
        #[arg(long, default_value_t = 32)]
        length: usize,
    },

    /// Read the authentication certificate C.CH.AUT.E256
    Certificate {
        #[command(flatten)]
        can: CanArgs,

        /// Write the DER certificate to this file instead of printing hex
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sign a challenge with PrK.CH.AUT.E256
    Sign {
        #[command(flatten)]
        can: CanArgs,

        /// Challenge as a hex string
        #[arg(long, required = true)]
        challenge: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let manager = PcscDeviceManager::new()?;

    if let Commands::List = cli.command {
        return reader::list_readers(&manager);
    }

    let reader = match &cli.reader {
        Some(reader_name) => reader::find_reader_by_name(&manager, reader_name)?,
        None => reader::find_reader_with_card(&manager, Duration::from_secs(cli.wait))?,
    };
    info!("Using reader: {}", reader.name());

    let card = utils::session::open_card(&manager, &reader)?;
    match cli.command {
        Commands::List => Ok(()),
        Commands::Version { can } => version_command(card, can.as_deref()),
        Commands::Pace { can } => pace_command(card, can.can.as_deref()),
        Commands::VerifyPin { can, pin } => {
            verify_pin_command(card, can.can.as_deref(), pin.as_deref())
        }
        Commands::Unlock { can, puk, new_pin } => {
            unlock_command(card, can.can.as_deref(), puk.as_deref(), new_pin.as_deref())
        }
        Commands::ChangePin { can, old, new } => {
            change_pin_command(card, can.can.as_deref(), old.as_deref(), new.as_deref())
        }
        Commands::Random { can, length } => random_command(card, can.can.as_deref(), length),
        Commands::Certificate { can, output } => {
            certificate_command(card, can.can.as_deref(), output.as_ref())
        }
        Commands::Sign { can, challenge } => {
            sign_command(card, can.can.as_deref(), &challenge)
        }
    }
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("trace")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();
}
