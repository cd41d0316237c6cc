use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use rx_batch_updater::commands::configure::{self, ConfigureOptions};
use rx_batch_updater::commands::serial::{self, SerialOptions};
use rx_batch_updater::commands::wireless::{self, WirelessOptions};
use rx_batch_updater::commands::device;
use rx_batch_updater::flash::PROFILES_FILENAME;
use rx_batch_updater::job::{MatchMode, ReconnectPolicy};

#[derive(Parser)]
#[command(name = "rx-batch-updater")]
#[command(author, version, about = "Flash and configure receivers one after another")]
struct Cli {
    /// Print progress as JSON lines on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload firmware over Wi-Fi to every device AP that appears
    Wifi(WifiArgs),

    /// Flash every chip put into boot mode on a serial port
    Serial(SerialArgs),

    /// Read every segment of the chip in boot mode into a directory
    ReadClone {
        #[command(flatten)]
        serial: SerialArgs,

        /// Destination directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Send a job's configuration requests to one device, without firmware
    Configure {
        /// Wireless job file
        #[arg(long)]
        job: PathBuf,

        /// Network name to look for, overriding the job
        #[arg(long)]
        ssid: Option<String>,
    },

    /// List serial ports
    Ports,

    /// List chip profiles
    Profiles {
        #[arg(long, default_value = PROFILES_FILENAME)]
        profiles: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MatchArg {
    Exact,
    Prefix,
    Regex,
}

impl From<MatchArg> for MatchMode {
    fn from(arg: MatchArg) -> Self {
        match arg {
            MatchArg::Exact => MatchMode::Exact,
            MatchArg::Prefix => MatchMode::Prefix,
            MatchArg::Regex => MatchMode::Pattern,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReconnectArg {
    Never,
    AfterEachDevice,
    AtEnd,
}

impl From<ReconnectArg> for ReconnectPolicy {
    fn from(arg: ReconnectArg) -> Self {
        match arg {
            ReconnectArg::Never => ReconnectPolicy::Never,
            ReconnectArg::AfterEachDevice => ReconnectPolicy::AfterEachDevice,
            ReconnectArg::AtEnd => ReconnectPolicy::AtEnd,
        }
    }
}

#[derive(clap::Args)]
struct WifiArgs {
    /// Job file; flags below override it
    #[arg(long)]
    job: Option<PathBuf>,

    /// Firmware image to upload
    #[arg(long)]
    firmware: Option<PathBuf>,

    /// Network name, prefix or pattern of the device APs
    #[arg(long)]
    ssid: Option<String>,

    #[arg(long = "match", value_enum)]
    match_mode: Option<MatchArg>,

    /// Device AP password; leave out for open networks
    #[arg(long)]
    password: Option<String>,

    #[arg(long, value_enum)]
    reconnect: Option<ReconnectArg>,

    /// Save the merged job to this file before starting
    #[arg(long)]
    save_job: Option<PathBuf>,
}

#[derive(clap::Args)]
struct SerialArgs {
    /// Job file; flags below override it
    #[arg(long)]
    job: Option<PathBuf>,

    /// Serial port (e.g. COM3 or /dev/ttyUSB0)
    #[arg(long)]
    port: Option<String>,

    /// Chip profile name
    #[arg(long)]
    profile: Option<String>,

    #[arg(long, default_value = PROFILES_FILENAME)]
    profiles: PathBuf,

    /// Segment artifact as label=path, repeatable
    #[arg(long = "segment")]
    segments: Vec<String>,

    /// Flashing tool executable
    #[arg(long)]
    tool: Option<String>,

    /// Extra flash attempts after a failure
    #[arg(long)]
    retries: Option<u32>,

    /// Save the merged job to this file before starting
    #[arg(long)]
    save_job: Option<PathBuf>,
}

impl SerialArgs {
    fn into_options(self, json: bool) -> SerialOptions {
        SerialOptions {
            job: self.job,
            port: self.port,
            profile: self.profile,
            profiles: self.profiles,
            segments: self.segments,
            tool: self.tool,
            retries: self.retries,
            save_job: self.save_job,
            json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rx_batch_updater=info")),
        )
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    match cli.command {
        Command::Wifi(args) => {
            let counters = wireless::run(WirelessOptions {
                job: args.job,
                firmware: args.firmware,
                ssid: args.ssid,
                mode: args.match_mode.map(MatchMode::from),
                password: args.password,
                reconnect: args.reconnect.map(ReconnectPolicy::from),
                save_job: args.save_job,
                json,
            })
            .await?;
            tracing::info!(
                "Stopped: {} of {} devices updated",
                counters.succeeded,
                counters.attempted
            );
        }
        Command::Serial(args) => {
            let counters = serial::run(args.into_options(json)).await?;
            tracing::info!(
                "Stopped: {} of {} devices flashed",
                counters.succeeded,
                counters.attempted
            );
        }
        Command::ReadClone { serial: args, out } => {
            let dir = serial::read_clone(args.into_options(json), &out).await?;
            tracing::info!("Clone written to {}", dir.display());
        }
        Command::Configure { job, ssid } => {
            configure::run(ConfigureOptions { job, ssid, json }).await?;
        }
        Command::Ports => device::ports(json)?,
        Command::Profiles { profiles } => device::profiles(&profiles, json)?,
    }

    Ok(())
}
