mod commands;
mod kiosk_state;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use booth_camera_core::DeviceType;

/// Drive a photo-booth camera from the command line.
#[derive(Parser)]
#[command(name = "booth-kiosk", version)]
struct Cli {
    /// Machine configuration (JSON). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated camera instead of the Canon SDK.
    #[arg(long, global = true)]
    simulate: bool,

    /// Override the configured device type.
    #[arg(long, global = true, value_enum)]
    device: Option<DeviceArg>,

    /// Override the configured output directory.
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one session: live view, countdowns and a shot per slot.
    Run {
        /// Photo slots to fill (defaults to the configured count).
        #[arg(long)]
        slots: Option<usize>,
    },
    /// List attached cameras.
    Devices,
    /// Print battery level and remaining shots of the configured camera.
    Status,
    /// List photos and clips stored in the output directory.
    Media,
}

#[derive(Clone, Copy, ValueEnum)]
enum DeviceArg {
    Dslr,
    Webcam,
}

impl From<DeviceArg> for DeviceType {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Dslr => DeviceType::Dslr,
            DeviceArg::Webcam => DeviceType::Webcam,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(device) = cli.device {
        config.device_type = device.into();
    }
    if let Some(output) = cli.output {
        config.output_directory = output;
    }
    let provider = kiosk_state::KioskProvider::select(cli.simulate, config.device_type);
    if provider.is_simulated() {
        log::info!("driving a simulated {}", config.device_type);
    }

    let outcome = match cli.command.unwrap_or(Command::Run { slots: None }) {
        Command::Run { slots } => commands::run_session(provider, config, slots),
        Command::Devices => commands::list_devices(&provider, &config),
        Command::Status => commands::camera_status(&provider, &config),
        Command::Media => commands::list_media(&config),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
