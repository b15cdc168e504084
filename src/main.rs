use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use taskgate::config::{load_config, print_schema};
use taskgate::startup::{run, ServiceKind};
use taskgate::utils::logger::init_logging;

/// Todo gateway and its backend services.
#[derive(Debug, Parser)]
#[command(name = "taskgate", version, about)]
struct Args {
    /// Service to run.
    #[arg(value_enum, required_unless_present = "schema")]
    service: Option<ServiceKind>,

    /// YAML config file; missing files are skipped and the environment still applies.
    #[arg(long, default_value = "./config.yaml")]
    config: PathBuf,

    /// Print the configuration JSON schema and exit.
    #[arg(long)]
    schema: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.schema {
        return match print_schema() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Failed to print schema: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let Some(service) = args.service else {
        eprintln!("No service selected");
        return ExitCode::FAILURE;
    };

    let config = match load_config(&args.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging, config.debug, service.as_str()) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }
    info!(
        "taskgate {} starting the {} service",
        env!("CARGO_PKG_VERSION"),
        service.as_str()
    );

    match run(service, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
