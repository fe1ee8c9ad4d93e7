use clap::Parser;
use std::panic::{self, PanicHookInfo};
use switchbot_gateway::app::{Mode, Pipeline, RunError, send_once};
use switchbot_gateway::config::{self, Config, Options};
use switchbot_gateway::scanner;
use switchbot_gateway::sink::Forwarder;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Log to stderr so stdout only carries forwarded values.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Main application entry point.
///
/// 1. Resolves the configuration and builds the forwarder
/// 2. In direct mode, forwards the given value once
/// 3. Otherwise opens the Bluetooth adapter and runs the scan loop until
///    interrupted
async fn run(options: Options) -> Result<(), RunError> {
    let config = Config::from_options(&options);
    let forwarder = Forwarder::connect(
        config.destination.clone(),
        config.endpoint.as_deref(),
        &config.region,
    )
    .await?;

    match &config.destination {
        Some(destination) => info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            asset_id = %destination.asset_id,
            property_id = %destination.property_id,
            data_type = %destination.data_type,
            "forwarding readings to SiteWise"
        ),
        None => warn!("ASSET_ID or PROPERTY_ID not set, readings are only printed"),
    }

    let mut stdout = std::io::stdout();

    match Mode::from_options(&options) {
        Mode::Direct(value) => {
            send_once(&forwarder, value, &mut stdout).await?;
            Ok(())
        }
        Mode::Daemon => {
            let target = config.target()?;
            let scanner = scanner::open_default().await?;
            let pipeline = Pipeline::new(&config, target, scanner.as_ref(), &forwarder);

            tokio::select! {
                result = pipeline.run(&mut stdout) => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, stopping scan");
                    Ok(())
                }
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let env_file = config::load_env_file();
    let options = Options::parse();
    init_logging(options.verbose);

    if let Some(path) = env_file {
        debug!(path = %path.display(), "loaded environment file");
    }

    match run(options).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            error!("{}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
