use std::process::ExitCode;
use std::sync::Arc;

use config::ForwarderConfig;
use delivery::DeliveryChannel;
use driver::StreamDriver;
use inventory::DockerInventory;
use source::DockerLogSource;

mod cli;
mod config;
mod config_file;
mod container;
mod delivery;
mod driver;
mod inventory;
mod metadata;
mod record;
mod source;

/// Lines buffered between the Docker log streams and the pipeline.
const CHANNEL_CAPACITY: usize = 1024;

fn init_logger(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ForwarderConfig::try_init(cli::get_cli_args()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize the logger
    init_logger(config.debug);

    let inventory = match DockerInventory::connect() {
        Ok(inventory) => inventory,
        Err(err) => {
            log::error!("Cannot create docker client: {err}");
            return ExitCode::FAILURE;
        }
    };

    let conn =
        match delivery::connect(config.transport, &config.address, config.retry_startup).await {
            Ok(conn) => conn,
            Err(err) => {
                log::error!("{err}");
                return ExitCode::FAILURE;
            }
        };

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

    let (tx, rx) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);
    let source = DockerLogSource::new(inventory.docker().clone(), tx);
    let source_handle = tokio::spawn(source.run());

    let channel = DeliveryChannel::new(conn, config.pipeline.retry_send);
    let driver = StreamDriver::new(config.pipeline, Arc::new(inventory), channel);

    tokio::select! {
        result = driver.run(rx) => {
            if let Err(err) = result {
                log::error!("{err}");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            log::info!("Interrupted, shutting down");
            source_handle.abort();
            return ExitCode::SUCCESS;
        }
    }

    // The pipeline only drains once the source is gone.
    match source_handle.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            log::error!("Docker log source stopped: {err}");
            ExitCode::FAILURE
        }
        Err(err) => {
            log::error!("Docker log source panicked: {err}");
            ExitCode::FAILURE
        }
    }
}
