use anyhow::Result;
use bazaar_core::config_models::cli_args::Args;
use bazaar_core::config_models::cli_args::Command;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

pub fn main() -> Result<()> {
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .expect("Could not create tokio runtime");

    let result = tokio_runtime.block_on(async {
        let args = Args::parse();

        // Set up logger. Configure logger to use ISO-8601, of which rfc3339
        // is a subset. Install global collector configured based on RUST_LOG
        // env var. Accepted `RUST_LOG` values are `trace`, `debug`, `info`,
        // `warn`, and `error`.
        let info_env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .with_env_filter(info_env_filter)
            .with_thread_ids(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|_err| eprintln!("Unable to set global default subscriber"))
            .expect("Failed to set trace subscriber");

        match args.command {
            Command::Start(start_args) => {
                let node_starter = bazaar_core::bootstrap(start_args).await?;
                // the bootstrap is done; the process now lives as long as
                // its node instances
                node_starter.await?;
                Ok(())
            }
            Command::Stop => {
                info!("stop is handled by the service manager, not by this tool");
                Ok(())
            }
            Command::Status => {
                info!("status reporting is served by a running node's control interface");
                Ok(())
            }
        }
    });

    tokio_runtime.shutdown_timeout(tokio::time::Duration::from_secs(10));
    result
}
