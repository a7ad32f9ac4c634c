use anyhow::{Context, Result};
use clap::Parser;
use swarmdns::config::{Cli, RunConfig};
use swarmdns::errors::ErrorKind;
use swarmdns::runner::Runner;
use tokio::runtime::Builder;
use tracing::{debug, error};

fn main() -> std::process::ExitCode {
    let num_cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);

    // Cap worker threads: enough headroom for I/O-bound resolution work
    // without excessive context switching on large machines.
    let worker_threads = std::cmp::min(num_cpus + 2, 16);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .expect("failed to create Tokio runtime");

    match runtime.block_on(async_main()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            let kind = err.downcast_ref::<ErrorKind>();
            error!(kind = ?kind, "run failed: {:#}", err);
            std::process::ExitCode::FAILURE
        }
    }
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    debug!("parsed CLI flags, validating configuration");
    let config = RunConfig::try_from(cli).context(ErrorKind::Configuration)?;

    let runner = Runner::new(config);
    runner.run().await
}
