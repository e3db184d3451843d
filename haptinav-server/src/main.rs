use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use haptinav_server::device;
use haptinav_server::guidance::Guidance;
use haptinav_server::location::LocationReceiver;
use haptinav_server::routing::HttpRoutingProvider;
use haptinav_server::Cli;
use miette::{IntoDiagnostic, Result};
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

// Runtime threads still blocked after shutdown, such as a read on a silent
// serial device, are abandoned after this long
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = runtime.block_on(run());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

async fn run() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::from_env(Env::default())
        .filter_level(args.verbose.log_level_filter())
        .format_timestamp_millis()
        .init();

    log::info!(
        "haptinav {} guiding to {:?} ({} / {})",
        env!("CARGO_PKG_VERSION"),
        args.destination,
        args.profile,
        args.weighting
    );

    let config = args
        .guidance_config()
        .map_err(|e| miette::miette!("{:#}", e))?;
    let provider =
        HttpRoutingProvider::new(args.routing_url.clone(), args.api_key.clone()).into_diagnostic()?;

    let (location, fix_rx) = LocationReceiver::new(args.fixes.clone(), args.replay);
    let (device_link, device_handle, device_events) = device::channel(args.device.clone());
    let guidance = Guidance::new(
        config,
        args.routing_target(),
        Arc::new(provider),
        fix_rx,
        device_handle,
        device_events,
    );

    Toplevel::new(move |s| async move {
        s.start(SubsystemBuilder::new("location", |s: SubsystemHandle| {
            location.run(s)
        }));
        s.start(SubsystemBuilder::new("device", |s: SubsystemHandle| {
            device_link.run(s)
        }));
        s.start(SubsystemBuilder::new("guidance", |s: SubsystemHandle| {
            guidance.run(s)
        }));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(1000))
    .await
    .map_err(Into::into)
}
