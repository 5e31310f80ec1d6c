//! `promobatch generate` command.

use std::sync::Arc;

use chrono::Utc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::campaign::Campaign;
use crate::cli::GenerateArgs;
use crate::config::{Provider, RunConfig};
use crate::context::ServiceContext;
use crate::issuer::Issuer;
use crate::progress::ConsoleReporter;
use crate::scheduler::{BatchScheduler, RunStats};
use crate::sink::RotatingCsvSink;

/// Execute the `generate` command.
///
/// Validates the arguments, then drives the run on a multi-threaded runtime.
/// Ctrl-C or SIGTERM stops the run after the current batch; a second signal
/// quits at once.
///
/// # Errors
///
/// Returns an error string for invalid configuration, a campaign that cannot
/// be created, an output file that cannot be opened, or a failed final flush.
pub fn run(args: &GenerateArgs) -> Result<(), String> {
    let config = RunConfig::from_args(args.clone(), Utc::now()).map_err(|e| e.to_string())?;
    let ctx = ServiceContext::from_config(&config).map_err(|e| e.to_string())?;
    if config.provider == Provider::Simulated {
        warn!("Dry run: no requests will reach the payments provider");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {e}"))?;

    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(2);
        let forwarder = tokio::spawn(forward_signals(tx));
        let mut relay = tokio::spawn(relay_interrupts(rx, cancel.clone()));

        let outcome = tokio::select! {
            result = execute(&ctx, &config, &cancel) => Some(result),
            Ok(Interrupt::Forced) = &mut relay => None,
        };
        forwarder.abort();
        relay.abort();

        let Some(result) = outcome else {
            return Err("Interrupted twice; stopped without finalizing. \
                        Rows already written are kept."
                .to_string());
        };
        let stats = result?;
        print_summary(&stats);
        Ok(())
    })
}

/// Runs one full generation against `ctx`.
///
/// Opens the first output file, then creates (or adopts) the campaign. An
/// output problem therefore aborts the run before anything exists remotely,
/// and a campaign failure aborts it with nothing issued.
///
/// # Errors
///
/// Returns an error string if the output or campaign cannot be set up, or if
/// the output could not be closed cleanly at the end.
pub async fn execute(
    ctx: &ServiceContext,
    config: &RunConfig,
    cancel: &CancellationToken,
) -> Result<RunStats, String> {
    let sink = RotatingCsvSink::create(config.output.clone(), config.campaign.file_stem())
        .map_err(|e| e.to_string())?;

    let campaign = match &config.coupon_id {
        Some(id) => {
            info!(coupon = %id, "reusing existing campaign");
            Campaign::existing(id.clone(), config.campaign.clone())
        }
        None => match Campaign::establish(ctx.payments.as_ref(), config.campaign.clone()).await {
            Ok(campaign) => campaign,
            Err(e) => {
                if let Err(cleanup) = sink.abandon() {
                    warn!(error = %cleanup, "failed to remove empty output file");
                }
                return Err(format!("Failed to create campaign: {e}"));
            }
        },
    };

    info!(
        coupon = %campaign.id(),
        offer = %campaign.offer_description(),
        expires = %campaign.expiry_display(),
        dir = %sink.dir().display(),
        "campaign ready",
    );

    let issuer =
        Issuer::new(ctx.payments.clone(), ctx.clock.clone(), ctx.codes.clone(), config.retry);
    let scheduler = BatchScheduler::new(
        config.schedule.clone(),
        Arc::new(issuer),
        Arc::new(sink),
        ctx.clock.clone(),
        Arc::new(ConsoleReporter::new(config.milestone_every)),
    );

    let stats = scheduler.run(Arc::new(campaign), cancel).await;
    match &stats.finalize_error {
        Some(err) => Err(format!("Failed to finalize output: {err}")),
        None => Ok(stats),
    }
}

/// How the signal relay finished.
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Signals stopped arriving; the run finalizes normally.
    Graceful,
    /// A second signal arrived while the run was winding down.
    Forced,
}

/// Cancels the run on the first signal and reports a second one.
async fn relay_interrupts(
    mut signals: mpsc::Receiver<&'static str>,
    cancel: CancellationToken,
) -> Interrupt {
    let Some(first) = signals.recv().await else {
        return Interrupt::Graceful;
    };
    warn!("Received {first}; finishing the current batch. Press Ctrl+C again to quit now.");
    cancel.cancel();

    match signals.recv().await {
        Some(second) => {
            warn!("Received {second} again; quitting without waiting for in-flight requests");
            Interrupt::Forced
        }
        None => Interrupt::Graceful,
    }
}

/// Forwards every Ctrl-C and SIGTERM into `tx` until the receiver is gone.
async fn forward_signals(tx: mpsc::Sender<&'static str>) {
    #[cfg(unix)]
    let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            None
        }
    };

    loop {
        #[cfg(unix)]
        let sigterm = async {
            if let Some(stream) = terminate.as_mut() {
                if stream.recv().await.is_some() {
                    return;
                }
            }
            std::future::pending::<()>().await;
        };

        #[cfg(not(unix))]
        let sigterm = std::future::pending::<()>();

        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        };

        let name = tokio::select! {
            () = ctrl_c => "Ctrl+C",
            () = sigterm => "SIGTERM",
        };
        if tx.send(name).await.is_err() {
            break;
        }
    }
}

fn print_summary(stats: &RunStats) {
    let status = if stats.interrupted { "interrupted" } else { "complete" };
    println!("Run {status}: {} of {} codes issued", stats.successful, stats.attempted);
    if stats.failures.total() > 0 {
        println!(
            "Failures: {} rate limited, {} rejected, {} unwritten, {} panicked",
            stats.failures.rate_limited,
            stats.failures.rejected,
            stats.failures.unwritten,
            stats.failures.panicked,
        );
    }
    for file in &stats.files {
        println!("  {}", file.display());
    }
}
