use crate::config::LiveOptions;
use crate::domain::window::TrackedInvestment;
use crate::live::clock::Clock;
use crate::live::controller::{
    LiveInterestController, LivePhase, LiveState, RefreshTrigger, TickOutcome,
};
use crate::progress::{ProgressClient, ProgressTarget};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

type FetchFuture = Pin<Box<dyn Future<Output = anyhow::Result<Vec<TrackedInvestment>>> + Send>>;

const REFRESH_QUEUE: usize = 4;

/// Owner-side handle for a spawned controller. Dropping it does not stop the task; call
/// `shutdown` when the owning view goes away.
#[derive(Debug)]
pub struct LiveHandle {
    state_rx: watch::Receiver<LiveState>,
    refresh_tx: mpsc::Sender<()>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl LiveHandle {
    pub fn subscribe(&self) -> watch::Receiver<LiveState> {
        self.state_rx.clone()
    }

    pub fn current(&self) -> LiveState {
        self.state_rx.borrow().clone()
    }

    /// Queues a manual refresh. Returns false while Loading or when the controller has stopped.
    pub fn refresh(&self) -> bool {
        if self.state_rx.borrow().phase == LivePhase::Loading {
            return false;
        }
        match self.refresh_tx.try_send(()) {
            Ok(()) => true,
            // A queued request already covers this one.
            Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancels the loop and waits for it to exit. An in-flight fetch is dropped unapplied.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "live controller task ended abnormally");
        }
    }
}

pub fn spawn_live_controller(
    client: Arc<dyn ProgressClient>,
    target: ProgressTarget,
    options: LiveOptions,
    clock: Arc<dyn Clock>,
) -> LiveHandle {
    let initial = LiveInterestController::new(&options).state().clone();
    let (state_tx, state_rx) = watch::channel(initial);
    let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE);
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(run_live_controller(
        client,
        target,
        options,
        clock,
        refresh_rx,
        state_tx,
        shutdown.clone(),
    ));

    LiveHandle {
        state_rx,
        refresh_tx,
        shutdown,
        task,
    }
}

/// Drives one controller: initial fetch, then a local tick every `options.tick_ms` with
/// tick-driven and manual refetches. Returns once `shutdown` is cancelled.
pub async fn run_live_controller(
    client: Arc<dyn ProgressClient>,
    target: ProgressTarget,
    options: LiveOptions,
    clock: Arc<dyn Clock>,
    mut refresh_rx: mpsc::Receiver<()>,
    state_tx: watch::Sender<LiveState>,
    shutdown: CancellationToken,
) {
    let mut controller = LiveInterestController::new(&options);
    let mut in_flight: Option<FetchFuture> = None;
    let mut refresh_open = true;

    let mut ticker = tokio::time::interval(Duration::from_millis(options.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        subject = %target,
        client = client.client_name(),
        tick_ms = options.tick_ms,
        stale_threshold_minutes = options.stale_threshold_minutes,
        "live controller started"
    );

    if controller.begin_fetch(RefreshTrigger::Initial, clock.now()) {
        in_flight = Some(fetch(&client, &target));
    }
    publish(&state_tx, &controller);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!(subject = %target, discarded_fetch = in_flight.is_some(), "live controller stopping");
                break;
            }
            result = next_result(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                controller.complete_fetch(result, clock.now());
                publish(&state_tx, &controller);
            }
            _ = ticker.tick(), if controller.phase() != LivePhase::Completed => {
                let now = clock.now();
                match controller.tick(now) {
                    TickOutcome::Idle => {}
                    TickOutcome::Updated => publish(&state_tx, &controller),
                    TickOutcome::RefreshDue => {
                        if controller.begin_fetch(RefreshTrigger::Scheduled, now) {
                            tracing::debug!(subject = %target, "scheduled refresh");
                            in_flight = Some(fetch(&client, &target));
                        }
                        publish(&state_tx, &controller);
                    }
                }
            }
            req = refresh_rx.recv(), if refresh_open => {
                match req {
                    Some(()) => {
                        if controller.begin_fetch(RefreshTrigger::Manual, clock.now()) {
                            tracing::debug!(subject = %target, "manual refresh");
                            in_flight = Some(fetch(&client, &target));
                            publish(&state_tx, &controller);
                        }
                    }
                    None => refresh_open = false,
                }
            }
        }
    }
}

fn fetch(client: &Arc<dyn ProgressClient>, target: &ProgressTarget) -> FetchFuture {
    let client = Arc::clone(client);
    let target = target.clone();
    Box::pin(async move { client.fetch_progress(&target).await })
}

async fn next_result(fut: &mut Option<FetchFuture>) -> anyhow::Result<Vec<TrackedInvestment>> {
    match fut.as_mut() {
        Some(f) => f.await,
        None => std::future::pending().await,
    }
}

/// Whole-value swap; readers never see a half-updated state.
fn publish(state_tx: &watch::Sender<LiveState>, controller: &LiveInterestController) {
    state_tx.send_replace(controller.state().clone());
}
