use accrual_core::config::LiveOptions;
use accrual_core::live::{spawn_live_controller, LivePhase, LiveState, SystemClock};
use accrual_core::progress::{ProgressClient, ProgressTarget};
use accrual_core::time::accrual::round_currency;
use std::sync::Arc;
use std::time::Duration;

/// Runs a live controller and logs every published update until ctrl-c or the deadline.
pub async fn run(
    client: Arc<dyn ProgressClient>,
    target: ProgressTarget,
    options: LiveOptions,
    duration_secs: Option<u64>,
) -> anyhow::Result<()> {
    let handle = spawn_live_controller(client, target.clone(), options, Arc::new(SystemClock));
    let mut rx = handle.subscribe();

    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last_logged: Option<(LivePhase, Option<f64>)> = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!(subject = %target, "ctrl-c received; stopping");
                break;
            }
            _ = &mut deadline => {
                tracing::info!(subject = %target, "watch duration elapsed; stopping");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    tracing::warn!(subject = %target, "live controller exited");
                    break;
                }
                let state = rx.borrow_and_update().clone();
                let key = display_key(&state);
                if last_logged.as_ref() != Some(&key) {
                    log_state(&target, &state);
                    last_logged = Some(key);
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Phase plus the displayed (rounded) value; consecutive identical lines are skipped.
fn display_key(state: &LiveState) -> (LivePhase, Option<f64>) {
    (state.phase, state.animated_interest.map(round_currency))
}

fn log_state(target: &ProgressTarget, state: &LiveState) {
    let view = state.view();
    match state.phase {
        LivePhase::Loading => tracing::info!(subject = %target, "loading progress"),
        LivePhase::Failed => tracing::warn!(
            subject = %target,
            error = view.last_error.as_deref().unwrap_or("unknown"),
            "no progress available; waiting for retry"
        ),
        phase => tracing::info!(
            subject = %target,
            ?phase,
            animated_interest = view.animated_interest.unwrap_or_default(),
            total_interest = view.total_interest.unwrap_or_default(),
            investments = view.investments.len(),
            last_error = view.last_error.as_deref().unwrap_or(""),
            "live interest"
        ),
    }
}
