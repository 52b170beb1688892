use crate::config::LiveOptions;
use crate::domain::view::InvestmentProgressView;
use crate::domain::window::{AggregateInterestSnapshot, TrackedInvestment};
use crate::time::accrual;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LivePhase {
    /// First fetch in flight, nothing to show yet.
    Loading,
    Live,
    Refreshing,
    /// Server confirmed every tracked investment; the tick loop stops.
    Completed,
    /// First fetch failed; stays here until a manual retry.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Initial,
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing written.
    Idle,
    Updated,
    /// Estimate written and the snapshot needs server confirmation.
    RefreshDue,
}

/// Published controller state. Cheap to clone; the snapshot is shared.
#[derive(Debug, Clone)]
pub struct LiveState {
    pub phase: LivePhase,
    pub snapshot: Option<Arc<AggregateInterestSnapshot>>,
    pub animated_interest: Option<f64>,
    /// Instant `animated_interest` was computed for.
    pub as_of: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl LiveState {
    fn loading() -> Self {
        Self {
            phase: LivePhase::Loading,
            snapshot: None,
            animated_interest: None,
            as_of: None,
            last_error: None,
        }
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.snapshot.as_ref().map(|s| s.last_fetch)
    }

    pub fn view(&self) -> LiveView {
        let investments = match (&self.snapshot, self.as_of) {
            (Some(snapshot), Some(as_of)) => snapshot
                .investments
                .iter()
                .map(|i| InvestmentProgressView::from_investment(i, as_of))
                .collect(),
            _ => Vec::new(),
        };

        LiveView {
            phase: self.phase,
            animated_interest: self.animated_interest.map(accrual::round_currency),
            total_interest: self
                .snapshot
                .as_ref()
                .map(|s| accrual::round_currency(s.total_interest())),
            as_of: self.as_of,
            last_fetch: self.last_fetch(),
            last_error: self.last_error.clone(),
            investments,
        }
    }
}

/// Serializable projection of `LiveState` for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveView {
    pub phase: LivePhase,
    pub animated_interest: Option<f64>,
    pub total_interest: Option<f64>,
    pub as_of: Option<DateTime<Utc>>,
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub investments: Vec<InvestmentProgressView>,
}

/// Poll/tick state machine. Owns no timers and does no I/O; the runner feeds it instants and
/// fetch results.
#[derive(Debug)]
pub struct LiveInterestController {
    stale_threshold_minutes: i64,
    retry_cooldown: Duration,
    state: LiveState,
    in_flight: bool,
    last_attempt: Option<DateTime<Utc>>,
    last_attempt_failed: bool,
}

impl LiveInterestController {
    pub fn new(options: &LiveOptions) -> Self {
        Self {
            stale_threshold_minutes: options.stale_threshold_minutes,
            retry_cooldown: Duration::try_seconds(options.retry_cooldown_secs.max(0))
                .unwrap_or(Duration::MAX),
            state: LiveState::loading(),
            in_flight: false,
            last_attempt: None,
            last_attempt_failed: false,
        }
    }

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    pub fn phase(&self) -> LivePhase {
        self.state.phase
    }

    /// Returns false when the fetch must not be issued: one is already in flight, or a manual
    /// refresh arrives while Loading.
    pub fn begin_fetch(&mut self, trigger: RefreshTrigger, now: DateTime<Utc>) -> bool {
        if self.in_flight {
            tracing::debug!(?trigger, "fetch already in flight; skipping");
            return false;
        }

        match (trigger, self.state.phase) {
            (RefreshTrigger::Manual, LivePhase::Loading) => return false,
            (RefreshTrigger::Scheduled, phase) if phase != LivePhase::Live => return false,
            _ => {}
        }

        self.state.phase = if self.state.snapshot.is_some() {
            LivePhase::Refreshing
        } else {
            LivePhase::Loading
        };
        self.in_flight = true;
        self.last_attempt = Some(now);
        true
    }

    pub fn complete_fetch(
        &mut self,
        result: anyhow::Result<Vec<TrackedInvestment>>,
        now: DateTime<Utc>,
    ) {
        if !self.in_flight {
            tracing::debug!("fetch result without a matching request; ignoring");
            return;
        }
        self.in_flight = false;

        match result {
            Ok(investments) => {
                let snapshot = Arc::new(AggregateInterestSnapshot::new(investments, now));
                let (phase, animated) = if snapshot.is_fully_completed() {
                    (LivePhase::Completed, snapshot.total_interest())
                } else {
                    (LivePhase::Live, snapshot.animated_interest(now))
                };

                tracing::info!(
                    ?phase,
                    investments = snapshot.investments.len(),
                    animated_interest = animated,
                    "progress snapshot applied"
                );

                self.state = LiveState {
                    phase,
                    snapshot: Some(snapshot),
                    animated_interest: Some(animated),
                    as_of: Some(now),
                    last_error: None,
                };
                self.last_attempt_failed = false;
            }
            Err(err) => {
                self.last_attempt_failed = true;
                self.state.last_error = Some(format!("{err:#}"));
                self.state.phase = match self.state.snapshot.as_deref() {
                    Some(s) if s.is_fully_completed() => LivePhase::Completed,
                    Some(_) => LivePhase::Live,
                    None => LivePhase::Failed,
                };
                tracing::warn!(
                    phase = ?self.state.phase,
                    error = %err,
                    "progress fetch failed; keeping last snapshot"
                );
            }
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.state.phase != LivePhase::Live {
            return TickOutcome::Idle;
        }
        let Some(snapshot) = self.state.snapshot.as_ref() else {
            return TickOutcome::Idle;
        };

        let due = snapshot.needs_refresh(self.stale_threshold_minutes, now);
        self.state.animated_interest = Some(snapshot.animated_interest(now));
        self.state.as_of = Some(now);

        if due && self.cooldown_elapsed(now) {
            TickOutcome::RefreshDue
        } else {
            TickOutcome::Updated
        }
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_attempt {
            Some(at) if self.last_attempt_failed => now - at >= self.retry_cooldown,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::window::InvestmentTimeWindow;
    use crate::progress::http::decode_response;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap()
    }

    fn investment(total: f64, is_completed: bool) -> TrackedInvestment {
        TrackedInvestment {
            id: Some("inv".to_string()),
            amount: Some(1_000.0),
            window: InvestmentTimeWindow {
                start_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                end_date: Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap(),
                total_interest: total,
                is_completed,
            },
        }
    }

    fn live_controller() -> LiveInterestController {
        let mut c = LiveInterestController::new(&LiveOptions::default());
        assert!(c.begin_fetch(RefreshTrigger::Initial, t0()));
        c.complete_fetch(Ok(vec![investment(100.0, false)]), t0());
        c
    }

    #[test]
    fn starts_loading_without_a_number() {
        let mut c = LiveInterestController::new(&LiveOptions::default());
        assert_eq!(c.phase(), LivePhase::Loading);
        assert_eq!(c.state().animated_interest, None);
        assert_eq!(c.tick(t0()), TickOutcome::Idle);
        assert!(c.begin_fetch(RefreshTrigger::Initial, t0()));
        assert!(!c.begin_fetch(RefreshTrigger::Manual, t0()));
    }

    #[test]
    fn successful_fetch_seeds_estimate_and_goes_live() {
        let c = live_controller();
        assert_eq!(c.phase(), LivePhase::Live);
        assert_eq!(c.state().animated_interest, Some(50.0));
        assert_eq!(c.state().last_fetch(), Some(t0()));
    }

    #[test]
    fn tick_recomputes_between_fetches() {
        let mut c = live_controller();
        let later = t0() + Duration::hours(24);
        // Stale by then, so a refresh is requested as well.
        assert_eq!(c.tick(later), TickOutcome::RefreshDue);
        assert_eq!(c.state().animated_interest, Some(60.0));

        let mut c = live_controller();
        assert_eq!(c.tick(t0() + Duration::seconds(1)), TickOutcome::Updated);
    }

    #[test]
    fn only_one_fetch_in_flight() {
        let mut c = live_controller();
        let now = t0() + Duration::minutes(6);
        assert_eq!(c.tick(now), TickOutcome::RefreshDue);
        assert!(c.begin_fetch(RefreshTrigger::Scheduled, now));
        assert_eq!(c.phase(), LivePhase::Refreshing);
        assert!(!c.begin_fetch(RefreshTrigger::Scheduled, now));
        assert!(!c.begin_fetch(RefreshTrigger::Manual, now));
    }

    #[test]
    fn refreshing_suppresses_tick_writes() {
        let mut c = live_controller();
        let now = t0() + Duration::minutes(6);
        c.tick(now);
        let before = c.state().animated_interest;
        assert!(c.begin_fetch(RefreshTrigger::Scheduled, now));
        assert_eq!(c.tick(now + Duration::seconds(1)), TickOutcome::Idle);
        assert_eq!(c.state().animated_interest, before);
    }

    #[test]
    fn failure_keeps_last_snapshot_ticking() {
        let mut c = live_controller();
        let now = t0() + Duration::minutes(6);
        assert!(c.begin_fetch(RefreshTrigger::Manual, now));
        c.complete_fetch(Err(anyhow::anyhow!("HTTP 502")), now);
        assert_eq!(c.phase(), LivePhase::Live);
        assert_eq!(c.state().last_fetch(), Some(t0()));
        assert!(c.state().last_error.as_deref().unwrap().contains("502"));
        assert_ne!(c.tick(now + Duration::seconds(1)), TickOutcome::Idle);
    }

    #[test]
    fn error_body_with_ok_status_keeps_last_snapshot() {
        let mut c = live_controller();
        let now = t0() + Duration::minutes(6);
        assert!(c.begin_fetch(RefreshTrigger::Scheduled, now));
        let result = decode_response(200, r#"{"success":false,"message":"Investment not found"}"#);
        c.complete_fetch(result, now);

        assert_eq!(c.phase(), LivePhase::Live);
        assert_eq!(c.state().snapshot.as_ref().unwrap().investments.len(), 1);
        assert_eq!(c.state().animated_interest, Some(50.0));
        assert!(c.state().last_error.is_some());

        assert_eq!(c.tick(now + Duration::seconds(1)), TickOutcome::Updated);
        assert!(c.state().animated_interest.unwrap() > 50.0);
    }

    #[test]
    fn out_of_range_options_saturate() {
        let options = LiveOptions {
            stale_threshold_minutes: i64::MAX / 2,
            retry_cooldown_secs: i64::MAX / 2,
            ..LiveOptions::default()
        };
        let mut c = LiveInterestController::new(&options);
        assert!(c.begin_fetch(RefreshTrigger::Initial, t0()));
        c.complete_fetch(Ok(vec![investment(100.0, false)]), t0());
        assert_eq!(c.tick(t0() + Duration::days(3)), TickOutcome::Updated);

        // Matured, but the failed attempt's cooldown never runs out.
        let matured = t0() + Duration::days(6);
        assert!(c.begin_fetch(RefreshTrigger::Manual, matured));
        c.complete_fetch(Err(anyhow::anyhow!("timeout")), matured);
        assert_eq!(c.tick(matured + Duration::days(365)), TickOutcome::Updated);
    }

    #[test]
    fn failure_without_snapshot_waits_for_retry() {
        let mut c = LiveInterestController::new(&LiveOptions::default());
        assert!(c.begin_fetch(RefreshTrigger::Initial, t0()));
        c.complete_fetch(Err(anyhow::anyhow!("connection refused")), t0());
        assert_eq!(c.phase(), LivePhase::Failed);
        assert_eq!(c.tick(t0() + Duration::seconds(1)), TickOutcome::Idle);
        assert!(!c.begin_fetch(RefreshTrigger::Scheduled, t0()));

        assert!(c.begin_fetch(RefreshTrigger::Manual, t0()));
        assert_eq!(c.phase(), LivePhase::Loading);
        c.complete_fetch(Ok(vec![investment(100.0, false)]), t0());
        assert_eq!(c.phase(), LivePhase::Live);
        assert_eq!(c.state().last_error, None);
    }

    #[test]
    fn automatic_retry_waits_for_cooldown() {
        let mut c = live_controller();
        let now = t0() + Duration::minutes(6);
        assert!(c.begin_fetch(RefreshTrigger::Scheduled, now));
        c.complete_fetch(Err(anyhow::anyhow!("timeout")), now);

        assert_eq!(c.tick(now + Duration::seconds(5)), TickOutcome::Updated);
        assert_eq!(c.tick(now + Duration::seconds(10)), TickOutcome::RefreshDue);
    }

    #[test]
    fn all_completed_pins_total_and_stops_ticking() {
        let mut c = live_controller();
        let now = t0() + Duration::days(6);
        assert!(c.begin_fetch(RefreshTrigger::Manual, now));
        c.complete_fetch(
            Ok(vec![investment(100.0, true), investment(25.5, true)]),
            now,
        );
        assert_eq!(c.phase(), LivePhase::Completed);
        assert_eq!(c.state().animated_interest, Some(125.5));
        assert_eq!(c.tick(now + Duration::seconds(1)), TickOutcome::Idle);
        assert!(!c.begin_fetch(RefreshTrigger::Scheduled, now));
        assert!(c.begin_fetch(RefreshTrigger::Manual, now));
    }

    #[test]
    fn unsolicited_result_is_ignored() {
        let mut c = live_controller();
        c.complete_fetch(Ok(Vec::new()), t0() + Duration::seconds(3));
        assert_eq!(c.state().snapshot.as_ref().unwrap().investments.len(), 1);
    }

    #[test]
    fn view_rounds_only_at_the_edge() {
        let mut c = LiveInterestController::new(&LiveOptions::default());
        assert!(c.begin_fetch(RefreshTrigger::Initial, t0()));
        c.complete_fetch(Ok(vec![investment(0.02468, false)]), t0());
        assert_eq!(c.state().animated_interest, Some(0.01234));
        let view = c.state().view();
        assert_eq!(view.animated_interest, Some(0.01));
        assert_eq!(view.investments.len(), 1);
        assert_eq!(view.investments[0].progress_percentage, 50.0);
    }
}
