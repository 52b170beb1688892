use crate::time::accrual;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentTimeWindow {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_interest: f64,
    pub is_completed: bool,
}

impl InvestmentTimeWindow {
    pub fn duration_ms(&self) -> i64 {
        (self.end_date - self.start_date).num_milliseconds()
    }

    pub fn is_malformed(&self) -> bool {
        self.duration_ms() <= 0 || !self.total_interest.is_finite()
    }

    /// Scheduled maturity reached. Independent of the server's `is_completed` flag.
    pub fn is_matured(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedInvestment {
    pub id: Option<String>,
    pub amount: Option<f64>,
    pub window: InvestmentTimeWindow,
}

/// Last server-confirmed state. Replaced wholesale on every successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateInterestSnapshot {
    pub investments: Vec<TrackedInvestment>,
    pub last_fetch: DateTime<Utc>,
}

impl AggregateInterestSnapshot {
    pub fn new(investments: Vec<TrackedInvestment>, last_fetch: DateTime<Utc>) -> Self {
        Self {
            investments,
            last_fetch,
        }
    }

    pub fn windows(&self) -> impl Iterator<Item = &InvestmentTimeWindow> {
        self.investments.iter().map(|i| &i.window)
    }

    pub fn animated_interest(&self, now: DateTime<Utc>) -> f64 {
        accrual::aggregate_interest(self.windows(), now)
    }

    pub fn total_interest(&self) -> f64 {
        self.windows()
            .map(|w| w.total_interest)
            .filter(|v| v.is_finite())
            .fold(0.0, |acc, v| acc + v)
    }

    pub fn is_fully_completed(&self) -> bool {
        !self.investments.is_empty() && self.windows().all(|w| w.is_completed)
    }

    /// Completed windows are skipped for the maturity test; they stay past `end_date` forever.
    pub fn needs_refresh(&self, threshold_minutes: i64, now: DateTime<Utc>) -> bool {
        if now - self.last_fetch > accrual::staleness_threshold(threshold_minutes) {
            return true;
        }
        self.windows()
            .filter(|w| !w.is_completed)
            .any(|w| accrual::should_refresh_investment(w, self.last_fetch, threshold_minutes, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn tracked(id: &str, total: f64, is_completed: bool) -> TrackedInvestment {
        TrackedInvestment {
            id: Some(id.to_string()),
            amount: Some(1_000.0),
            window: InvestmentTimeWindow {
                start_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                end_date: Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap(),
                total_interest: total,
                is_completed,
            },
        }
    }

    #[test]
    fn aggregates_across_investments() {
        let fetched = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        let snap = AggregateInterestSnapshot::new(
            vec![tracked("a", 100.0, false), tracked("b", 20.0, true)],
            fetched,
        );
        assert_eq!(snap.animated_interest(fetched), 70.0);
        assert_eq!(snap.total_interest(), 120.0);
        assert!(!snap.is_fully_completed());
    }

    #[test]
    fn empty_snapshot_is_not_completed_but_goes_stale() {
        let fetched = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        let snap = AggregateInterestSnapshot::new(Vec::new(), fetched);
        assert!(!snap.is_fully_completed());
        assert!(!snap.needs_refresh(5, fetched + Duration::minutes(1)));
        assert!(snap.needs_refresh(5, fetched + Duration::minutes(6)));
    }

    #[test]
    fn completed_past_end_window_does_not_force_refresh() {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let snap = AggregateInterestSnapshot::new(vec![tracked("a", 100.0, true)], now);
        assert!(!snap.needs_refresh(5, now + Duration::seconds(1)));
    }

    #[test]
    fn matured_uncompleted_window_forces_refresh() {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let snap = AggregateInterestSnapshot::new(
            vec![tracked("a", 100.0, true), tracked("b", 5.0, false)],
            now,
        );
        assert!(snap.needs_refresh(5, now + Duration::seconds(1)));
    }

    #[test]
    fn huge_threshold_means_never_stale() {
        let fetched = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        let snap = AggregateInterestSnapshot::new(vec![tracked("a", 100.0, false)], fetched);
        assert!(!snap.needs_refresh(i64::MAX / 2, fetched + Duration::days(2)));
        assert!(snap.needs_refresh(i64::MAX, fetched + Duration::days(6)));
        assert!(snap.needs_refresh(i64::MIN, fetched));
    }

    #[test]
    fn empty_snapshot_totals_are_positive_zero() {
        let fetched = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        let snap = AggregateInterestSnapshot::new(Vec::new(), fetched);
        assert!(snap.animated_interest(fetched).is_sign_positive());
        assert!(snap.total_interest().is_sign_positive());
    }

    #[test]
    fn malformed_detection() {
        let mut w = tracked("a", 1.0, false).window;
        assert!(!w.is_malformed());
        w.end_date = w.start_date;
        assert!(w.is_malformed());
        w.end_date = w.start_date + Duration::days(1);
        w.total_interest = f64::INFINITY;
        assert!(w.is_malformed());
    }
}
