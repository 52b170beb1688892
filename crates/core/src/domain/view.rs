use crate::domain::window::TrackedInvestment;
use crate::time::accrual;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-investment display projection. Monetary fields are rounded here and nowhere earlier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentProgressView {
    pub id: Option<String>,
    pub amount: Option<f64>,
    pub current_interest: f64,
    pub total_interest: f64,
    pub progress_percentage: f64,
    pub time_remaining: String,
    pub total_value: Option<f64>,
    pub is_completed: bool,
    pub end_date: DateTime<Utc>,
}

impl InvestmentProgressView {
    pub fn from_investment(investment: &TrackedInvestment, now: DateTime<Utc>) -> Self {
        let window = &investment.window;
        let current = accrual::calculate_progressive_interest(window, now);

        let time_remaining = if window.is_completed {
            accrual::COMPLETED_LABEL.to_string()
        } else {
            accrual::format_time_remaining(window.end_date, now)
        };

        Self {
            id: investment.id.clone(),
            amount: investment.amount,
            current_interest: accrual::round_currency(current),
            total_interest: accrual::round_currency(window.total_interest),
            progress_percentage: accrual::round_currency(accrual::calculate_progress_percentage(
                window, now,
            )),
            time_remaining,
            total_value: investment
                .amount
                .map(|amount| accrual::round_currency(amount + current)),
            is_completed: window.is_completed,
            end_date: window.end_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::window::InvestmentTimeWindow;
    use chrono::TimeZone;

    #[test]
    fn projects_rounded_values() {
        let investment = TrackedInvestment {
            id: Some("inv-1".to_string()),
            amount: Some(500.0),
            window: InvestmentTimeWindow {
                start_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                end_date: Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap(),
                total_interest: 10.0,
                is_completed: false,
            },
        };
        // One day into a three-day window.
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let view = InvestmentProgressView::from_investment(&investment, now);
        assert_eq!(view.current_interest, 3.33);
        assert_eq!(view.progress_percentage, 33.33);
        assert_eq!(view.total_value, Some(503.33));
        assert_eq!(view.time_remaining, "2d 0h");
    }

    #[test]
    fn completed_investment_reads_completed_before_end() {
        let investment = TrackedInvestment {
            id: None,
            amount: None,
            window: InvestmentTimeWindow {
                start_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                end_date: Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap(),
                total_interest: 10.0,
                is_completed: true,
            },
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let view = InvestmentProgressView::from_investment(&investment, now);
        assert_eq!(view.time_remaining, "Completed");
        assert_eq!(view.current_interest, 10.0);
        assert_eq!(view.total_value, None);
    }
}
