pub mod error;
pub mod http;

use crate::domain::window::TrackedInvestment;
use std::fmt;

/// What the progress endpoint is asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressTarget {
    User(String),
    Investment(String),
}

impl ProgressTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Investment(id) => id,
        }
    }
}

impl fmt::Display for ProgressTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Investment(id) => write!(f, "investment:{id}"),
        }
    }
}

#[async_trait::async_trait]
pub trait ProgressClient: Send + Sync {
    fn client_name(&self) -> &'static str;

    /// One attempt; failures surface as `error::ProgressFetchError` inside the `anyhow::Error`.
    async fn fetch_progress(&self, target: &ProgressTarget)
        -> anyhow::Result<Vec<TrackedInvestment>>;
}
