pub mod domain;
pub mod live;
pub mod progress;
pub mod time;

pub mod config {
    use anyhow::Context;

    const DEFAULT_USER_PATH: &str = "/api/investments/user/{id}/progress";
    const DEFAULT_INVESTMENT_PATH: &str = "/api/investments/{id}/progress";
    const DEFAULT_TIMEOUT_SECS: u64 = 15;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub progress_api_base_url: Option<String>,
        pub progress_api_token: Option<String>,
        pub progress_user_path: String,
        pub progress_investment_path: String,
        pub progress_timeout_secs: u64,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                progress_api_base_url: non_empty_var("PROGRESS_API_BASE_URL"),
                progress_api_token: non_empty_var("PROGRESS_API_TOKEN"),
                progress_user_path: non_empty_var("PROGRESS_USER_PATH")
                    .unwrap_or_else(|| DEFAULT_USER_PATH.to_string()),
                progress_investment_path: non_empty_var("PROGRESS_INVESTMENT_PATH")
                    .unwrap_or_else(|| DEFAULT_INVESTMENT_PATH.to_string()),
                progress_timeout_secs: std::env::var("PROGRESS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
            })
        }

        pub fn require_progress_api_base_url(&self) -> anyhow::Result<&str> {
            self.progress_api_base_url
                .as_deref()
                .context("PROGRESS_API_BASE_URL is required")
        }
    }

    /// Controller timing knobs.
    #[derive(Debug, Clone, PartialEq)]
    pub struct LiveOptions {
        /// Local recompute cadence.
        pub tick_ms: u64,

        /// Maximum age of the snapshot before a forced refetch.
        pub stale_threshold_minutes: i64,

        /// Minimum gap between automatic attempts after a failed fetch.
        pub retry_cooldown_secs: i64,
    }

    impl Default for LiveOptions {
        fn default() -> Self {
            Self {
                tick_ms: 1000,
                stale_threshold_minutes: 5,
                retry_cooldown_secs: 10,
            }
        }
    }

    impl LiveOptions {
        pub fn from_env() -> Self {
            let mut out = Self::default();

            if let Ok(s) = std::env::var("LIVE_TICK_MS") {
                if let Ok(n) = s.parse::<u64>() {
                    if n > 0 {
                        out.tick_ms = n;
                    }
                }
            }

            if let Ok(s) = std::env::var("LIVE_STALE_MINUTES") {
                if let Ok(n) = s.parse::<i64>() {
                    out.stale_threshold_minutes = n;
                }
            }

            if let Ok(s) = std::env::var("LIVE_RETRY_COOLDOWN_SECS") {
                if let Ok(n) = s.parse::<i64>() {
                    out.retry_cooldown_secs = n;
                }
            }

            out
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }
}
