use accrual_core::progress::{ProgressClient, ProgressTarget};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod watch;

#[derive(Debug, Parser)]
#[command(name = "accrual_worker")]
struct Args {
    /// Track every investment of this user.
    #[arg(long, conflicts_with = "investment_id", required_unless_present = "investment_id")]
    user_id: Option<String>,

    /// Track a single investment.
    #[arg(long)]
    investment_id: Option<String>,

    /// Fetch once, print the estimate as JSON and exit.
    #[arg(long)]
    once: bool,

    /// Stop watching after this many seconds. Runs until ctrl-c when unset.
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Override LIVE_STALE_MINUTES.
    #[arg(long)]
    stale_minutes: Option<i64>,
}

impl Args {
    fn target(&self) -> anyhow::Result<ProgressTarget> {
        match (&self.user_id, &self.investment_id) {
            (Some(id), None) => Ok(ProgressTarget::User(id.clone())),
            (None, Some(id)) => Ok(ProgressTarget::Investment(id.clone())),
            _ => anyhow::bail!("exactly one of --user-id or --investment-id is required"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = accrual_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let target = args.target()?;

    let mut options = accrual_core::config::LiveOptions::from_env();
    if let Some(minutes) = args.stale_minutes {
        options.stale_threshold_minutes = minutes;
    }

    let client: Arc<dyn ProgressClient> = Arc::new(
        accrual_core::progress::http::HttpProgressClient::from_settings(&settings)?,
    );

    let res = if args.once {
        run_once(client.as_ref(), &target).await
    } else {
        watch::run(client, target, options, args.duration_secs).await
    };

    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %err, "accrual worker failed");
    }
    res
}

async fn run_once(client: &dyn ProgressClient, target: &ProgressTarget) -> anyhow::Result<()> {
    let now = chrono::Utc::now();
    let investments = client
        .fetch_progress(target)
        .await
        .with_context(|| format!("fetch progress for {target} failed"))?;

    let snapshot = accrual_core::domain::window::AggregateInterestSnapshot::new(investments, now);
    let views: Vec<_> = snapshot
        .investments
        .iter()
        .map(|i| accrual_core::domain::view::InvestmentProgressView::from_investment(i, now))
        .collect();

    let out = serde_json::json!({
        "target": target.to_string(),
        "as_of": now,
        "animated_interest": accrual_core::time::accrual::round_currency(snapshot.animated_interest(now)),
        "total_interest": accrual_core::time::accrual::round_currency(snapshot.total_interest()),
        "completed": snapshot.is_fully_completed(),
        "investments": views,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    tracing::info!(subject = %target, investments = views.len(), "one-shot estimate printed");
    Ok(())
}

fn init_sentry(settings: &accrual_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
