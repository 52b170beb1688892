use accrual_core::live::{LiveHandle, LiveView, SystemClock};
use accrual_core::progress::{ProgressClient, ProgressTarget};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

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

    let live = match start_controller(&settings) {
        Ok(handle) => Some(Arc::new(handle)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "live controller not started; serving in degraded mode");
            None
        }
    };
    let controller_shutdown = live.as_ref().map(|h| h.shutdown_token());

    let state = AppState { live };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(token) = controller_shutdown {
        token.cancel();
    }

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/live", get(get_live))
        .route("/refresh", post(post_refresh))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn start_controller(settings: &accrual_core::config::Settings) -> anyhow::Result<LiveHandle> {
    let target = resolve_target(
        std::env::var("PROGRESS_USER_ID").ok(),
        std::env::var("PROGRESS_INVESTMENT_ID").ok(),
    )?;
    let client: Arc<dyn ProgressClient> = Arc::new(
        accrual_core::progress::http::HttpProgressClient::from_settings(settings)?,
    );
    let options = accrual_core::config::LiveOptions::from_env();

    Ok(accrual_core::live::spawn_live_controller(
        client,
        target,
        options,
        Arc::new(SystemClock),
    ))
}

fn resolve_target(
    user_id: Option<String>,
    investment_id: Option<String>,
) -> anyhow::Result<ProgressTarget> {
    let user_id = user_id.filter(|s| !s.trim().is_empty());
    let investment_id = investment_id.filter(|s| !s.trim().is_empty());
    match (user_id, investment_id) {
        (Some(id), None) => Ok(ProgressTarget::User(id)),
        (None, Some(id)) => Ok(ProgressTarget::Investment(id)),
        (Some(_), Some(_)) => {
            anyhow::bail!("set only one of PROGRESS_USER_ID or PROGRESS_INVESTMENT_ID")
        }
        (None, None) => anyhow::bail!("PROGRESS_USER_ID or PROGRESS_INVESTMENT_ID is required"),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    live: Option<Arc<LiveHandle>>,
}

async fn get_live(State(state): State<AppState>) -> Result<Json<LiveView>, StatusCode> {
    let Some(live) = &state.live else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    Ok(Json(live.current().view()))
}

async fn post_refresh(State(state): State<AppState>) -> StatusCode {
    let Some(live) = &state.live else {
        return StatusCode::SERVICE_UNAVAILABLE;
    };
    if live.refresh() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
