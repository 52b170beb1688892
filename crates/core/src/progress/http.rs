use crate::config::Settings;
use crate::domain::contract::ProgressPayload;
use crate::domain::window::TrackedInvestment;
use crate::progress::error::ProgressFetchError;
use crate::progress::{ProgressClient, ProgressTarget};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use std::time::Duration;

const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone)]
pub struct HttpProgressClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    user_path: String,
    investment_path: String,
}

impl HttpProgressClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_progress_api_base_url()?.to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.progress_timeout_secs))
            .build()
            .context("failed to build progress http client")?;

        Ok(Self {
            http,
            base_url,
            api_token: settings.progress_api_token.clone(),
            user_path: settings.progress_user_path.clone(),
            investment_path: settings.progress_investment_path.clone(),
        })
    }

    fn url(&self, target: &ProgressTarget) -> String {
        let template = match target {
            ProgressTarget::User(_) => &self.user_path,
            ProgressTarget::Investment(_) => &self.investment_path,
        };
        let path = template.replace(ID_PLACEHOLDER, target.id());
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.api_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .context("PROGRESS_API_TOKEN is not a valid header value")?,
            );
        }
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl ProgressClient for HttpProgressClient {
    fn client_name(&self) -> &'static str {
        "http_json"
    }

    async fn fetch_progress(&self, target: &ProgressTarget) -> Result<Vec<TrackedInvestment>> {
        let url = self.url(target);
        let headers = self.headers()?;

        let res = self
            .http
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ProgressFetchError::transport(e.to_string()))
            .with_context(|| format!("GET {url}"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| ProgressFetchError::transport(e.to_string()))
            .context("failed to read progress response")?;

        let investments = decode_response(status.as_u16(), &text)?;
        tracing::debug!(subject = %target, investments = investments.len(), "progress fetched");
        Ok(investments)
    }
}

/// Maps a raw HTTP response onto tracked investments.
pub fn decode_response(status: u16, body: &str) -> Result<Vec<TrackedInvestment>> {
    if !(200..300).contains(&status) {
        let detail: String = body.trim().chars().take(512).collect();
        return Err(ProgressFetchError::http(status, detail).into());
    }

    let value = serde_json::from_str::<serde_json::Value>(body)
        .map_err(|e| ProgressFetchError::decode(e.to_string()))?;
    ProgressPayload::from_value(value)
        .and_then(ProgressPayload::into_investments)
        .map_err(|e| ProgressFetchError::decode(format!("{e:#}")).into())
}
