use crate::domain::window::{InvestmentTimeWindow, TrackedInvestment};
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Progress endpoint payload split into per-record JSON values. Accepts a bare array, an
/// `{ "investments": [...] }` / `{ "data": [...] }` envelope, or a single record object.
#[derive(Debug, Clone)]
pub struct ProgressPayload {
    records: Vec<Value>,
}

/// Loosely typed server record. Everything is optional here; `validate_and_into_investment`
/// applies the fallback policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProgressRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, rename = "_id")]
    pub document_id: Option<Value>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub start_date: Option<Value>,
    #[serde(default)]
    pub end_date: Option<Value>,
    #[serde(default)]
    pub total_interest: Option<Value>,
    #[serde(default)]
    pub is_completed: Option<Value>,
}

const ENVELOPE_KEYS: [&str; 2] = ["investments", "data"];

impl ProgressPayload {
    /// Fails when the body is none of the accepted shapes, e.g. a `{ "success": false }`
    /// error object served with a 2xx status.
    pub fn from_value(body: Value) -> anyhow::Result<Self> {
        let records = match body {
            Value::Array(records) => records,
            Value::Object(mut map) => {
                match ENVELOPE_KEYS.iter().find_map(|key| map.remove(*key)) {
                    Some(Value::Array(records)) => records,
                    Some(inner) if looks_like_record(&inner) => vec![inner],
                    Some(inner) => bail!("progress envelope holds no records: {}", kind(&inner)),
                    None => {
                        let single = Value::Object(map);
                        if !looks_like_record(&single) {
                            bail!("progress payload is not an investment record or list");
                        }
                        vec![single]
                    }
                }
            }
            other => bail!("unsupported progress payload: {}", kind(&other)),
        };
        Ok(Self { records })
    }

    /// Malformed records are dropped with a warning; the rest are kept. An empty list stays
    /// empty, but a non-empty list in which every record was dropped is an error.
    pub fn into_investments(self) -> anyhow::Result<Vec<TrackedInvestment>> {
        let received = self.records.len();
        let mut out = Vec::with_capacity(received);
        for (idx, value) in self.records.into_iter().enumerate() {
            let parsed = if value.is_object() {
                serde_json::from_value::<RawProgressRecord>(value)
                    .context("record does not match the progress schema")
                    .and_then(RawProgressRecord::validate_and_into_investment)
            } else {
                Err(anyhow::anyhow!("record is {}, not an object", kind(&value)))
            };
            match parsed {
                Ok(investment) => out.push(investment),
                Err(err) => {
                    tracing::warn!(
                        idx,
                        error = %format!("{err:#}"),
                        "dropping malformed progress record"
                    );
                }
            }
        }

        if received > 0 && out.is_empty() {
            bail!("all {received} progress records were malformed");
        }
        Ok(out)
    }
}

impl RawProgressRecord {
    pub fn validate_and_into_investment(self) -> anyhow::Result<TrackedInvestment> {
        let id = self
            .id
            .as_ref()
            .and_then(id_string)
            .or_else(|| self.document_id.as_ref().and_then(id_string));

        let start_date = parse_timestamp(self.start_date.as_ref()).context("invalid startDate")?;
        let end_date = parse_timestamp(self.end_date.as_ref()).context("invalid endDate")?;

        let total_interest = match self.total_interest.as_ref().and_then(coerce_number) {
            Some(v) if v >= 0.0 => v,
            other => {
                tracing::warn!(
                    id = id.as_deref().unwrap_or("-"),
                    total_interest = ?other,
                    "totalInterest missing or invalid; using 0"
                );
                0.0
            }
        };

        let amount = self.amount.as_ref().and_then(coerce_number);
        let is_completed = self
            .is_completed
            .as_ref()
            .and_then(coerce_flag)
            .unwrap_or(false);

        let window = InvestmentTimeWindow {
            start_date,
            end_date,
            total_interest,
            is_completed,
        };
        if window.is_malformed() {
            tracing::warn!(
                id = id.as_deref().unwrap_or("-"),
                start_date = %start_date,
                end_date = %end_date,
                "window ends at or before its start; shown as fully accrued"
            );
        }

        Ok(TrackedInvestment { id, amount, window })
    }
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn looks_like_record(v: &Value) -> bool {
    v.get("startDate").is_some() || v.get("endDate").is_some()
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Booleans or `"true"` / `"false"` strings.
fn coerce_flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Numbers or numeric strings; non-finite values are rejected.
fn coerce_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_timestamp(v: Option<&Value>) -> anyhow::Result<DateTime<Utc>> {
    match v {
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            // Offset-less timestamps are taken as UTC.
            let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .with_context(|| format!("not an ISO-8601 timestamp: {s}"))?;
            Ok(naive.and_utc())
        }
        Some(Value::Number(n)) => {
            let millis = n.as_i64().context("epoch millis must be an integer")?;
            DateTime::from_timestamp_millis(millis).context("epoch millis out of range")
        }
        Some(other) => bail!("unsupported timestamp value: {other}"),
        None => bail!("timestamp is missing"),
    }
}
