use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Transport,
    Http,
    Decode,
}

impl FetchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Http => "http",
            Self::Decode => "decode",
        }
    }
}

/// Failure reaching the progress endpoint or reading a usable answer from it.
#[derive(Debug, Clone)]
pub struct ProgressFetchError {
    pub stage: FetchStage,
    pub status: Option<u16>,
    pub detail: String,
}

impl ProgressFetchError {
    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            stage: FetchStage::Transport,
            status: None,
            detail: detail.into(),
        }
    }

    pub fn http(status: u16, detail: impl Into<String>) -> Self {
        Self {
            stage: FetchStage::Http,
            status: Some(status),
            detail: detail.into(),
        }
    }

    pub fn decode(detail: impl Into<String>) -> Self {
        Self {
            stage: FetchStage::Decode,
            status: None,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ProgressFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "progress fetch failed (stage={}, status={status}): {}",
                self.stage.as_str(),
                self.detail
            ),
            None => write!(
                f,
                "progress fetch failed (stage={}): {}",
                self.stage.as_str(),
                self.detail
            ),
        }
    }
}

impl std::error::Error for ProgressFetchError {}
