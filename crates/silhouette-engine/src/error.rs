use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobError>;

/// Failures of the submit/poll/extract pipeline.
#[derive(Error, Debug)]
pub enum JobError {
    /// A required credential or setting is absent.
    #[error("{0}")]
    Configuration(String),

    /// Caller input rejected before any network call.
    #[error("{0}")]
    Validation(String),

    /// The provider answered with a non-success HTTP status.
    #[error("{provider} request failed ({status}): {body}")]
    UpstreamRequest {
        provider: String,
        status: u16,
        body: String,
    },

    /// The request never produced an HTTP status.
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered, but not with something we can read.
    #[error("{provider} returned an unreadable payload: {reason}")]
    InvalidPayload { provider: String, reason: String },

    /// The job reached `failed` (or `canceled`); carries the provider's text.
    #[error("{detail}")]
    UpstreamJobFailure { id: String, detail: String },

    #[error("prediction {id} did not finish after {attempts} status checks")]
    UpstreamTimeout { id: String, attempts: u32 },

    #[error("prediction {id} succeeded without a result URL")]
    ResultMissing { id: String },

    #[error("polling for prediction {id} was cancelled")]
    Cancelled { id: String },
}

impl JobError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transport(provider: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            provider: provider.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::UpstreamRequest { .. } => "upstream_request",
            Self::Transport { .. } => "transport",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::UpstreamJobFailure { .. } => "upstream_job_failure",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::ResultMissing { .. } => "result_missing",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Errors caused by the caller's input rather than the provider.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Validation(_))
    }

    /// Errors raised by the provider side of the pipeline.
    pub fn is_upstream(&self) -> bool {
        !self.is_client_error() && !matches!(self, Self::Cancelled { .. })
    }
}
