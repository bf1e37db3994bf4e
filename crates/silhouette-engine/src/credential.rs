use std::fmt;

use crate::error::{JobError, Result};

pub const REPLICATE_TOKEN_PREFIX: &str = "r8_";

/// A Replicate API token that passed the prefix check.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(JobError::configuration("Replicate API token is missing"));
        }
        if !trimmed.starts_with(REPLICATE_TOKEN_PREFIX) || trimmed.len() == REPLICATE_TOKEN_PREFIX.len()
        {
            return Err(JobError::validation(format!(
                "Replicate API token must start with {REPLICATE_TOKEN_PREFIX}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The request's own token wins; otherwise the server default.
    pub fn resolve(requested: Option<&str>, fallback: Option<&Credential>) -> Result<Self> {
        match requested.map(str::trim).filter(|value| !value.is_empty()) {
            Some(raw) => Self::parse(raw),
            None => fallback.cloned().ok_or_else(|| {
                JobError::configuration(
                    "Replicate API token is missing; send one with the request or set REPLICATE_API_TOKEN",
                )
            }),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({REPLICATE_TOKEN_PREFIX}****)")
    }
}
