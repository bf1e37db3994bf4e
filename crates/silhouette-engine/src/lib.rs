//! Replicate-backed silhouette generation: prediction submit/poll,
//! background removal with graceful degradation, and the HTTP service.

pub mod adapters;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod poll;
pub mod removal;
pub mod service;
pub mod studio;

#[cfg(test)]
mod testing;

pub use client::{PredictionApi, ReplicateClient};
pub use config::ServiceConfig;
pub use credential::Credential;
pub use error::JobError;
pub use removal::{BackgroundRemover, RemovalOutcome};
pub use studio::{GenerateInput, Generated, SilhouetteInput, SilhouetteResult, Studio};
