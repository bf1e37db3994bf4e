pub mod jobs;
pub mod models;
pub mod prompt;
pub mod providers;
