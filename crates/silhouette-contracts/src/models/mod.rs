mod registry;
mod selectors;

pub use registry::{Capability, ModelRef, ModelRegistry, ModelSpec, PollPolicy, ProviderKind};
pub use selectors::{ModelSelection, ModelSelector};
