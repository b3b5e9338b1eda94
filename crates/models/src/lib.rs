//! Model catalog and the process-wide active-variant selector.

pub mod registry;

pub use registry::{Capability, ModelRegistry, ModelVariant};
