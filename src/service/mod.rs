//! Service facade for the resilient generation pipeline.
//!
//! Developer-friendly goal: keep the public surface small and predictable.
//! Implementation details are split into submodules under `src/service/`.

mod builder;
mod core;
mod fallbacks;

pub use builder::{GenerationServiceBuilder, ServiceConfig};
pub use core::{GenerationService, SystemStatus};
pub use fallbacks::{CachedResultFallback, SentinelFallback, TemplateFallback, UNAVAILABLE_MESSAGE};
