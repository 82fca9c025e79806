//! Request processing pipeline.

mod cache;
mod processor;
mod request;

pub use cache::{EngineCache, EngineLease};
pub use processor::{EnhancementResult, Enhancer, Stage, encode_jpeg};
pub use request::{EnhancementRequest, RequestLimits, ValidatedRequest};
