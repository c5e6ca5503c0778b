//! pooldash-core: Core types and derivations for pooldash
//!
//! This crate turns raw management-API payloads into typed, renderable values:
//! - Device, job, service and template records
//! - Resource and usage aggregation
//! - Namespace quota reduction
//! - Schema-driven template parameter derivation
//! - Log shaping
//! - Configuration and error handling

pub mod config;
pub mod error;
pub mod logs;
pub mod model;
pub mod quota;
pub mod resources;
pub mod template;

pub use config::*;
pub use error::*;
pub use logs::*;
pub use model::*;
pub use quota::*;
pub use resources::*;
pub use template::*;
