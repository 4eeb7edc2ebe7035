pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod patterns;
pub mod pipeline;
pub mod structs;
pub mod utils;

pub use engine::{EngineConfig, FlowEngine};
pub use error::{Error, Result};
pub use structs::{EnhancedFlowRecord, FlowRecord};
