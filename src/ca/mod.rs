pub mod config;
pub mod service;

pub use config::{CaConfig, HumanDuration};
pub use service::CaService;
