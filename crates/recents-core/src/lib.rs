pub mod config;
pub mod filter;
pub mod host;
pub mod logging;
pub mod models;
pub mod orchestration;

pub use config::{RecentsConfig, SharedConfig};
pub use orchestration::{LoadRequest, RecentsLoadPipeline};
