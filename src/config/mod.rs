// src/config/mod.rs
pub mod monitor;

pub use monitor::{AlertConfig, MonitorConfig, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH};
