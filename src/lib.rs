pub mod config;
pub mod core;
pub mod http;
pub mod stubs;

#[cfg(test)]
mod integration_test;

pub use crate::config::{ClientConfig, PollingConfig};
pub use crate::core::lifecycle::{
    LifecycleEvent, LifecycleSnapshot, Phase, SolutionLifecycleController,
};
pub use crate::http::HttpGradingApi;
