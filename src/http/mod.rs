pub mod client;

pub use client::HttpGradingApi;
