pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod http_api;
pub mod navigator;
pub mod normalizer;
pub mod progress_client;
pub mod progress_store;
pub mod script;
pub mod server_protocol;
pub mod server_utils;
pub mod timer;
pub mod types;
