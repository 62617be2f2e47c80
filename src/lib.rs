pub mod app;
pub mod archive;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod index;
pub mod manifest;
pub mod output;
pub mod progress;
pub mod prompt;
pub mod resolve;
pub mod store;
