//! Core domain + application logic for the school platform notifier.
//!
//! This crate is intentionally framework-agnostic. Telegram and the platform's
//! HTTP API live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod diff;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod fetcher;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod monitor;
pub mod poll;
pub mod ports;
pub mod security;
pub mod session;
pub mod settings;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, Result};
