//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from the platform
//! config directory, falls back to defaults on first run, and writes it back
//! when asked.  There is no other persisted state: the channel and its view
//! live only as long as the process.

pub mod config;
