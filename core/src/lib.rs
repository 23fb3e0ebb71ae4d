//! Core library for the Yijing desktop app: user preferences, the local
//! Ollama connection and AI readings of cast hexagrams.
//!
//! - [`settings`] keeps the preference store and its key/value persistence.
//! - [`ai`] talks to Ollama and builds the interpretation prompt.
//! - [`interpreter`] runs readings and records them in the event log.
//! - [`db`] initialises the SQLite workspace and applies migrations.
//! - [`errors`] keeps the central error catalogue with human friendly metadata.
//! - [`logging`] writes structured diagnostics to the event log table.

pub mod ai;
pub mod db;
pub mod errors;
pub mod interpreter;
pub mod logging;
pub mod settings;

pub use errors::{Result, YijingError};
