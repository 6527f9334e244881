//! Apexlogs: terminal browser for Salesforce Apex logs that keeps the debug trace flag alive.

pub mod apexlogs_api;
pub mod apexlogs_trace;
pub mod apexlogs_tui;
pub mod apexlogs_worker;
mod cli;
mod colors;
mod sanitize;

pub use cli::{run, DynError};
