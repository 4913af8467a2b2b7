//! # dmcast Core
//! Shared domain types, configuration, the message template engine, and the
//! upload importer.

pub mod config;
pub mod error;
pub mod importer;
pub mod template;
pub mod types;
