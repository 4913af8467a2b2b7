//! # dmcast Jobs
//! Batch-send job state, the in-memory job registry, the sequential send
//! controller, and the service facade the invoking layer talks to.

pub mod controller;
pub mod job;
pub mod service;
pub mod store;

pub use job::{Job, JobStatus, SendErrorRecord};
pub use service::{ImportOutcome, PreviewOutcome, SendService};
pub use store::JobStore;
