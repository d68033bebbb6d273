//! A library for monitoring the availability of remote endpoints.
//!
//! Targets are probed over HTTP, TCP or ping on their own interval. Status
//! changes and persistent failures raise throttled alerts, shown locally and
//! optionally emailed through an embedded loopback mail relay.

pub mod alerts;
pub mod api;
pub mod config;
pub mod email_templates;
pub mod error;
pub mod mail;
pub mod probe;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod targets;
pub mod utils;
