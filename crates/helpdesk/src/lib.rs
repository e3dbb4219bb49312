//! Helpdesk request tracking: business-day deadlines, the request lifecycle,
//! and the notification outbox behind the IT support queue.

pub mod config;
pub mod error;
pub mod requests;
pub mod telemetry;
