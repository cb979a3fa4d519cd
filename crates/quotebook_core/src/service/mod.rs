//! Core use-case services.
//!
//! # Responsibility
//! - Own record and session state behind plain operations.
//! - Keep UI layers decoupled from storage details.

pub mod interchange;
pub mod record_store;
pub mod session;
