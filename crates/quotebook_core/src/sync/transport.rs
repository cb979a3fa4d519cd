//! Remote transport contract used by the sync engine.
//!
//! # Responsibility
//! - Define the `fetch_all`/`post` boundary to a remote source of truth.
//! - Classify transport failures for status reporting.
//!
//! # Invariants
//! - Transports never mutate local state.
//! - Endpoint addressing is transport configuration, not part of the contract.

use crate::model::record::Record;
use crate::service::interchange::record_from_value;
use log::warn;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TransportResult<T> = Result<T, TransportError>;

/// Remote transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, DNS, TLS or timeout failure.
    Network(String),
    /// Non-2xx response.
    Status { code: u16, body: String },
    /// Response body could not be decoded.
    Malformed(String),
    /// Transport is not configured or not compiled in.
    Unavailable(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(reason) => write!(f, "network error: {reason}"),
            Self::Status { code, body } if body.is_empty() => write!(f, "http status {code}"),
            Self::Status { code, body } => write!(f, "http status {code}: {body}"),
            Self::Malformed(reason) => write!(f, "malformed remote payload: {reason}"),
            Self::Unavailable(reason) => write!(f, "transport unavailable: {reason}"),
        }
    }
}

impl Error for TransportError {}

/// Fetch/post abstraction over the remote record source.
pub trait RemoteTransport {
    /// Fetches the full remote collection.
    fn fetch_all(&self) -> TransportResult<Vec<Record>>;
    /// Sends one local record upstream.
    fn post(&self, record: &Record) -> TransportResult<()>;
}

/// Transport used when no remote endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTransport;

impl RemoteTransport for DisabledTransport {
    fn fetch_all(&self) -> TransportResult<Vec<Record>> {
        Err(TransportError::Unavailable(
            "no remote endpoint configured".to_string(),
        ))
    }

    fn post(&self, _record: &Record) -> TransportResult<()> {
        Err(TransportError::Unavailable(
            "no remote endpoint configured".to_string(),
        ))
    }
}

/// Decodes a remote JSON array of records.
///
/// Elements without an `id` or failing the shape check are skipped; a
/// missing `lastModified` reads as `0` so local versions win ties.
///
/// # Errors
/// - `Malformed` when the body is not a JSON array.
pub fn decode_remote_payload(body: &[u8]) -> TransportResult<Vec<Record>> {
    let elements = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Array(elements)) => elements,
        Ok(_) => return Err(TransportError::Malformed("expected a json array".to_string())),
        Err(err) => return Err(TransportError::Malformed(err.to_string())),
    };

    let offered = elements.len();
    let records: Vec<Record> = elements
        .into_iter()
        .filter(|element| element.get("id").is_some_and(|id| !id.is_null()))
        .filter_map(|element| record_from_value(element, 0))
        .collect();

    if records.len() < offered {
        warn!(
            "event=remote_decode module=sync status=ok kept={} skipped={}",
            records.len(),
            offered - records.len()
        );
    }
    Ok(records)
}
