//! Blocking HTTP transport over a JSON records endpoint.
//!
//! `GET <base_url>` returns a JSON array of records; `POST <base_url>` takes
//! one record body. Retries are left to the engine's next scheduled tick.

use super::transport::{decode_remote_payload, RemoteTransport, TransportError, TransportResult};
use crate::config::RemoteConfig;
use crate::model::record::Record;
use log::debug;
use reqwest::blocking::Client;
use std::time::Duration;

/// `RemoteTransport` backed by `reqwest`'s blocking client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Builds a transport for `config.base_url` with the configured timeout.
    pub fn new(config: &RemoteConfig) -> TransportResult<Self> {
        let base_url = config.base_url.trim().to_string();
        if base_url.is_empty() {
            return Err(TransportError::Unavailable(
                "remote base url is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl RemoteTransport for HttpTransport {
    fn fetch_all(&self) -> TransportResult<Vec<Record>> {
        let response = self
            .client
            .get(&self.base_url)
            .send()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        debug!(
            "event=remote_fetch module=sync status=ok bytes={}",
            body.len()
        );
        decode_remote_payload(&body)
    }

    fn post(&self, record: &Record) -> TransportResult<()> {
        let response = self
            .client
            .post(&self.base_url)
            .json(record)
            .send()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
