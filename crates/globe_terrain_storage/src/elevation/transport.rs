use super::TransportError;

use auto_impl::auto_impl;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::error::Error;
use std::time::Duration;

/// Carries one binary request to the elevation server and returns the raw reply.
#[auto_impl(&, Box, Arc)]
pub trait ElevationTransport: Send + Sync {
    fn post(&self, body: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// Posts requests over HTTP with a blocking `reqwest` client.
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(classify)?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ElevationTransport for HttpTransport {
    fn post(&self, body: &[u8]) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body.to_vec())
            .send()
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let bytes = response.bytes().map_err(classify)?;

        Ok(bytes.to_vec())
    }
}

// Linux errno values.
const ENETUNREACH: i32 = 101;
const EHOSTUNREACH: i32 = 113;

fn classify(e: reqwest::Error) -> TransportError {
    if is_unreachable(&e) {
        TransportError::Unreachable(e.to_string())
    } else if e.is_connect() || e.is_timeout() {
        TransportError::Transient(e.to_string())
    } else {
        TransportError::Io(e.to_string())
    }
}

/// Unknown hosts and missing routes won't get better by retrying.
fn is_unreachable(e: &reqwest::Error) -> bool {
    std::iter::successors(Some(e as &(dyn Error + 'static)), |&e| e.source()).any(|cause| {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if matches!(io.raw_os_error(), Some(ENETUNREACH) | Some(EHOSTUNREACH)) {
                return true;
            }
        }
        let message = cause.to_string();

        message.contains("dns error") || message.contains("failed to lookup address")
    })
}
