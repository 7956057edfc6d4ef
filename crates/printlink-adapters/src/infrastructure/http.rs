//! Shared HTTP plumbing for the REST adapters.
//!
//! OctoPrint and Moonraker differ only in paths, JSON shapes, and the auth
//! header.  Both build one `reqwest::Client` on `connect()` with the auth
//! header installed as a default header and a flat per-request timeout, then
//! funnel every request through [`send`] / [`send_json`] so that a non-2xx
//! answer always becomes [`AdapterError::HttpStatus`].

use std::path::Path;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use crate::application::adapter::AdapterError;

/// Per-request timeout used when the config does not override it.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds a client that sends `auth` (if any) on every request.
///
/// # Errors
///
/// [`AdapterError::InvalidArgument`] if the header value contains bytes
/// HTTP forbids; [`AdapterError::Http`] if the TLS backend fails to load.
pub fn build_client(
    timeout: Duration,
    auth: Option<(HeaderName, String)>,
) -> Result<Client, AdapterError> {
    let mut headers = HeaderMap::new();
    if let Some((name, value)) = auth {
        let mut value = HeaderValue::from_str(&value).map_err(|_| {
            AdapterError::InvalidArgument(format!("{name} contains invalid characters"))
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }
    Ok(Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

/// Sends the request and rejects any non-success status.
pub async fn send(request: RequestBuilder) -> Result<Response, AdapterError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AdapterError::HttpStatus {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

/// Sends the request and parses the body as JSON.
pub async fn send_json(request: RequestBuilder) -> Result<Value, AdapterError> {
    Ok(send(request).await?.json::<Value>().await?)
}

/// Builds a multipart form whose `file` part carries the bytes of `local`
/// under `remote_name`, plus any extra text fields.
///
/// # Errors
///
/// [`AdapterError::Io`] if `local` cannot be read.
pub async fn file_form(
    local: &Path,
    remote_name: &str,
    fields: &[(&'static str, &str)],
) -> Result<Form, AdapterError> {
    let bytes = tokio::fs::read(local)
        .await
        .map_err(|e| AdapterError::io(local, e))?;
    let part = Part::bytes(bytes)
        .file_name(remote_name.to_string())
        .mime_str("application/octet-stream")?;
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(*name, value.to_string());
    }
    Ok(form.part("file", part))
}

/// The client slot each REST adapter keeps between `connect()` and
/// `disconnect()`.
///
/// The lock only guards a clone of the client (a cheap `Arc` bump), so it is
/// a plain `std` lock and never held across an `.await`.
#[derive(Default)]
pub struct ClientSlot(RwLock<Option<Client>>);

impl ClientSlot {
    pub fn get(&self) -> Option<Client> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, client: Client) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
    }

    /// Drops the client; returns whether one was present.
    pub fn clear(&self) -> bool {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn is_set(&self) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// The live client, or [`AdapterError::NotConnected`].
    pub fn require(&self) -> Result<Client, AdapterError> {
        self.get().ok_or(AdapterError::NotConnected)
    }
}

/// Reads a JSON number at `pointer`, treating `null` and absence as `0.0`.
pub fn number_at(value: &Value, pointer: &str) -> f64 {
    value.pointer(pointer).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Reads a non-empty JSON string at `pointer`.
pub fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
