//! HTTP through the host's capability table.
//!
//! The table is handed over once per load by `nonbiri_extension_init`; every
//! request afterwards goes through the host's transport.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use nonbiri_core::extension::{
    Capabilities, ExtensionError, HttpRequest, HttpResponse, Result,
};

static CAPABILITIES: RwLock<Option<Capabilities>> = parking_lot::const_rwlock(None);

/// Store the host's capability table. Calling it again replaces the table.
pub fn install(capabilities: Capabilities) {
    *CAPABILITIES.write() = Some(capabilities);
    tracing::trace!("Capability table installed");
}

pub fn is_initialized() -> bool {
    CAPABILITIES.read().is_some()
}

fn capabilities() -> Result<Capabilities> {
    CAPABILITIES.read().clone().ok_or_else(|| {
        ExtensionError::Transport("capability table not initialized".to_string())
    })
}

/// Execute a request; any status is returned as-is.
pub fn execute(request: HttpRequest) -> Result<HttpResponse> {
    let capabilities = capabilities()?;
    Ok(capabilities.http().execute(request)?)
}

/// Execute a request, failing on a non-success status.
pub fn send(request: HttpRequest) -> Result<HttpResponse> {
    let url = request.url.clone();
    let response = execute(request)?;
    if !response.is_success() {
        return Err(ExtensionError::Fetch(format!(
            "{} returned status {}",
            url, response.status
        )));
    }
    Ok(response)
}

pub fn get(url: &str) -> Result<HttpResponse> {
    send(HttpRequest::get(url))
}

pub fn get_text(url: &str) -> Result<String> {
    Ok(get(url)?.text())
}

pub fn get_json<T: DeserializeOwned>(url: &str) -> Result<T> {
    let response = get(url)?;
    response
        .json()
        .map_err(|e| ExtensionError::InvalidFormat(format!("{}: {}", url, e)))
}

/// POST a JSON body and decode a JSON reply.
pub fn post_json<T: DeserializeOwned>(url: &str, body: &serde_json::Value) -> Result<T> {
    let request = HttpRequest::post(url, serde_json::to_vec(body)?)
        .header("Content-Type", "application/json");
    send(request)?
        .json()
        .map_err(|e| ExtensionError::InvalidFormat(format!("{}: {}", url, e)))
}
