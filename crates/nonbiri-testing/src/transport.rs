//! Scripted HTTP transport.

use std::collections::HashMap;

use nonbiri_core::extension::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use parking_lot::{Mutex, RwLock};

#[derive(Debug, Clone)]
enum Route {
    Respond { status: u16, body: Vec<u8> },
    Timeout,
}

/// [`HttpTransport`] answering from a URL table. Unknown URLs get a 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: RwLock<HashMap<String, Route>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) {
        self.routes.write().insert(
            url.into(),
            Route::Respond {
                status,
                body: body.into(),
            },
        );
    }

    /// Make requests to `url` time out.
    pub fn timeout(&self, url: impl Into<String>) {
        self.routes.write().insert(url.into(), Route::Timeout);
    }

    /// Total requests executed.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests executed against `url`.
    pub fn requests_to(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|u| *u == url).count()
    }
}

impl HttpTransport for MockTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.url.clone());

        let route = self.routes.read().get(&request.url).cloned();
        match route {
            Some(Route::Respond { status, body }) => Ok(HttpResponse {
                status,
                url: request.url,
                headers: Vec::new(),
                body,
            }),
            Some(Route::Timeout) => Err(TransportError::Timeout(request.url)),
            None => Ok(HttpResponse {
                status: 404,
                url: request.url,
                headers: Vec::new(),
                body: Vec::new(),
            }),
        }
    }
}
