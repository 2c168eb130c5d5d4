//! Test doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::fetch::{FetchError, FetchMode, Fetcher};
use crate::store::CachedResponse;

enum Script {
    Respond(CachedResponse),
    Unreachable,
}

/// Fetcher that answers from a fixed table and records every call.
/// URLs missing from the table are unreachable.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, FetchMode)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: u16, body: &str) -> Self {
        self.set_response(url, status, body);
        self
    }

    pub fn unreachable(self, url: &str) -> Self {
        self.set_unreachable(url);
        self
    }

    pub fn set_response(&self, url: &str, status: u16, body: &str) {
        self.scripts.lock().unwrap().insert(
            url.to_string(),
            Script::Respond(CachedResponse::new(status, body)),
        );
    }

    pub fn set_unreachable(&self, url: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), Script::Unreachable);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    pub fn modes(&self) -> Vec<FetchMode> {
        self.calls.lock().unwrap().iter().map(|(_, m)| *m).collect()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url, mode: FetchMode) -> Result<CachedResponse, FetchError> {
        self.calls.lock().unwrap().push((url.to_string(), mode));
        match self.scripts.lock().unwrap().get(url.as_str()) {
            Some(Script::Respond(response)) => Ok(response.clone()),
            Some(Script::Unreachable) | None => Err(FetchError::Unreachable {
                url: url.to_string(),
            }),
        }
    }
}
