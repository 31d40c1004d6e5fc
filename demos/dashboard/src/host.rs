//! Page stand-ins for a terminal: script fetching and a URL bar

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};
use weathermap::{BoxFuture, Navigator, ScriptHost, ScriptLoadError};

/// Fetches widget scripts over HTTP instead of inserting them into a page.
#[derive(Debug, Clone, Default)]
pub struct HttpScriptHost {
    client: reqwest::Client,
}

impl HttpScriptHost {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<(), ScriptLoadError> {
        let network = |e: reqwest::Error| ScriptLoadError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };
        let body = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(network)?
            .bytes()
            .await
            .map_err(network)?;
        debug!(url, bytes = body.len(), "Script fetched");
        Ok(())
    }
}

impl ScriptHost for HttpScriptHost {
    fn insert_script<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<(), ScriptLoadError>> {
        Box::pin(self.fetch(url))
    }
}

/// URL bar printed to stdout on every replace.
#[derive(Debug, Default)]
pub struct StdoutNavigator {
    query: Mutex<String>,
}

impl StdoutNavigator {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Mutex::new(query.into()),
        }
    }

    /// Jump to another entry, as back/forward would.
    pub fn navigate(&self, query: &str) -> String {
        let query = normalize(query);
        *self.query.lock().unwrap_or_else(PoisonError::into_inner) = query.clone();
        query
    }
}

fn normalize(query: &str) -> String {
    format!("?{}", query.trim().trim_start_matches('?'))
}

impl Navigator for StdoutNavigator {
    fn query(&self) -> String {
        self.query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_query(&self, query: &str) {
        *self.query.lock().unwrap_or_else(PoisonError::into_inner) = query.to_string();
        info!(query, "URL replaced");
        println!("url  {}", query);
    }
}
