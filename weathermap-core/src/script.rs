//! Process-wide external script loader
//!
//! Every distinct script URL is inserted into the page at most once while it
//! succeeds or is in flight:
//! - Concurrent `load` calls for the same URL wait on one in-flight insertion
//!   and all see its result, success or failure
//! - A successful load is cached for the lifetime of the loader (all clones)
//! - A failed load is not cached; the next call inserts the script again
//!
//! # Example
//!
//! ```ignore
//! let loader = ScriptLoader::new(Arc::new(host), Duration::from_secs(20));
//!
//! // Two mounts share one loader: the second load is answered from the cache.
//! loader.load("https://api.windy.com/assets/map-forecast/libBoot.js").await?;
//! loader.clone().load("https://api.windy.com/assets/map-forecast/libBoot.js").await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::load_state::LoadState;
use crate::BoxFuture;

/// Error loading a required external script
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptLoadError {
    Network { url: String, message: String },
    Timeout { url: String },
}

impl ScriptLoadError {
    pub fn url(&self) -> &str {
        match self {
            ScriptLoadError::Network { url, .. } | ScriptLoadError::Timeout { url } => url,
        }
    }
}

impl fmt::Display for ScriptLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptLoadError::Network { url, message } => {
                write!(f, "Failed to load script {}: {}", url, message)
            }
            ScriptLoadError::Timeout { url } => write!(f, "Timed out loading script {}", url),
        }
    }
}

impl std::error::Error for ScriptLoadError {}

/// The page side of script loading.
///
/// `insert_script` adds one script-loading directive for `url` and resolves
/// once the script has executed (or failed to load).
pub trait ScriptHost: Send + Sync {
    fn insert_script<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<(), ScriptLoadError>>;
}

/// Result of an attempt; `None` while it is still running.
type Outcome = Option<Result<(), ScriptLoadError>>;

#[derive(Debug, Default)]
enum Attempt {
    #[default]
    Idle,
    Loading(watch::Receiver<Outcome>),
    Loaded,
    Failed(ScriptLoadError),
}

#[derive(Debug, Default)]
struct ScriptEntry {
    attempt: Mutex<Attempt>,
}

impl ScriptEntry {
    fn attempt(&self) -> MutexGuard<'_, Attempt> {
        self.attempt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> LoadState<(), ScriptLoadError> {
        match &*self.attempt() {
            Attempt::Idle => LoadState::NotStarted,
            Attempt::Loading(_) => LoadState::Loading,
            Attempt::Loaded => LoadState::Ready(()),
            Attempt::Failed(error) => LoadState::Failed(error.clone()),
        }
    }
}

struct LoaderInner {
    host: Arc<dyn ScriptHost>,
    timeout: Duration,
    entries: Mutex<HashMap<String, Arc<ScriptEntry>>>,
}

/// URL-keyed script cache with reference semantics.
///
/// Clones share the same cache; create one per process (or per page) and
/// hand clones to every map mount.
#[derive(Clone)]
pub struct ScriptLoader {
    inner: Arc<LoaderInner>,
}

impl fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ScriptLoader")
            .field("timeout", &self.inner.timeout)
            .field("urls", &entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ScriptLoader {
    /// Create a loader inserting scripts through `host`.
    ///
    /// Each insertion attempt is bounded by `timeout`.
    pub fn new(host: Arc<dyn ScriptHost>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                host,
                timeout,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn entry(&self, url: &str) -> Arc<ScriptEntry> {
        let mut entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.entry(url.to_string()).or_default().clone()
    }

    /// Load `url`, sharing any in-flight load and reusing a cached success.
    ///
    /// Every caller joining an attempt gets that attempt's result. Only a call
    /// made after a failed attempt finished starts a new one.
    pub async fn load(&self, url: &str) -> Result<(), ScriptLoadError> {
        let entry = self.entry(url);
        let mut outcome = {
            let mut attempt = entry.attempt();
            match &*attempt {
                Attempt::Loaded => {
                    debug!(url, "Script already loaded");
                    return Ok(());
                }
                Attempt::Loading(outcome) => {
                    debug!(url, "Joining in-flight script load");
                    outcome.clone()
                }
                Attempt::Idle | Attempt::Failed(_) => {
                    let (done, outcome) = watch::channel(None);
                    *attempt = Attempt::Loading(outcome.clone());
                    self.spawn_insert(url, entry.clone(), done);
                    outcome
                }
            }
        };

        let finished = outcome
            .wait_for(Option::is_some)
            .await
            .map(|outcome| (*outcome).clone());
        match finished {
            Ok(Some(result)) => result,
            Ok(None) | Err(_) => {
                // The inserting task died without reporting.
                let error = ScriptLoadError::Network {
                    url: url.to_string(),
                    message: "load abandoned".to_string(),
                };
                let mut attempt = entry.attempt();
                if matches!(&*attempt, Attempt::Loading(_)) {
                    *attempt = Attempt::Failed(error.clone());
                }
                Err(error)
            }
        }
    }

    /// Run one insertion attempt detached from the callers waiting on it.
    fn spawn_insert(&self, url: &str, entry: Arc<ScriptEntry>, done: watch::Sender<Outcome>) {
        let inner = self.inner.clone();
        let url = url.to_string();
        info!(url = %url, "Inserting script");

        tokio::spawn(async move {
            let inserted = tokio::time::timeout(inner.timeout, inner.host.insert_script(&url))
                .await
                .unwrap_or_else(|_| Err(ScriptLoadError::Timeout { url: url.clone() }));

            match &inserted {
                Ok(()) => *entry.attempt() = Attempt::Loaded,
                Err(error) => {
                    warn!(url = %url, %error, "Script load failed");
                    *entry.attempt() = Attempt::Failed(error.clone());
                }
            }
            let _ = done.send(Some(inserted));
        });
    }

    /// Load scripts in order, stopping at the first failure.
    ///
    /// Later scripts may depend on globals defined by earlier ones.
    pub async fn load_all(&self, urls: &[String]) -> Result<(), ScriptLoadError> {
        for url in urls {
            self.load(url).await?;
        }
        Ok(())
    }

    /// Current state of `url` in this loader's cache.
    pub fn state(&self, url: &str) -> LoadState<(), ScriptLoadError> {
        let entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries
            .get(url)
            .map(|entry| entry.state())
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, url: &str) -> bool {
        self.state(url).is_ready()
    }
}
