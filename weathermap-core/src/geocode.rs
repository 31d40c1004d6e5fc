//! City search: free text to coordinates, latest request wins

use std::fmt;

use tracing::debug;

use crate::view::Coordinates;
use crate::BoxFuture;

/// Error resolving a search query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GeocodeError {
    /// Query was blank after trimming; no request was issued.
    EmptyQuery,
    NotFound(String),
    Network(String),
}

impl fmt::Display for GeocodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeocodeError::EmptyQuery => write!(f, "Enter a city name to search"),
            GeocodeError::NotFound(query) => write!(f, "Location not found: {}", query),
            GeocodeError::Network(msg) => write!(f, "Geocoding request failed: {}", msg),
        }
    }
}

impl std::error::Error for GeocodeError {}

/// External geocoding service
pub trait Geocoder: Send + Sync {
    fn resolve_coordinates<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Coordinates, GeocodeError>>;
}

/// One issued search
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeocodeRequest {
    pub sequence: u64,
    pub query: String,
}

/// Per-mount search sequencing.
///
/// Only the response to the highest issued sequence may apply, and only
/// while it has not been cancelled.
#[derive(Debug, Default)]
pub struct GeocodeClient {
    issued: u64,
    cancelled_through: u64,
}

impl GeocodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next request for `query`.
    pub fn search(&mut self, query: &str) -> Result<GeocodeRequest, GeocodeError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(GeocodeError::EmptyQuery);
        }
        self.issued += 1;
        Ok(GeocodeRequest {
            sequence: self.issued,
            query: query.to_string(),
        })
    }

    /// Whether a response for `sequence` may still be applied.
    pub fn accepts(&self, sequence: u64) -> bool {
        sequence == self.issued && sequence > self.cancelled_through
    }

    /// Filter a completed response. `None` means it is stale and must be
    /// discarded without side effect.
    pub fn complete<T>(
        &self,
        sequence: u64,
        result: Result<T, GeocodeError>,
    ) -> Option<Result<T, GeocodeError>> {
        if self.accepts(sequence) {
            Some(result)
        } else {
            debug!(sequence, latest = self.issued, "Discarding stale geocode response");
            None
        }
    }

    /// Make every outstanding sequence ineligible.
    pub fn cancel(&mut self) {
        self.cancelled_through = self.issued;
    }

    /// Highest sequence issued so far (0 before the first search).
    pub fn latest(&self) -> u64 {
        self.issued
    }

    pub fn has_pending(&self) -> bool {
        self.issued > self.cancelled_through
    }
}

/// Resolve `query` through `geocoder`, rejecting blank input up front.
pub async fn lookup(geocoder: &dyn Geocoder, query: &str) -> Result<Coordinates, GeocodeError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(GeocodeError::EmptyQuery);
    }
    geocoder.resolve_coordinates(query).await
}
