//! Ordered pool of RPC endpoints.

use crate::domain::{ConfigError, Endpoint};

/// Ordered, non-empty set of RPC endpoints. Reads and writes share one pool.
///
/// The first endpoint is the primary provider; the rest are tried in order
/// only when the ones before them fail.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
}

impl EndpointPool {
    /// Build a pool from URLs in preference order. Empty input is rejected.
    pub fn new<I, S>(urls: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = urls
            .into_iter()
            .filter(|url| !url.as_ref().trim().is_empty())
            .enumerate()
            .map(|(index, url)| Endpoint::parse(index, url.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        if endpoints.is_empty() {
            return Err(ConfigError::EmptyEndpointPool);
        }
        Ok(Self { endpoints })
    }

    /// Parse a comma-separated list such as the `RPC_URLS` variable.
    pub fn from_csv(raw: &str) -> Result<Self, ConfigError> {
        Self::new(raw.split(','))
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn primary(&self) -> &Endpoint {
        &self.endpoints[0]
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; kept for the `len`/`is_empty` pair.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
