//! In-memory host layout

use super::engine::{GrantSource, HostConnector};
use super::types::GrantListing;
use crate::error::{AuditError, Result};
use crate::types::{Grant, Location, Subject};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

/// Host whose home directories and keys files live in memory
#[derive(Debug, Default)]
pub struct InMemoryHost {
    host: String,
    homes: BTreeSet<Subject>,
    keys: BTreeMap<Location, Vec<Subject>>,
    broken: BTreeSet<Location>,
    queries: Mutex<Vec<Location>>,
}

impl InMemoryHost {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Add a home directory without a keys file
    pub fn with_home(mut self, identity: impl Into<Subject>) -> Self {
        self.homes.insert(identity.into());
        self
    }

    /// Add a keys file at `location` holding keys for `holders`
    pub fn with_keys<I, S>(mut self, location: impl Into<String>, holders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Subject>,
    {
        self.keys.insert(
            Location::new(location),
            holders.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Make reads of `location` fail with a transport error
    pub fn with_broken(mut self, location: impl Into<String>) -> Self {
        self.broken.insert(Location::new(location));
        self
    }

    /// Locations queried so far, in order
    pub fn queries(&self) -> Vec<Location> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GrantSource for InMemoryHost {
    fn host(&self) -> &str {
        &self.host
    }

    async fn list_home_identities(&self) -> Result<Vec<Subject>> {
        Ok(self.homes.iter().cloned().collect())
    }

    async fn list_grants(&self, location: &Location) -> Result<GrantListing> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(location.clone());
        }

        if self.broken.contains(location) {
            return Err(AuditError::transport(format!(
                "grep: {}: Permission denied",
                location.authorized_keys()
            )));
        }

        Ok(match self.keys.get(location) {
            Some(holders) => GrantListing::Found(
                holders
                    .iter()
                    .map(|holder| Grant::new(holder.clone(), location.clone()))
                    .collect(),
            ),
            None => GrantListing::NotFound,
        })
    }
}

/// Connector handing out prepared in-memory hosts
#[derive(Default)]
pub struct InMemoryConnector {
    hosts: Mutex<HashMap<String, InMemoryHost>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(self, host: InMemoryHost) -> Self {
        if let Ok(mut hosts) = self.hosts.lock() {
            hosts.insert(host.host.clone(), host);
        }
        self
    }
}

#[async_trait]
impl HostConnector for InMemoryConnector {
    async fn connect(&self, host: &str) -> Result<Box<dyn GrantSource>> {
        let mut hosts = self
            .hosts
            .lock()
            .map_err(|_| AuditError::Internal("host table poisoned".to_string()))?;

        match hosts.remove(host) {
            Some(layout) => Ok(Box::new(layout)),
            None => Err(AuditError::host_unreachable(host, "connection refused")),
        }
    }
}
