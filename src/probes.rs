//! Network capabilities consumed by the URL extractor.
//!
//! Each probe is a trait so tests can substitute a fake. Failures are plain
//! `anyhow` errors; the extractor turns any error or timeout into the
//! feature's default value.

use crate::config::ProbeConfig;
use crate::dns::DnsMxResolver;
use crate::domain_age::DomainAgeChecker;
use crate::tls_probe::CertificateProber;
use crate::url_resolver::UrlResolver;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Domain-registry lookup: `domain -> optional creation date`.
#[async_trait]
pub trait DomainRegistry: Send + Sync {
    async fn creation_date(&self, domain: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Mail-exchange lookup: `domain -> has MX record`.
#[async_trait]
pub trait MxResolver: Send + Sync {
    async fn has_mx(&self, domain: &str) -> Result<bool>;
}

/// TLS handshake against port 443: `host -> certificate obtained`.
#[async_trait]
pub trait TlsProber: Send + Sync {
    async fn certificate_obtained(&self, host: &str) -> Result<bool>;
}

/// Redirect counting without automatic following: `url -> redirect count`.
#[async_trait]
pub trait RedirectProber: Send + Sync {
    async fn redirect_count(&self, url: &str) -> Result<u32>;
}

/// The set of capabilities handed to the URL extractor.
#[derive(Clone)]
pub struct Probes {
    pub registry: Arc<dyn DomainRegistry>,
    pub mx: Arc<dyn MxResolver>,
    pub tls: Arc<dyn TlsProber>,
    pub redirects: Arc<dyn RedirectProber>,
}

impl Probes {
    /// Live probes built from configuration, or offline ones when probing is
    /// disabled.
    pub fn from_config(config: &ProbeConfig) -> Result<Self> {
        if !config.enabled {
            log::info!("Network probes disabled, network features will use defaults");
            return Ok(Self::offline());
        }

        Ok(Self {
            registry: Arc::new(DomainAgeChecker::new(
                config.whois_timeout_seconds,
                config.use_mock_data,
            )),
            mx: Arc::new(DnsMxResolver::new(config.timeout_seconds)),
            tls: Arc::new(CertificateProber::new(config)?),
            redirects: Arc::new(UrlResolver::new(config)?),
        })
    }

    pub fn offline() -> Self {
        let offline = Arc::new(OfflineProbes);
        Self {
            registry: offline.clone(),
            mx: offline.clone(),
            tls: offline.clone(),
            redirects: offline,
        }
    }
}

/// Every probe fails, so every network feature takes its default.
pub struct OfflineProbes;

#[async_trait]
impl DomainRegistry for OfflineProbes {
    async fn creation_date(&self, _domain: &str) -> Result<Option<DateTime<Utc>>> {
        Err(anyhow!("network probes disabled"))
    }
}

#[async_trait]
impl MxResolver for OfflineProbes {
    async fn has_mx(&self, _domain: &str) -> Result<bool> {
        Err(anyhow!("network probes disabled"))
    }
}

#[async_trait]
impl TlsProber for OfflineProbes {
    async fn certificate_obtained(&self, _host: &str) -> Result<bool> {
        Err(anyhow!("network probes disabled"))
    }
}

#[async_trait]
impl RedirectProber for OfflineProbes {
    async fn redirect_count(&self, _url: &str) -> Result<u32> {
        Err(anyhow!("network probes disabled"))
    }
}

const THROTTLE_PRUNE_THRESHOLD: usize = 1024;

/// Bounds the number of in-flight probes against any single remote host.
#[derive(Debug)]
pub struct HostThrottle {
    per_host: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostThrottle {
    pub fn new(per_host: usize) -> Self {
        Self {
            per_host: per_host.max(1),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore_for(&self, host: &str) -> Option<Arc<Semaphore>> {
        let mut hosts = self.hosts.lock().ok()?;
        if hosts.len() >= THROTTLE_PRUNE_THRESHOLD {
            // Drop hosts with no outstanding permits
            hosts.retain(|_, sem| Arc::strong_count(sem) > 1);
        }
        Some(
            hosts
                .entry(host.to_lowercase())
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_host)))
                .clone(),
        )
    }

    /// Wait for a probe slot for `host`. The slot is released when the
    /// returned permit is dropped.
    pub async fn acquire(&self, host: &str) -> Option<OwnedSemaphorePermit> {
        let semaphore = self.semaphore_for(host)?;
        semaphore.acquire_owned().await.ok()
    }

    pub fn tracked_hosts(&self) -> usize {
        self.hosts.lock().map(|h| h.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_offline_probes_always_fail() {
        let probes = Probes::offline();
        assert!(probes.registry.creation_date("example.com").await.is_err());
        assert!(probes.mx.has_mx("example.com").await.is_err());
        assert!(probes.tls.certificate_obtained("example.com").await.is_err());
        assert!(probes
            .redirects
            .redirect_count("http://example.com")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_throttle_bounds_per_host() {
        let throttle = HostThrottle::new(1);
        let first = throttle.acquire("example.com").await;
        assert!(first.is_some());

        // Same host (case-insensitive) must wait
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), throttle.acquire("EXAMPLE.com")).await;
        assert!(blocked.is_err());

        // Other hosts are independent
        assert!(throttle.acquire("other.org").await.is_some());

        drop(first);
        assert!(throttle.acquire("example.com").await.is_some());
        assert_eq!(throttle.tracked_hosts(), 2);
    }
}
