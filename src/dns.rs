use crate::probes::MxResolver;
use anyhow::Result;
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;

/// MX lookups through the system resolver configuration.
pub struct DnsMxResolver {
    resolver: TokioAsyncResolver,
}

impl DnsMxResolver {
    pub fn new(timeout_seconds: u64) -> Self {
        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf()
            .unwrap_or_else(|e| {
                log::debug!("Falling back to default resolver config: {e}");
                (ResolverConfig::default(), ResolverOpts::default())
            });
        opts.timeout = Duration::from_secs(timeout_seconds);
        // One attempt per signal
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl MxResolver for DnsMxResolver {
    async fn has_mx(&self, domain: &str) -> Result<bool> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => Ok(lookup.iter().next().is_some()),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
