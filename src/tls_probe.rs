use crate::config::ProbeConfig;
use crate::probes::TlsProber;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::tls::TlsInfo;
use reqwest::Client;
use std::time::Duration;

/// Performs a verified TLS handshake with `host:443` and reports whether the
/// peer presented a certificate.
pub struct CertificateProber {
    client: Client,
}

impl CertificateProber {
    pub fn new(config: &ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .tls_info(true)
            .build()?;

        Ok(Self { client })
    }

    fn probe_url(host: &str) -> String {
        if host.contains(':') && !host.starts_with('[') {
            format!("https://[{host}]:443/")
        } else {
            format!("https://{host}:443/")
        }
    }
}

#[async_trait]
impl TlsProber for CertificateProber {
    async fn certificate_obtained(&self, host: &str) -> Result<bool> {
        let response = self.client.head(Self::probe_url(host)).send().await?;

        // Any HTTP status is fine, only the handshake matters
        let has_cert = response
            .extensions()
            .get::<TlsInfo>()
            .and_then(|info| info.peer_certificate())
            .is_some();

        log::debug!("TLS probe for {host}: certificate={has_cert}");
        Ok(has_cert)
    }
}
