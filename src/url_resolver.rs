use crate::config::ProbeConfig;
use crate::domain_utils::DomainUtils;
use crate::probes::RedirectProber;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use url::Url;

/// Known URL-shortening services.
pub const SHORTENERS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "t.co",
    "goo.gl",
    "ow.ly",
    "short.link",
    "is.gd",
    "v.gd",
    "tiny.cc",
    "rb.gy",
    "cutt.ly",
    "shorturl.at",
    "1url.com",
    "u.to",
    "buff.ly",
    "rebrand.ly",
];

/// Counts the redirect answered by the URL itself. A single request is made
/// and the `Location` target is never fetched.
pub struct UrlResolver {
    client: Client,
}

impl UrlResolver {
    pub fn new(config: &ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = Self::client_builder(config).build()?;
        Ok(Self { client })
    }

    fn client_builder(config: &ProbeConfig) -> ClientBuilder {
        Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
    }

    /// Check if a host belongs to a known shortener
    pub fn is_shortener_host(host: &str) -> bool {
        DomainUtils::matches_domain_list(host, SHORTENERS)
    }
}

#[async_trait]
impl RedirectProber for UrlResolver {
    async fn redirect_count(&self, url: &str) -> Result<u32> {
        let url = Url::parse(url)?;
        let response = self.client.get(url.clone()).send().await?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .filter(|_| response.status().is_redirection());
        match location {
            Some(target) => {
                log::debug!("{url} redirects ({}) to {target:?}", response.status());
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
