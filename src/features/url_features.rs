//! Lexical, host and network signals for a single URL.
//!
//! The lexical part is pure. The four network probes (registry, MX, TLS,
//! redirects) run concurrently and are isolated from each other: a probe
//! that errors or exceeds its timeout contributes its default value and
//! never aborts the rest of the extraction.

use super::{FeatureMap, FeatureSet, URL_BASE_KEYS};
use crate::config::ProbeConfig;
use crate::domain_utils::{DomainUtils, HostParts};
use crate::entropy::rounded_entropy;
use crate::probes::{HostThrottle, Probes};
use crate::url_resolver::UrlResolver;
use anyhow::{anyhow, Result};
use chrono::Utc;
use regex::Regex;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use url::Url;

const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "login",
    "verify",
    "account",
    "banking",
    "paypal",
    "ebay",
    "security",
    "update",
    "confirm",
    "password",
    "credential",
];

const TRUSTED_SUFFIXES: &[&str] = &["com", "org", "net", "edu", "gov"];
const SUSPICIOUS_SUFFIXES: &[&str] = &["tk", "ml", "ga", "cf", "xyz"];

/// Placeholder for signals that need a page fetch or a ranking API.
const UNKNOWN: f64 = -1.0;

/// Lexical facts about a URL, computed without any I/O.
#[derive(Debug, Clone)]
struct ParsedUrl {
    url: Url,
    host: String,
    parts: HostParts,
    registered_domain: Option<String>,
    path: String,
    port: Option<u16>,
}

pub struct UrlFeatureExtractor {
    probes: Probes,
    throttle: HostThrottle,
    probe_timeout: Duration,
    whois_timeout: Duration,
    scheme_regex: Regex,
    ip_regex: Regex,
    special_chars_regex: Regex,
}

impl UrlFeatureExtractor {
    pub fn new(probes: Probes, config: &ProbeConfig) -> Self {
        Self {
            probes,
            throttle: HostThrottle::new(config.per_host_concurrency),
            probe_timeout: Duration::from_secs(config.timeout_seconds),
            whois_timeout: Duration::from_secs(config.whois_timeout_seconds),
            scheme_regex: Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").unwrap(),
            ip_regex: Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap(),
            special_chars_regex: Regex::new(r#"[!@#$%^&*()_+\-=\[\]{};':"\\|,.<>/?]"#).unwrap(),
        }
    }

    /// Extract the URL feature set. Never fails: a URL that cannot be parsed
    /// yields an empty map and a single warning describing why.
    pub async fn extract(&self, raw_url: &str) -> FeatureSet {
        let parsed = match self.parse(raw_url) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("URL extraction failed for {raw_url:?}: {e}");
                return FeatureSet::failed(e);
            }
        };

        let mut set = FeatureSet {
            features: FeatureMap::with_keys(URL_BASE_KEYS),
            warnings: Vec::new(),
        };
        self.lexical_features(raw_url, &parsed, &mut set.features);
        self.network_features(raw_url, &parsed, &mut set.features)
            .await;
        Self::append_warnings(&mut set);
        set
    }

    fn parse(&self, raw_url: &str) -> Result<ParsedUrl> {
        let trimmed = raw_url.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("empty URL"));
        }

        // Scheme-less input such as "example.com/login" is read as http. A
        // "://" later on, e.g. inside a query string, is not a scheme.
        let candidate = if self.scheme_regex.is_match(trimmed) {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
        let url = Url::parse(&candidate)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("URL has no host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_lowercase();

        let parts = DomainUtils::split_host(&host);
        let registered_domain = parts.registered_domain();

        let after_scheme = candidate.split_once("://").map(|(_, rest)| rest).unwrap_or("");
        let before_query = after_scheme.split(['?', '#']).next().unwrap_or("");
        let authority = before_query.split('/').next().unwrap_or("");

        // The url crate normalises an absent path to "/"
        let path = if url.path() == "/" && !before_query.contains('/') {
            String::new()
        } else {
            url.path().to_string()
        };

        Ok(ParsedUrl {
            port: Self::explicit_port(authority),
            url,
            host,
            parts,
            registered_domain,
            path,
        })
    }

    /// The port written in the authority, including one equal to the scheme
    /// default (`Url::port` drops those).
    fn explicit_port(authority: &str) -> Option<u16> {
        let host_port = authority.rsplit('@').next().unwrap_or(authority);
        let port = if host_port.starts_with('[') {
            host_port.rsplit_once("]:")?.1
        } else {
            host_port.rsplit_once(':')?.1
        };
        port.parse().ok()
    }

    fn lexical_features(&self, raw_url: &str, parsed: &ParsedUrl, features: &mut FeatureMap) {
        let lower = raw_url.to_lowercase();
        let domain = parsed.registered_domain.as_deref().unwrap_or("");
        let query = parsed.url.query().unwrap_or("");

        features.set("url_length", raw_url.chars().count() as f64);
        features.set_flag("has_https", raw_url.starts_with("https://"));
        features.set_flag("has_ip", self.ip_regex.is_match(raw_url));
        features.set(
            "special_chars_count",
            self.special_chars_regex.find_iter(raw_url).count() as f64,
        );
        features.set(
            "suspicious_keywords",
            SUSPICIOUS_KEYWORDS
                .iter()
                .filter(|k| lower.contains(*k))
                .count() as f64,
        );

        features.set(
            "domain_entropy",
            if domain.is_empty() {
                0.0
            } else {
                rounded_entropy(domain)
            },
        );
        features.set("path_length", parsed.path.chars().count() as f64);
        features.set("path_depth", parsed.path.matches('/').count() as f64);
        features.set("query_length", query.chars().count() as f64);
        features.set("query_params_count", Self::query_param_count(&parsed.url) as f64);
        features.set_flag(
            "suspicious_port",
            parsed.port.is_some_and(|port| port != 80 && port != 443),
        );

        features.set_flag("has_hyphen", domain.contains('-'));
        features.set_flag("double_hyphen", domain.contains("--"));
        features.set_flag("has_underscore", domain.contains('_'));
        features.set_flag("punycode", domain.contains("xn--"));
        features.set_flag("https_in_domain", domain.contains("https"));

        features.set("alexa_rank", UNKNOWN);
        features.set("bad_favicon", 0.0);
        features.set("external_resource_ratio", UNKNOWN);

        features.set("tld_trust_score", Self::tld_trust_score(&parsed.parts.suffix));
        features.set("subdomain_count", parsed.parts.subdomain_count() as f64);
        features.set_flag(
            "has_shortener",
            UrlResolver::is_shortener_host(&parsed.host),
        );
    }

    /// Distinct query keys carrying a non-empty value.
    fn query_param_count(url: &Url) -> usize {
        url.query_pairs()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, _)| key.into_owned())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn tld_trust_score(suffix: &str) -> f64 {
        let suffix = suffix.to_lowercase();
        if TRUSTED_SUFFIXES.contains(&suffix.as_str()) {
            1.0
        } else if SUSPICIOUS_SUFFIXES.contains(&suffix.as_str()) {
            0.0
        } else {
            0.5
        }
    }

    async fn network_features(&self, raw_url: &str, parsed: &ParsedUrl, features: &mut FeatureMap) {
        let host = parsed.host.as_str();
        let domain = parsed.registered_domain.as_deref();
        let probe_url = parsed.url.as_str();

        let age = async {
            let Some(domain) = domain else { return 0.0 };
            let created = self
                .guarded("whois", domain, self.whois_timeout, None, async {
                    self.probes.registry.creation_date(domain).await
                })
                .await;
            // Unknown age is reported as 0 and never counts as "new"
            created
                .map(|c| (Utc::now() - c).num_days().max(0) as f64)
                .unwrap_or(0.0)
        };

        let mx = async {
            let Some(domain) = domain else { return false };
            self.guarded("mx", domain, self.probe_timeout, false, async {
                self.probes.mx.has_mx(domain).await
            })
            .await
        };

        let redirects = self.guarded("redirect", host, self.probe_timeout, 0, async {
            self.probes.redirects.redirect_count(probe_url).await
        });

        let tls = self.guarded("tls", host, self.probe_timeout, false, async {
            self.probes.tls.certificate_obtained(host).await
        });

        let (age_days, has_mx, redirect_count, ssl_valid) = tokio::join!(age, mx, redirects, tls);

        log::debug!(
            "Probes for {raw_url}: age={age_days} mx={has_mx} redirects={redirect_count} ssl={ssl_valid}"
        );
        features.set("domain_age_days", age_days);
        features.set_flag("has_mx", has_mx);
        features.set("redirect_count", redirect_count as f64);
        features.set_flag("ssl_valid", ssl_valid);
    }

    /// Run one probe under the per-host throttle and its own timeout.
    /// Errors and timeouts both yield `default`.
    async fn guarded<T, F>(
        &self,
        probe: &str,
        target: &str,
        limit: Duration,
        default: T,
        fut: F,
    ) -> T
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self.throttle.acquire(target).await;
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                log::debug!("{probe} probe failed for {target}: {e}");
                default
            }
            Err(_) => {
                log::debug!("{probe} probe timed out for {target} after {limit:?}");
                default
            }
        }
    }

    fn append_warnings(set: &mut FeatureSet) {
        let f = &set.features;
        let mut warnings = Vec::new();

        if f.get("domain_entropy") > 4.0 {
            warnings.push("Domain name is highly random (entropy high)");
        }
        if f.get("path_length") > 50.0 {
            warnings.push("Path is very long");
        }
        if f.get("query_params_count") > 6.0 || f.get("query_length") > 80.0 {
            warnings.push("Very long or complex query parameters in URL");
        }
        if f.flag("suspicious_port") {
            warnings.push("Non-standard port used in URL");
        }
        if f.flag("punycode") {
            warnings.push("Punycode (internationalized) domain used (can hide lookalike)");
        }
        if f.flag("https_in_domain") {
            warnings.push("Domain contains 'https' (URL might be misleading!)");
        }
        if f.flag("bad_favicon") {
            warnings.push("Favicon not hosted on same domain");
        }
        if f.flag("has_hyphen") && f.flag("double_hyphen") {
            warnings.push("Multiple hyphens in domain are suspicious");
        }
        if f.flag("has_underscore") {
            warnings.push("Underscore used in domain (rare, likely phishing)");
        }
        if !f.flag("has_mx") {
            warnings.push("No MX record (domain likely not legit mail sender)");
        }
        if f.flag("has_ip") {
            warnings.push("URL contains IP address instead of domain name");
        }
        if f.get("special_chars_count") > 5.0 {
            warnings.push("High number of special characters in URL");
        }
        if f.get("suspicious_keywords") > 2.0 {
            warnings.push("Multiple suspicious keywords detected");
        }
        let age = f.get("domain_age_days");
        if age > 0.0 && age < 30.0 {
            warnings.push("Domain is very new (less than 30 days)");
        }
        if f.get("subdomain_count") > 2.0 {
            warnings.push("Multiple subdomains detected");
        }
        if f.flag("has_shortener") {
            warnings.push("URL uses shortening service");
        }

        for warning in warnings {
            set.warn(warning);
        }
    }
}
