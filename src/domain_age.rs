use crate::domain_utils::DomainUtils;
use crate::probes::DomainRegistry;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Bound on cached WHOIS answers; expired entries go first, then the oldest.
const MAX_CACHED_DOMAINS: usize = 1024;

#[derive(Debug, Clone)]
pub struct DomainInfo {
    pub domain: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub cached_at: Instant,
}

/// Domain-registry lookups over WHOIS (TCP port 43), with a TTL cache.
#[derive(Debug, Clone)]
pub struct DomainAgeChecker {
    cache: Arc<RwLock<HashMap<String, DomainInfo>>>,
    cache_ttl: Duration,
    cache_capacity: usize,
    timeout: Duration,
    use_mock: bool,
    creation_patterns: Arc<Vec<Regex>>,
    referral_pattern: Arc<Regex>,
}

impl DomainAgeChecker {
    pub fn new(timeout_seconds: u64, use_mock: bool) -> Self {
        // Common patterns for creation date in WHOIS text
        let patterns = [
            r"(?i)creation\s*date[:\s]+([^\r\n]+)",
            r"(?i)created[:\s]+([^\r\n]+)",
            r"(?i)registered[:\s]+([^\r\n]+)",
            r"(?i)domain\s*created[:\s]+([^\r\n]+)",
            r"(?i)registration\s*date[:\s]+([^\r\n]+)",
            r"(?i)created\s*on[:\s]+([^\r\n]+)",
            r"(?i)registered\s*on[:\s]+([^\r\n]+)",
            // Registry-specific formats
            r"(?i)domain_date_created[:\s]+([^\r\n]+)",
            r"(?i)create_date[:\s]+([^\r\n]+)",
            r"(?i)created_date[:\s]+([^\r\n]+)",
            r"(?i)registration_time[:\s]+([^\r\n]+)",
            // International formats
            r"(?i)fecha\s*de\s*creaci[oó]n[:\s]+([^\r\n]+)",
            r"(?i)date\s*de\s*cr[eé]ation[:\s]+([^\r\n]+)",
            r"(?i)erstellt\s*am[:\s]+([^\r\n]+)",
        ];

        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl: Duration::from_secs(24 * 60 * 60), // 24 hours
            cache_capacity: MAX_CACHED_DOMAINS,
            timeout: Duration::from_secs(timeout_seconds),
            use_mock,
            creation_patterns: Arc::new(
                patterns
                    .iter()
                    .filter_map(|p| Regex::new(p).ok())
                    .collect(),
            ),
            referral_pattern: Arc::new(
                Regex::new(r"(?im)^\s*(?:refer|whois|registrar whois server):\s*(\S+)\s*$")
                    .unwrap(),
            ),
        }
    }

    /// Get domain information (with caching)
    async fn get_domain_info(&self, domain: &str) -> Result<DomainInfo> {
        let domain = domain.to_lowercase();

        // Basic domain validation to prevent invalid WHOIS queries
        if domain.is_empty()
            || !domain.contains('.')
            || domain
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '-'))
        {
            return Err(anyhow!("Invalid domain format: {domain}"));
        }

        {
            let cache = self.cache.read().await;
            if let Some(cached_info) = cache.get(&domain) {
                if cached_info.cached_at.elapsed() < self.cache_ttl {
                    log::debug!("Using cached domain info for: {domain}");
                    return Ok(cached_info.clone());
                }
            }
        }

        let domain_info = if self.use_mock {
            self.get_mock_domain_info(&domain)
        } else {
            self.fetch_domain_info(&domain).await?
        };

        self.remember(domain_info.clone()).await;
        Ok(domain_info)
    }

    async fn remember(&self, info: DomainInfo) {
        let mut cache = self.cache.write().await;
        cache.retain(|_, cached| cached.cached_at.elapsed() < self.cache_ttl);

        while !cache.is_empty() && cache.len() >= self.cache_capacity {
            let Some(oldest) = cache
                .values()
                .min_by_key(|cached| cached.cached_at)
                .map(|cached| cached.domain.clone())
            else {
                break;
            };
            log::debug!("Evicting cached domain info for: {oldest}");
            cache.remove(&oldest);
        }

        cache.insert(info.domain.clone(), info);
    }

    async fn fetch_domain_info(&self, domain: &str) -> Result<DomainInfo> {
        let whois_server = Self::whois_server(domain);
        log::debug!("Using WHOIS server: {whois_server} for domain: {domain}");

        let mut text = self.query_whois_server(whois_server, domain).await?;

        // Thin registries and IANA point at the authoritative server
        if let Some(referral) = self.referral_server(&text) {
            if !referral.eq_ignore_ascii_case(whois_server) {
                log::debug!("Following WHOIS referral to {referral} for {domain}");
                match self.query_whois_server(&referral, domain).await {
                    Ok(referred) => text.push_str(&referred),
                    Err(e) => log::debug!("WHOIS referral {referral} failed: {e}"),
                }
            }
        }

        Ok(DomainInfo {
            domain: domain.to_string(),
            creation_date: self.parse_creation_date(&text),
            cached_at: Instant::now(),
        })
    }

    fn whois_server(domain: &str) -> &'static str {
        let tld = domain.rsplit('.').next().unwrap_or(domain);

        match tld {
            "com" | "net" => "whois.verisign-grs.com",
            "org" => "whois.pir.org",
            "info" => "whois.afilias.net",
            "biz" => "whois.neulevel.biz",
            "us" => "whois.nic.us",
            "uk" => "whois.nic.uk",
            "de" => "whois.denic.de",
            "fr" => "whois.afnic.fr",
            "it" => "whois.nic.it",
            "nl" => "whois.domain-registry.nl",
            "au" => "whois.auda.org.au",
            "ca" => "whois.cira.ca",
            "jp" => "whois.jprs.jp",
            "cn" => "whois.cnnic.cn",
            "ru" => "whois.tcinet.ru",
            "br" => "whois.registro.br",
            "mx" => "whois.mx",
            "io" => "whois.nic.io",
            "xyz" => "whois.nic.xyz",
            "tk" => "whois.dot.tk",
            "ml" => "whois.dot.ml",
            "ga" => "whois.dot.ga",
            "cf" => "whois.dot.cf",
            _ => "whois.iana.org",
        }
    }

    /// Query a WHOIS server directly using TCP port 43
    async fn query_whois_server(&self, server: &str, domain: &str) -> Result<String> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpStream;
        use tokio::time::timeout;

        let mut stream =
            timeout(self.timeout, TcpStream::connect(format!("{server}:43"))).await??;

        stream.write_all(format!("{domain}\r\n").as_bytes()).await?;

        let mut raw = Vec::new();
        timeout(self.timeout, stream.read_to_end(&mut raw)).await??;

        let response = String::from_utf8_lossy(&raw).into_owned();
        if response.trim().is_empty() {
            return Err(anyhow!("Empty WHOIS response from {server}"));
        }

        Ok(response)
    }

    fn referral_server(&self, text: &str) -> Option<String> {
        self.referral_pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
            .filter(|s| s.contains('.'))
    }

    /// First parseable creation date in a WHOIS response.
    pub fn parse_creation_date(&self, text: &str) -> Option<DateTime<Utc>> {
        for regex in self.creation_patterns.iter() {
            for captures in regex.captures_iter(text) {
                let Some(date_match) = captures.get(1) else {
                    continue;
                };
                let date_str = date_match.as_str().trim();
                if let Some(date) = parse_date_string(date_str) {
                    return Some(date);
                }
                log::debug!("Could not parse date format: '{date_str}'");
            }
        }

        log::debug!(
            "Could not find creation date in WHOIS response ({} chars)",
            text.len()
        );
        None
    }

    /// Get mock domain information for testing
    fn get_mock_domain_info(&self, domain: &str) -> DomainInfo {
        let mock_data = HashMap::from([
            ("paypal-account-verify.com", 3),
            ("example.com", 8000),
            ("google.com", 9000),
            ("paypal.com", 9500),
            ("suspicious.tk", 12),
            ("secure-banking-update.xyz", 45),
            ("established.org", 3650),
        ]);

        let age_days = mock_data.get(domain).copied().unwrap_or(365);

        DomainInfo {
            domain: domain.to_string(),
            creation_date: Some(Utc::now() - ChronoDuration::days(age_days)),
            cached_at: Instant::now(),
        }
    }
}

#[async_trait]
impl DomainRegistry for DomainAgeChecker {
    async fn creation_date(&self, domain: &str) -> Result<Option<DateTime<Utc>>> {
        let root_domain = DomainUtils::root_domain(domain);
        Ok(self.get_domain_info(&root_domain).await?.creation_date)
    }
}

/// Parse the date formats seen in WHOIS responses.
fn parse_date_string(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    let datetime_formats = [
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y.%m.%d %H:%M:%S",
    ];
    for format in datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, format) {
            return Some(dt.and_utc());
        }
    }

    let date_formats = ["%Y-%m-%d", "%d-%m-%Y", "%d-%b-%Y", "%m/%d/%Y", "%d.%m.%Y", "%Y.%m.%d", "%Y/%m/%d"];
    for format in date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(date_str, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    // Fall back to the first ISO date embedded in the value
    let token = date_str.split_whitespace().next()?;
    if token != date_str {
        return parse_date_string(token);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_date_formats() {
        let d = parse_date_string("1997-09-15T04:00:00Z").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (1997, 9, 15));

        let d = parse_date_string("2024-10-10").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 10, 10));

        let d = parse_date_string("10-Oct-2024").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 10, 10));

        let d = parse_date_string("2020-01-02 03:04:05 CLST").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2020, 1, 2));

        assert!(parse_date_string("not a date").is_none());
    }

    #[test]
    fn test_parse_creation_date_from_whois_text() {
        let checker = DomainAgeChecker::new(10, false);
        let text = "Domain Name: GOOGLE.COM\r\n\
                    Registry Domain ID: 2138514_DOMAIN_COM-VRSN\r\n\
                    Updated Date: 2019-09-09T15:39:04Z\r\n\
                    Creation Date: 1997-09-15T04:00:00Z\r\n";
        let created = checker.parse_creation_date(text).unwrap();
        assert_eq!(created.year(), 1997);

        assert!(checker
            .parse_creation_date("No match for domain \"NOPE.COM\".")
            .is_none());
    }

    #[test]
    fn test_referral_server() {
        let checker = DomainAgeChecker::new(10, false);
        let iana = "domain:       COM\nrefer:        whois.verisign-grs.com\n";
        assert_eq!(
            checker.referral_server(iana),
            Some("whois.verisign-grs.com".to_string())
        );
        let thin = "   Registrar WHOIS Server: whois.markmonitor.com\r\n";
        assert_eq!(
            checker.referral_server(thin),
            Some("whois.markmonitor.com".to_string())
        );
        assert_eq!(checker.referral_server("Creation Date: 2001-01-01"), None);
    }

    #[test]
    fn test_whois_server_selection() {
        assert_eq!(
            DomainAgeChecker::whois_server("example.com"),
            "whois.verisign-grs.com"
        );
        assert_eq!(DomainAgeChecker::whois_server("example.org"), "whois.pir.org");
        assert_eq!(
            DomainAgeChecker::whois_server("example.unknowntld"),
            "whois.iana.org"
        );
    }

    async fn mock_age_days(checker: &DomainAgeChecker, domain: &str) -> i64 {
        let created = checker.creation_date(domain).await.unwrap().unwrap();
        (Utc::now() - created).num_days()
    }

    #[tokio::test]
    async fn test_mock_domain_age() {
        let checker = DomainAgeChecker::new(10, true);

        assert_eq!(mock_age_days(&checker, "suspicious.tk").await, 12);
        assert_eq!(mock_age_days(&checker, "login.paypal-account-verify.com").await, 3);
        assert_eq!(mock_age_days(&checker, "login.google.com").await, 9000);
        // Unknown domains default to one year in mock mode
        assert_eq!(mock_age_days(&checker, "whatever.net").await, 365);
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let mut checker = DomainAgeChecker::new(10, true);
        checker.cache_capacity = 3;

        for domain in ["a.com", "b.com", "c.com", "d.com", "e.com"] {
            checker.creation_date(domain).await.unwrap();
        }

        let cache = checker.cache.read().await;
        assert_eq!(cache.len(), 3);
        assert!(cache.contains_key("e.com"));
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped_on_insert() {
        let mut checker = DomainAgeChecker::new(10, true);
        checker.cache_ttl = Duration::ZERO;

        for domain in ["a.com", "b.com", "c.com"] {
            checker.creation_date(domain).await.unwrap();
        }

        let cache = checker.cache.read().await;
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("c.com"));
    }

    #[tokio::test]
    async fn test_invalid_domain_is_an_error() {
        let checker = DomainAgeChecker::new(10, true);
        assert!(checker.creation_date("localhost").await.is_err());
        assert!(checker.creation_date("bad_domain!.com").await.is_err());
    }
}
