use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use phish_verdict::config::Config;
use phish_verdict::features::{EMAIL_BASE_KEYS, URL_BASE_KEYS};
use phish_verdict::probes::{DomainRegistry, MxResolver, Probes, RedirectProber, TlsProber};
use phish_verdict::scorer::{EMAIL_RULES_MODEL, RULE_BASED_MODEL, TRAINED_MODEL};
use phish_verdict::{
    AnalysisError, BatchEntry, EmailMessage, PhishingAnalyzer, RiskTier, ScoringMode,
};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct FixedAge(i64);

#[async_trait]
impl DomainRegistry for FixedAge {
    async fn creation_date(&self, _domain: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(Some(Utc::now() - ChronoDuration::days(self.0)))
    }
}

struct NoCreationDate;

#[async_trait]
impl DomainRegistry for NoCreationDate {
    async fn creation_date(&self, _domain: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(None)
    }
}

struct Mx(bool);

#[async_trait]
impl MxResolver for Mx {
    async fn has_mx(&self, _domain: &str) -> Result<bool> {
        Ok(self.0)
    }
}

struct Tls(bool);

#[async_trait]
impl TlsProber for Tls {
    async fn certificate_obtained(&self, _host: &str) -> Result<bool> {
        Ok(self.0)
    }
}

struct BrokenTls;

#[async_trait]
impl TlsProber for BrokenTls {
    async fn certificate_obtained(&self, host: &str) -> Result<bool> {
        Err(anyhow!("handshake with {host} reset by peer"))
    }
}

struct HangingTls;

#[async_trait]
impl TlsProber for HangingTls {
    async fn certificate_obtained(&self, _host: &str) -> Result<bool> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(true)
    }
}

struct Redirects(u32);

#[async_trait]
impl RedirectProber for Redirects {
    async fn redirect_count(&self, _url: &str) -> Result<u32> {
        Ok(self.0)
    }
}

fn probes(
    registry: impl DomainRegistry + 'static,
    mx: bool,
    tls: impl TlsProber + 'static,
    redirects: u32,
) -> Probes {
    Probes {
        registry: Arc::new(registry),
        mx: Arc::new(Mx(mx)),
        tls: Arc::new(tls),
        redirects: Arc::new(Redirects(redirects)),
    }
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.probes.timeout_seconds = 1;
    config.probes.whois_timeout_seconds = 1;
    config
}

fn rule_analyzer(probes: Probes) -> PhishingAnalyzer {
    PhishingAnalyzer::new(probes, ScoringMode::RuleBased, &fast_config())
}

#[tokio::test]
async fn failing_tls_probe_does_not_affect_other_signals() {
    let analyzer = rule_analyzer(probes(FixedAge(10), true, BrokenTls, 2));
    let verdict = analyzer
        .analyze_url("https://example.com/account")
        .await
        .unwrap();
    let f = &verdict.features;

    assert!(f.has_all(URL_BASE_KEYS));
    assert_eq!(f.get("ssl_valid"), 0.0);
    assert_eq!(f.get("redirect_count"), 2.0);
    assert_eq!(f.get("domain_age_days"), 10.0);
    assert_eq!(f.get("has_mx"), 1.0);
    assert_eq!(f.get("suspicious_keywords"), 1.0);
    assert!(verdict
        .warnings
        .contains(&"Domain is very new (less than 30 days)".to_string()));
    assert!(!verdict.warnings.iter().any(|w| w.starts_with("Analysis error")));
}

#[tokio::test]
async fn timed_out_probe_takes_default() {
    let analyzer = rule_analyzer(probes(FixedAge(400), true, HangingTls, 1));

    let started = Instant::now();
    let verdict = analyzer.analyze_url("https://example.com/").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(verdict.features.get("ssl_valid"), 0.0);
    assert_eq!(verdict.features.get("redirect_count"), 1.0);
    assert_eq!(verdict.features.get("domain_age_days"), 400.0);
}

#[tokio::test]
async fn unknown_domain_age_is_not_new() {
    let analyzer = rule_analyzer(probes(NoCreationDate, true, Tls(true), 0));
    let verdict = analyzer.analyze_url("https://example.com/").await.unwrap();

    assert_eq!(verdict.features.get("domain_age_days"), 0.0);
    assert!(!verdict
        .warnings
        .iter()
        .any(|w| w.starts_with("Domain is very new")));
    // 0.3 - ssl - https + trusted suffix + 1-char path
    assert!((verdict.confidence - 0.237).abs() < 1e-9, "{}", verdict.confidence);
    assert_eq!(verdict.risk_tier, RiskTier::Low);
    assert!(!verdict.is_phishing);
    assert_eq!(verdict.label(), "Safe");
}

#[tokio::test]
async fn ip_host_with_keywords_is_phishing() {
    let analyzer = rule_analyzer(probes(NoCreationDate, false, BrokenTls, 0));
    let verdict = analyzer
        .analyze_url("http://203.0.113.7/paypal/login/verify-account.php")
        .await
        .unwrap();

    assert!(verdict.is_phishing);
    assert!(matches!(
        verdict.risk_tier,
        RiskTier::High | RiskTier::Critical
    ));
    assert_eq!(verdict.model_identifier, RULE_BASED_MODEL);
    assert_eq!(verdict.label(), "Phishing");
}

#[tokio::test]
async fn malformed_url_returns_low_information_verdict() {
    let analyzer = rule_analyzer(Probes::offline());
    let verdict = analyzer.analyze_url("http://[not-an-ip/").await.unwrap();

    assert!(verdict.features.is_empty());
    assert_eq!(verdict.warnings.len(), 1);
    assert!(verdict.warnings[0].starts_with("Analysis error:"));
}

#[tokio::test]
async fn empty_url_is_rejected() {
    let analyzer = rule_analyzer(Probes::offline());
    assert_eq!(
        analyzer.analyze_url("   ").await.unwrap_err(),
        AnalysisError::EmptyUrl
    );
}

#[tokio::test]
async fn model_mode_uses_artifact_until_disabled() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "columns": ["has_ip", "ssl_valid", "domain_age_days"],
            "trees": [{{ "nodes": [
                {{ "feature": 1, "threshold": 0.5, "left": 1, "right": 2 }},
                {{ "value": 0.93 }},
                {{ "value": 0.04 }}
            ] }}]
        }}"#
    )
    .unwrap();

    let mut config = fast_config();
    config.probes.enabled = false;
    config.model.path = file.path().to_string_lossy().into_owned();
    let analyzer = PhishingAnalyzer::from_config(&config).unwrap();
    assert!(matches!(
        analyzer.scoring_mode(),
        ScoringMode::TrainedModel(_)
    ));

    // Offline, so ssl_valid is 0 and the stump goes left
    let verdict = analyzer.analyze_url("https://example.com/").await.unwrap();
    assert_eq!(verdict.model_identifier, TRAINED_MODEL);
    assert_eq!(verdict.confidence, 0.93);
    assert!(verdict.is_phishing);
    assert_eq!(verdict.risk_tier, RiskTier::Critical);

    let verdict = analyzer
        .analyze_url_with_model("https://example.com/", false)
        .await
        .unwrap();
    assert_eq!(verdict.model_identifier, RULE_BASED_MODEL);
}

#[tokio::test]
async fn missing_model_falls_back_to_rules() {
    let mut config = fast_config();
    config.probes.enabled = false;
    config.model.path = "/nonexistent/phishing_forest.json".to_string();
    let analyzer = PhishingAnalyzer::from_config(&config).unwrap();

    assert!(matches!(analyzer.scoring_mode(), ScoringMode::RuleBased));
    let verdict = analyzer.analyze_url("https://example.com/").await.unwrap();
    assert_eq!(verdict.model_identifier, RULE_BASED_MODEL);
}

#[tokio::test]
async fn batch_keeps_order_and_isolates_errors() {
    let analyzer = rule_analyzer(probes(FixedAge(4000), true, Tls(true), 0));
    let urls = vec![
        "https://example.com/".to_string(),
        "".to_string(),
        "http://198.51.100.2/login".to_string(),
    ];
    let entries = analyzer.analyze_url_batch(&urls).await.unwrap();

    assert_eq!(entries.len(), 3);
    let order: Vec<&str> = entries.iter().map(|e| e.url()).collect();
    assert_eq!(order, ["https://example.com/", "", "http://198.51.100.2/login"]);

    assert!(matches!(&entries[0], BatchEntry::Success { verdict, .. } if !verdict.is_phishing));
    assert!(matches!(&entries[1], BatchEntry::Error { error, .. } if error == "URL is required"));
    assert!(matches!(&entries[2], BatchEntry::Success { verdict, .. } if verdict.features.get("has_ip") == 1.0));
}

#[tokio::test]
async fn batch_limits() {
    let analyzer = rule_analyzer(Probes::offline());
    assert_eq!(
        analyzer.analyze_url_batch(&[]).await.unwrap_err(),
        AnalysisError::EmptyBatch
    );

    let urls: Vec<String> = (0..51).map(|i| format!("https://site{i}.com/")).collect();
    assert_eq!(
        analyzer.analyze_url_batch(&urls).await.unwrap_err(),
        AnalysisError::BatchTooLarge { max: 50, got: 51 }
    );
}

#[test]
fn benign_email_is_safe() {
    let analyzer = rule_analyzer(Probes::offline());
    let message = EmailMessage::new(
        "Meeting notes",
        "See attached agenda.",
        "alice@company.com",
        Some(""),
    );
    let verdict = analyzer.analyze_email(&message).unwrap();

    assert!(verdict.features.has_all(EMAIL_BASE_KEYS));
    assert!(verdict.features.iter().all(|(_, v)| v == 0.0));
    assert_eq!(verdict.confidence, 0.0);
    assert_eq!(verdict.risk_tier, RiskTier::Low);
    assert!(!verdict.is_phishing);
    assert_eq!(verdict.label(), "Safe");
    assert_eq!(verdict.model_identifier, EMAIL_RULES_MODEL);
}

#[test]
fn phishing_email_is_flagged() {
    let analyzer = rule_analyzer(Probes::offline());
    let message = EmailMessage::new(
        "Action required: verify your account",
        "Dear user, your password will be reset. Click http://bad.example/reset now.",
        "support@secure-mail.top",
        Some("harvest@mail.com"),
    );
    let verdict = analyzer.analyze_email(&message).unwrap();

    assert!(verdict.is_phishing);
    assert_eq!(verdict.risk_tier, RiskTier::Critical);
    assert_eq!(verdict.confidence, 1.0);
    assert!(verdict
        .warnings
        .contains(&"Reply-to address is different from sender (common phishing trick)".to_string()));
}

#[test]
fn email_input_is_validated() {
    let analyzer = rule_analyzer(Probes::offline());

    let no_sender = EmailMessage::new("Hello", "Body", " ", None);
    assert_eq!(
        analyzer.analyze_email(&no_sender).unwrap_err(),
        AnalysisError::MissingSender
    );

    let no_content = EmailMessage::new("", "", "bob@example.com", None);
    assert_eq!(
        analyzer.analyze_email(&no_content).unwrap_err(),
        AnalysisError::EmptyMessage
    );
}
