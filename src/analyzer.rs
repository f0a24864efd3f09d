use crate::config::{BatchConfig, Config};
use crate::error::{AnalysisError, Result};
use crate::features::email_features::{EmailFeatureExtractor, EmailMessage};
use crate::features::url_features::UrlFeatureExtractor;
use crate::model::ModelArtifact;
use crate::probes::Probes;
use crate::scorer::{EmailRiskScorer, ScoringMode, UrlRiskScorer};
use crate::verdict::Verdict;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

/// Outcome for one URL of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchEntry {
    Success { url: String, verdict: Verdict },
    Error { url: String, error: String },
}

impl BatchEntry {
    pub fn url(&self) -> &str {
        match self {
            BatchEntry::Success { url, .. } | BatchEntry::Error { url, .. } => url,
        }
    }
}

/// Stateless analysis service. Build it once and share it by reference;
/// the only state it carries is configuration and the read-only model.
pub struct PhishingAnalyzer {
    url_extractor: UrlFeatureExtractor,
    email_extractor: EmailFeatureExtractor,
    url_scorer: UrlRiskScorer,
    email_scorer: EmailRiskScorer,
    batch: BatchConfig,
}

impl PhishingAnalyzer {
    pub fn new(probes: Probes, mode: ScoringMode, config: &Config) -> Self {
        Self {
            url_extractor: UrlFeatureExtractor::new(probes, &config.probes),
            email_extractor: EmailFeatureExtractor::new(),
            url_scorer: UrlRiskScorer::new(mode),
            email_scorer: EmailRiskScorer::new(),
            batch: config.batch.clone(),
        }
    }

    /// Live probes and, when enabled and present, the trained model.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let probes = Probes::from_config(&config.probes)?;
        let artifact = if config.model.enabled {
            ModelArtifact::load_optional(&config.model.path)
        } else {
            None
        };
        Ok(Self::new(
            probes,
            ScoringMode::from_artifact(artifact),
            config,
        ))
    }

    pub fn scoring_mode(&self) -> &ScoringMode {
        self.url_scorer.mode()
    }

    pub async fn analyze_url(&self, url: &str) -> Result<Verdict> {
        self.analyze_url_with_model(url, true).await
    }

    /// Like [`analyze_url`](Self::analyze_url), but `use_model = false` forces
    /// rule-based scoring even when a model is loaded.
    pub async fn analyze_url_with_model(&self, url: &str, use_model: bool) -> Result<Verdict> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AnalysisError::EmptyUrl);
        }

        let extraction = self.url_extractor.extract(url).await;
        let score = self.url_scorer.score(&extraction.features, use_model);
        log::debug!(
            "URL {url}: p={:.3} tier={} model={}",
            score.probability,
            score.risk_tier,
            score.model_identifier
        );
        Ok(Verdict::assemble(extraction, score))
    }

    pub fn analyze_email(&self, message: &EmailMessage) -> Result<Verdict> {
        if message.sender.trim().is_empty() {
            return Err(AnalysisError::MissingSender);
        }
        if message.subject.trim().is_empty() && message.body.trim().is_empty() {
            return Err(AnalysisError::EmptyMessage);
        }

        let extraction = self.email_extractor.extract(message);
        let score = self.email_scorer.score(&extraction.features);
        log::debug!(
            "Email from {}: p={:.3} tier={}",
            message.sender,
            score.probability,
            score.risk_tier
        );
        Ok(Verdict::assemble(extraction, score))
    }

    /// Analyze up to `batch.max_urls` URLs with bounded concurrency. Results
    /// keep input order; a rejected URL becomes an error entry and does not
    /// affect the others.
    pub async fn analyze_url_batch(&self, urls: &[String]) -> Result<Vec<BatchEntry>> {
        if urls.is_empty() {
            return Err(AnalysisError::EmptyBatch);
        }
        if urls.len() > self.batch.max_urls {
            return Err(AnalysisError::BatchTooLarge {
                max: self.batch.max_urls,
                got: urls.len(),
            });
        }

        let entries = stream::iter(urls)
            .map(|url| async move {
                match self.analyze_url(url).await {
                    Ok(verdict) => BatchEntry::Success {
                        url: url.clone(),
                        verdict,
                    },
                    Err(e) => BatchEntry::Error {
                        url: url.clone(),
                        error: e.to_string(),
                    },
                }
            })
            .buffered(self.batch.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        log::info!("Analyzed batch of {} URLs", entries.len());
        Ok(entries)
    }
}
