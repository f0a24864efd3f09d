use crate::features::{FeatureMap, RiskTier};
use crate::model::ModelArtifact;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const RULE_BASED_MODEL: &str = "rule_based";
pub const TRAINED_MODEL: &str = "ml_random_forest";
pub const EMAIL_RULES_MODEL: &str = "rules_email_v1";

const URL_PHISHING_THRESHOLD: f64 = 0.6;
const EMAIL_PHISHING_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Always within [0, 1]
    pub probability: f64,
    pub confidence: f64,
    pub is_phishing: bool,
    pub risk_tier: RiskTier,
    pub model_identifier: String,
}

/// How URL features become a probability. Chosen once at startup.
#[derive(Debug, Clone)]
pub enum ScoringMode {
    RuleBased,
    TrainedModel(Arc<ModelArtifact>),
}

impl ScoringMode {
    pub fn from_artifact(artifact: Option<ModelArtifact>) -> Self {
        match artifact {
            Some(model) => ScoringMode::TrainedModel(Arc::new(model)),
            None => ScoringMode::RuleBased,
        }
    }
}

/// How a raw feature value is turned into a contribution before weighting.
#[derive(Debug, Clone, Copy)]
enum Transform {
    Raw,
    /// clamp((v - 3.5) / 2.0, 0, 1)
    Entropy,
    Cap(f64),
    /// 1 when the flag is absent
    Inverted,
    /// The term is subtracted: `score -= value * weight`
    Subtracted,
}

struct Weight {
    feature: &'static str,
    weight: f64,
    transform: Transform,
}

const fn w(feature: &'static str, weight: f64, transform: Transform) -> Weight {
    Weight {
        feature,
        weight,
        transform,
    }
}

const URL_WEIGHTS: &[Weight] = &[
    w("has_ip", 0.15, Transform::Raw),
    w("suspicious_keywords", 0.12, Transform::Raw),
    w("has_shortener", 0.08, Transform::Raw),
    w("ssl_valid", -0.10, Transform::Raw),
    w("has_https", -0.05, Transform::Raw),
    w("tld_trust_score", -0.08, Transform::Subtracted),
    w("domain_entropy", 0.09, Transform::Entropy),
    w("path_length", 0.007, Transform::Cap(100.0)),
    w("query_params_count", 0.03, Transform::Cap(12.0)),
    w("suspicious_port", 0.09, Transform::Raw),
    w("has_mx", 0.06, Transform::Inverted),
    w("has_hyphen", 0.04, Transform::Raw),
    w("double_hyphen", 0.06, Transform::Raw),
    w("has_underscore", 0.08, Transform::Raw),
    w("punycode", 0.11, Transform::Raw),
    w("https_in_domain", 0.05, Transform::Raw),
    w("bad_favicon", 0.02, Transform::Raw),
];

const URL_BASE_SCORE: f64 = 0.3;

const EMAIL_WEIGHTS: &[(&str, f64)] = &[
    ("subject_keywords", 0.2),
    ("body_keywords", 0.15),
    ("link_count", 0.12),
    ("suspicious_attach_count", 0.25),
    ("from_free_domain", 0.10),
    ("from_odd_tld", 0.10),
    ("reply_to_mismatch", 0.18),
    ("generic_greeting", 0.08),
    ("html_tag_count", 0.02),
];

pub struct UrlRiskScorer {
    mode: ScoringMode,
}

impl UrlRiskScorer {
    pub fn new(mode: ScoringMode) -> Self {
        Self { mode }
    }

    pub fn rule_based() -> Self {
        Self::new(ScoringMode::RuleBased)
    }

    pub fn mode(&self) -> &ScoringMode {
        &self.mode
    }

    /// Score URL features. `use_model` lets the caller force rule-based
    /// scoring even when a model is loaded.
    pub fn score(&self, features: &FeatureMap, use_model: bool) -> ScoreResult {
        match &self.mode {
            ScoringMode::TrainedModel(model) if use_model => {
                let probability = model.predict(features);
                ScoreResult {
                    probability,
                    confidence: probability.min(0.99),
                    is_phishing: probability > URL_PHISHING_THRESHOLD,
                    risk_tier: RiskTier::from_probability(probability),
                    model_identifier: TRAINED_MODEL.to_string(),
                }
            }
            _ => {
                let probability = Self::rule_score(features);
                ScoreResult {
                    probability,
                    confidence: probability.min(0.95),
                    is_phishing: probability > URL_PHISHING_THRESHOLD,
                    risk_tier: RiskTier::from_probability(probability),
                    model_identifier: RULE_BASED_MODEL.to_string(),
                }
            }
        }
    }

    /// Weighted rule formula, clamped to [0, 1].
    pub fn rule_score(features: &FeatureMap) -> f64 {
        let mut score = URL_BASE_SCORE;

        for rule in URL_WEIGHTS {
            let value = features.get(rule.feature);
            let contribution = match rule.transform {
                Transform::Raw => value,
                Transform::Entropy => ((value - 3.5) / 2.0).clamp(0.0, 1.0),
                Transform::Cap(cap) => value.min(cap),
                Transform::Inverted => {
                    if value != 0.0 {
                        0.0
                    } else {
                        1.0
                    }
                }
                Transform::Subtracted => -value,
            };
            score += contribution * rule.weight;
        }

        // 0 means the age is unknown
        let age = features.get("domain_age_days");
        if age > 0.0 && age < 30.0 {
            score += 0.15;
        } else if age > 0.0 && age < 365.0 {
            score += 0.05;
        }

        if score.is_nan() {
            return 0.0;
        }
        score.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Default)]
pub struct EmailRiskScorer;

impl EmailRiskScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, features: &FeatureMap) -> ScoreResult {
        let probability = Self::rule_score(features);
        ScoreResult {
            probability,
            confidence: (probability * 100.0).round() / 100.0,
            is_phishing: probability > EMAIL_PHISHING_THRESHOLD,
            risk_tier: RiskTier::from_probability(probability),
            model_identifier: EMAIL_RULES_MODEL.to_string(),
        }
    }

    /// All terms are non-negative, so only the upper bound needs clamping.
    pub fn rule_score(features: &FeatureMap) -> f64 {
        let score: f64 = EMAIL_WEIGHTS
            .iter()
            .map(|(feature, weight)| features.get(feature) * weight)
            .sum();
        score.clamp(0.0, 1.0)
    }
}
