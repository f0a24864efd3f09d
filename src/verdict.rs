use crate::features::{FeatureMap, FeatureSet, RiskTier};
use crate::scorer::ScoreResult;
use serde::{Deserialize, Serialize};

/// The packaged outcome of one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_phishing: bool,
    pub confidence: f64,
    pub risk_tier: RiskTier,
    pub model_identifier: String,
    pub features: FeatureMap,
    pub warnings: Vec<String>,
}

impl Verdict {
    pub fn assemble(extraction: FeatureSet, score: ScoreResult) -> Self {
        Self {
            is_phishing: score.is_phishing,
            confidence: score.confidence,
            risk_tier: score.risk_tier,
            model_identifier: score.model_identifier,
            features: extraction.features,
            warnings: extraction.warnings,
        }
    }

    pub fn label(&self) -> &'static str {
        if self.is_phishing {
            "Phishing"
        } else {
            "Safe"
        }
    }
}
