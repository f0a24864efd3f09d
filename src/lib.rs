pub mod analyzer;
pub mod config;
pub mod dns;
pub mod domain_age;
pub mod domain_utils;
pub mod entropy;
pub mod error;
pub mod features;
pub mod model;
pub mod probes;
pub mod scorer;
pub mod tls_probe;
pub mod url_resolver;
pub mod verdict;

pub use analyzer::{BatchEntry, PhishingAnalyzer};
pub use config::Config;
pub use error::AnalysisError;
pub use features::email_features::EmailMessage;
pub use features::{FeatureMap, FeatureSet, RiskTier};
pub use model::ModelArtifact;
pub use scorer::{ScoreResult, ScoringMode};
pub use verdict::Verdict;
