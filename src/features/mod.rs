pub mod email_features;
pub mod url_features;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Keys every successful URL extraction produces. A trained model's column
/// list must be drawn from this set; renaming a key breaks existing artifacts.
pub const URL_BASE_KEYS: &[&str] = &[
    "url_length",
    "has_https",
    "has_ip",
    "special_chars_count",
    "suspicious_keywords",
    "domain_entropy",
    "path_length",
    "path_depth",
    "query_length",
    "query_params_count",
    "suspicious_port",
    "has_hyphen",
    "double_hyphen",
    "has_underscore",
    "punycode",
    "https_in_domain",
    "has_mx",
    "alexa_rank",
    "bad_favicon",
    "external_resource_ratio",
    "domain_age_days",
    "tld_trust_score",
    "subdomain_count",
    "has_shortener",
    "redirect_count",
    "ssl_valid",
];

/// Keys every email extraction produces.
pub const EMAIL_BASE_KEYS: &[&str] = &[
    "subject_keywords",
    "body_keywords",
    "link_count",
    "suspicious_attach_count",
    "from_free_domain",
    "from_odd_tld",
    "reply_to_mismatch",
    "generic_greeting",
    "html_tag_count",
];

/// Named numeric signals. Booleans are stored as 0/1.
///
/// Reading a key that is not present yields 0.0, so callers holding a map
/// with extra or missing keys (e.g. a model column list) never fail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMap {
    values: BTreeMap<String, f64>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map holding every key in `keys` at 0.0.
    pub fn with_keys(keys: &[&str]) -> Self {
        let mut map = Self::new();
        for key in keys {
            map.set(key, 0.0);
        }
        map
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn set_flag(&mut self, name: &str, flag: bool) {
        self.set(name, if flag { 1.0 } else { 0.0 });
    }

    pub fn get(&self, name: &str) -> f64 {
        self.values.get(name).copied().unwrap_or(0.0)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name) != 0.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// True when every key in `keys` is present.
    pub fn has_all(&self, keys: &[&str]) -> bool {
        keys.iter().all(|k| self.contains(k))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<'a> FromIterator<(&'a str, f64)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

/// Output of a feature extractor: the signals plus the human-readable
/// warnings in detection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub features: FeatureMap,
    pub warnings: Vec<String>,
}

impl FeatureSet {
    /// Result of an extraction that failed as a whole.
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self {
            features: FeatureMap::new(),
            warnings: vec![format!("Analysis error: {reason}")],
        }
    }

    pub fn warn(&mut self, warning: &str) {
        self.warnings.push(warning.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// Fixed step function: [0, 0.3) Low, [0.3, 0.6) Medium, [0.6, 0.8) High,
    /// otherwise Critical.
    pub fn from_probability(p: f64) -> Self {
        if p < 0.3 {
            RiskTier::Low
        } else if p < 0.6 {
            RiskTier::Medium
        } else if p < 0.8 {
            RiskTier::High
        } else {
            RiskTier::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
            RiskTier::Critical => "Critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
