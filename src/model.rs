//! Optional trained classifier for URL scoring.
//!
//! Artifacts are JSON documents produced by the offline training job:
//!
//! ```json
//! {
//!   "columns": ["url_length", "has_https", "..."],
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 1, "threshold": 0.5, "left": 1, "right": 2 },
//!         { "value": 0.82 },
//!         { "value": 0.07 }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Each tree sends a sample left when `x[feature] <= threshold`; leaves hold
//! the positive-class probability and the forest averages its trees.

use crate::features::{FeatureMap, URL_BASE_KEYS};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A predictive function from a feature vector to P(phishing).
pub trait Classifier: Send + Sync {
    fn predict_proba(&self, vector: &[f64]) -> f64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn validate(&self, width: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(anyhow!("tree has no nodes"));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= width {
                        return Err(anyhow!("node {idx} uses feature {feature}, only {width} columns"));
                    }
                    // Children must point forward, which also rules out cycles
                    if *left <= idx || *right <= idx || *left >= self.nodes.len() || *right >= self.nodes.len() {
                        return Err(anyhow!("node {idx} has invalid children ({left}, {right})"));
                    }
                }
                TreeNode::Leaf { value } => {
                    if !(0.0..=1.0).contains(value) {
                        return Err(anyhow!("leaf {idx} probability {value} outside [0, 1]"));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict(&self, vector: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = vector.get(*feature).copied().unwrap_or(0.0);
                    idx = if x <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<DecisionTree>,
}

impl Classifier for RandomForest {
    fn predict_proba(&self, vector: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(vector)).sum();
        (sum / self.trees.len() as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    columns: Vec<String>,
    trees: Vec<DecisionTree>,
}

/// A classifier plus the column order that fixes its input layout.
pub struct ModelArtifact {
    columns: Vec<String>,
    classifier: Box<dyn Classifier>,
}

impl std::fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl ModelArtifact {
    pub fn new(columns: Vec<String>, classifier: Box<dyn Classifier>) -> Self {
        for column in &columns {
            if !URL_BASE_KEYS.contains(&column.as_str()) {
                log::warn!("Model column '{column}' is not produced by the URL extractor, it will read as 0");
            }
        }
        Self {
            columns,
            classifier,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: ArtifactFile = serde_json::from_str(json)?;
        if file.columns.is_empty() {
            return Err(anyhow!("model has no columns"));
        }
        if file.trees.is_empty() {
            return Err(anyhow!("model has no trees"));
        }
        for (i, tree) in file.trees.iter().enumerate() {
            tree.validate(file.columns.len())
                .with_context(|| format!("tree {i} is invalid"))?;
        }

        Ok(Self::new(
            file.columns,
            Box::new(RandomForest { trees: file.trees }),
        ))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading model {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("loading model {}", path.display()))
    }

    /// Load an artifact if one is usable at `path`. A missing or broken file
    /// is not an error: scoring falls back to rules.
    pub fn load_optional(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No model at {}, using rule-based URL scoring", path.display());
            return None;
        }
        match Self::from_file(path) {
            Ok(model) => {
                log::info!(
                    "Loaded URL model from {} ({} columns)",
                    path.display(),
                    model.columns.len()
                );
                Some(model)
            }
            Err(e) => {
                log::warn!("Ignoring unusable model: {e:#}");
                None
            }
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Lay out `features` in column order; absent features read as 0.
    pub fn vectorize(&self, features: &FeatureMap) -> Vec<f64> {
        self.columns.iter().map(|c| features.get(c)).collect()
    }

    pub fn predict(&self, features: &FeatureMap) -> f64 {
        self.classifier
            .predict_proba(&self.vectorize(features))
            .clamp(0.0, 1.0)
    }
}
