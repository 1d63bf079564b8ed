use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Ranked output of a zero-shot model, descending by score.
/// Only the top entry is consumed by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClassification {
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

impl RawClassification {
    pub fn top(&self) -> Option<(&str, f64)> {
        match (self.labels.first(), self.scores.first()) {
            (Some(label), Some(score)) => Some((label.as_str(), *score)),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, input: &str) -> Result<RawClassification>;
}
