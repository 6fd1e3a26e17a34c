//! Query and result models for reading a namespace back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::batch::RowId;

/// Distance metric used for nearest-neighbour queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    CosineDistance,
    EuclideanSquared,
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine_distance" | "cosine" => Ok(DistanceMetric::CosineDistance),
            "euclidean_squared" | "euclidean" => Ok(DistanceMetric::EuclideanSquared),
            _ => Err(format!("unknown distance metric: {}", s)),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::CosineDistance => write!(f, "cosine_distance"),
            DistanceMetric::EuclideanSquared => write!(f, "euclidean_squared"),
        }
    }
}

impl DistanceMetric {
    /// Distance between two vectors of equal length. Smaller is closer.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::EuclideanSquared => {
                a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
            }
            DistanceMetric::CosineDistance => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a * norm_b)
                }
            }
        }
    }
}

/// A query against a namespace.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuerySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_metric: Option<DistanceMetric>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    pub include_vectors: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_attributes: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,
}

impl QuerySpec {
    /// Nearest-neighbour query around `vector`.
    pub fn nearest(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = Some(metric);
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub fn with_vectors(mut self) -> Self {
        self.include_vectors = true;
        self
    }

    #[must_use]
    pub fn with_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_attributes = names.into_iter().map(Into::into).collect();
        self
    }
}

/// One row returned by a query or an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: RowId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<f32>,
}
