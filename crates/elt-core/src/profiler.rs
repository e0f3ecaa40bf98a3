use elt_schemas::value::TabularView;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single PII finding (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiFinding {
    pub pii_type: String,
    pub column: String,
    pub sample_masked: String,
    pub confidence: f64,
}

/// The full PII detection summary for one tabular view (§4.5, §4 supplement
/// "high_risk_count").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PiiReport {
    pub total_detections: u64,
    pub detections_by_type: HashMap<String, u64>,
    pub high_risk_count: u64,
    pub findings: Vec<PiiFinding>,
}

/// The PII detector contract the orchestrator calls (§4.5). Implementations
/// are free to be regex-based or ML-based; the orchestrator never
/// inspects the strategy.
pub trait PiiDetector: Send + Sync {
    fn detect(&self, view: &TabularView) -> PiiReport;
}

/// One quality dimension's result (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionResult {
    pub score: f64,
    pub passed: bool,
    pub threshold: f64,
    pub details: String,
}

/// The full quality validation summary (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub overall_score: f64,
    pub overall_passed: bool,
    pub dimensions: HashMap<String, DimensionResult>,
}

/// The six canonical dimensions and their fixed weights (§4.5).
pub const DIMENSION_WEIGHTS: &[(&str, f64)] = &[
    ("completeness", 0.25),
    ("uniqueness", 0.15),
    ("timeliness", 0.10),
    ("validity", 0.20),
    ("accuracy", 0.15),
    ("consistency", 0.15),
];

/// The quality validator contract the orchestrator calls (§4.5).
pub trait QualityValidator: Send + Sync {
    fn validate(&self, view: &TabularView) -> QualityReport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_weights_sum_to_one() {
        let sum: f64 = DIMENSION_WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
