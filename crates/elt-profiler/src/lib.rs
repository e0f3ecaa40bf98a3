//! Profiler Contracts (§4.5): the default PII detector and quality
//! validator implementations the orchestrator wires in when no
//! caller-supplied one is configured.

pub mod pii;
pub mod quality;

pub use pii::RegexPiiDetector;
pub use quality::{DefaultQualityValidator, QualityThresholds};
