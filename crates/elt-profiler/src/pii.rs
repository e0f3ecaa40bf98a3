//! Regex-based PII detector (§4.5 "PII detector"). Scans every text-shaped
//! cell in a view against a fixed set of patterns; the orchestrator only
//! ever sees the [`PiiDetector`] contract, never this strategy.

use elt_core::profiler::{PiiDetector, PiiFinding, PiiReport};
use elt_schemas::value::{TabularView, Value};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

struct Pattern {
    pii_type: &'static str,
    regex: fn() -> &'static Regex,
    confidence: f64,
    high_risk: bool,
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w.+-]+@[\w-]+\.[A-Za-z]{2,}$").unwrap())
}

fn ssn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{3}-\d{2}-\d{4}$").unwrap())
}

fn credit_card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}$").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?1?[-. ]?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}$").unwrap())
}

fn ip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").unwrap())
}

const PATTERNS: &[Pattern] = &[
    Pattern { pii_type: "email", regex: email_re, confidence: 0.95, high_risk: false },
    Pattern { pii_type: "ssn", regex: ssn_re, confidence: 0.9, high_risk: true },
    Pattern { pii_type: "credit_card", regex: credit_card_re, confidence: 0.85, high_risk: true },
    Pattern { pii_type: "phone", regex: phone_re, confidence: 0.7, high_risk: false },
    Pattern { pii_type: "ip_address", regex: ip_re, confidence: 0.6, high_risk: false },
];

fn mask(raw: &str) -> String {
    let len = raw.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let chars: Vec<char> = raw.chars().collect();
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[len - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(len - 4))
}

/// Matches every pattern in [`PATTERNS`] against every non-null text cell.
pub struct RegexPiiDetector;

impl PiiDetector for RegexPiiDetector {
    fn detect(&self, view: &TabularView) -> PiiReport {
        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut findings = Vec::new();
        let mut high_risk_count = 0u64;

        for column in &view.columns {
            for row in &view.rows {
                let value = view.column(row, column);
                let text = match &value {
                    Value::String(s) => s.as_str(),
                    _ => continue,
                };
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }

                for pattern in PATTERNS {
                    if (pattern.regex)().is_match(trimmed) {
                        *by_type.entry(pattern.pii_type.to_string()).or_insert(0) += 1;
                        if pattern.high_risk {
                            high_risk_count += 1;
                        }
                        findings.push(PiiFinding {
                            pii_type: pattern.pii_type.to_string(),
                            column: column.clone(),
                            sample_masked: mask(trimmed),
                            confidence: pattern.confidence,
                        });
                        break;
                    }
                }
            }
        }

        PiiReport {
            total_detections: findings.len() as u64,
            detections_by_type: by_type,
            high_risk_count,
            findings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elt_schemas::value::Fields;

    fn view_of(column: &str, values: &[&str]) -> TabularView {
        let rows: Vec<Fields> = values
            .iter()
            .map(|v| {
                let mut row = Fields::new();
                row.insert(column.to_string(), Value::String(v.to_string()));
                row
            })
            .collect();
        TabularView::from_records(&rows)
    }

    #[test]
    fn detects_email_addresses() {
        let view = view_of("contact", &["jane@example.com", "not an email"]);
        let report = RegexPiiDetector.detect(&view);
        assert_eq!(report.total_detections, 1);
        assert_eq!(report.detections_by_type.get("email"), Some(&1));
    }

    #[test]
    fn ssn_counts_toward_high_risk() {
        let view = view_of("id_number", &["123-45-6789"]);
        let report = RegexPiiDetector.detect(&view);
        assert_eq!(report.high_risk_count, 1);
    }

    #[test]
    fn mask_preserves_head_and_tail_only() {
        let masked = mask("jane@example.com");
        assert!(masked.starts_with("ja"));
        assert!(masked.ends_with("om"));
        assert_eq!(masked.len(), "jane@example.com".len());
        assert!(masked[2..masked.len() - 2].chars().all(|c| c == '*'));
    }
}
