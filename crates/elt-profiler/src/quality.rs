//! Default quality validator (§4.5): the six canonical dimensions, each
//! scored in `[0,1]`, combined through the fixed weights in
//! [`elt_core::profiler::DIMENSION_WEIGHTS`].

use chrono::{Duration, Utc};
use elt_core::profiler::{DimensionResult, QualityReport, QualityValidator, DIMENSION_WEIGHTS};
use elt_schemas::value::{TabularView, Value};
use regex::Regex;
use std::sync::OnceLock;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w.+-]+@[\w-]+\.[A-Za-z]{2,}$").unwrap())
}

/// Per-dimension thresholds and the timeliness horizon, all defaulted per
/// §4.5 ("Default per-dimension thresholds").
#[derive(Debug, Clone)]
pub struct QualityThresholds {
    pub completeness: f64,
    pub uniqueness: f64,
    pub validity: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub timeliness: f64,
    pub timeliness_horizon_days: i64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        QualityThresholds {
            completeness: 0.95,
            uniqueness: 0.98,
            validity: 0.90,
            accuracy: 0.90,
            consistency: 0.90,
            timeliness: 0.80,
            timeliness_horizon_days: 7,
        }
    }
}

pub struct DefaultQualityValidator {
    pub thresholds: QualityThresholds,
}

impl Default for DefaultQualityValidator {
    fn default() -> Self {
        DefaultQualityValidator { thresholds: QualityThresholds::default() }
    }
}

fn threshold_for(name: &str, t: &QualityThresholds) -> f64 {
    match name {
        "completeness" => t.completeness,
        "uniqueness" => t.uniqueness,
        "validity" => t.validity,
        "accuracy" => t.accuracy,
        "consistency" => t.consistency,
        "timeliness" => t.timeliness,
        _ => 0.0,
    }
}

fn completeness(view: &TabularView) -> (f64, String) {
    if view.is_empty() || view.columns.is_empty() {
        return (1.0, "no rows to check".to_string());
    }
    let mut total = 0usize;
    let mut non_null = 0usize;
    for row in &view.rows {
        for col in &view.columns {
            total += 1;
            if !view.column(row, col).is_null() {
                non_null += 1;
            }
        }
    }
    let score = non_null as f64 / total as f64;
    (score, format!("{non_null}/{total} cells non-null"))
}

fn uniqueness(view: &TabularView) -> (f64, String) {
    if view.rows.len() <= 1 {
        return (1.0, "fewer than two rows".to_string());
    }
    let mut seen = std::collections::HashSet::new();
    let mut duplicates = 0usize;
    for row in &view.rows {
        let key = elt_schemas::row_hash(row);
        if !seen.insert(key) {
            duplicates += 1;
        }
    }
    let score = 1.0 - (duplicates as f64 / view.rows.len() as f64);
    (score, format!("{duplicates}/{} duplicate rows", view.rows.len()))
}

fn looks_like_email_column(name: &str) -> bool {
    name.to_lowercase().contains("email")
}

fn validity(view: &TabularView) -> (f64, String) {
    if view.is_empty() || view.columns.is_empty() {
        return (1.0, "no rows to check".to_string());
    }
    let mut total = 0usize;
    let mut valid = 0usize;
    for row in &view.rows {
        for col in &view.columns {
            let value = view.column(row, col);
            if value.is_null() {
                continue;
            }
            total += 1;
            let ok = match &value {
                Value::Float(f) => f.is_finite(),
                Value::String(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        false
                    } else if looks_like_email_column(col) {
                        email_re().is_match(trimmed)
                    } else {
                        trimmed == s
                    }
                }
                _ => true,
            };
            if ok {
                valid += 1;
            }
        }
    }
    if total == 0 {
        return (1.0, "no non-null cells to check".to_string());
    }
    let score = valid as f64 / total as f64;
    (score, format!("{valid}/{total} cells well-formed"))
}

fn quartiles(values: &mut [f64]) -> (f64, f64) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let q_at = |p: f64| -> f64 {
        let idx = p * (values.len() - 1) as f64;
        let lo = idx.floor() as usize;
        let hi = idx.ceil() as usize;
        if lo == hi {
            values[lo]
        } else {
            values[lo] + (values[hi] - values[lo]) * (idx - lo as f64)
        }
    };
    (q_at(0.25), q_at(0.75))
}

fn accuracy(view: &TabularView) -> (f64, String) {
    if view.is_empty() || view.columns.is_empty() {
        return (1.0, "no rows to check".to_string());
    }
    let mut total = 0usize;
    let mut within_bounds = 0usize;

    for col in &view.columns {
        let mut numeric: Vec<f64> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        for row in &view.rows {
            match view.column(row, col) {
                Value::Int(n) => numeric.push(n as f64),
                Value::Float(f) if f.is_finite() => numeric.push(f),
                Value::String(s) => texts.push(s),
                _ => {}
            }
        }

        if numeric.len() >= 4 {
            let mut sample = numeric.clone();
            let (q1, q3) = quartiles(&mut sample);
            let iqr = q3 - q1;
            let lo = q1 - 1.5 * iqr;
            let hi = q3 + 1.5 * iqr;
            for v in &numeric {
                total += 1;
                if *v >= lo && *v <= hi {
                    within_bounds += 1;
                }
            }
        } else {
            total += numeric.len();
            within_bounds += numeric.len();
        }

        for t in &texts {
            total += 1;
            let len_ok = (1..=512).contains(&t.trim().len());
            let class_ok = t.chars().all(|c| !c.is_control());
            if len_ok && class_ok {
                within_bounds += 1;
            }
        }
    }

    if total == 0 {
        return (1.0, "no checkable cells".to_string());
    }
    let score = within_bounds as f64 / total as f64;
    (score, format!("{within_bounds}/{total} cells within bounds"))
}

fn find_column(view: &TabularView, needle: &str) -> Option<String> {
    view.columns.iter().find(|c| c.to_lowercase().contains(needle)).cloned()
}

fn consistency(view: &TabularView) -> (f64, String) {
    if view.is_empty() {
        return (1.0, "no rows to check".to_string());
    }

    let start_col = find_column(view, "start");
    let end_col = find_column(view, "end");
    let total_col = find_column(view, "total");
    let mut seen = std::collections::HashSet::new();

    let mut total = 0usize;
    let mut passed = 0usize;

    for row in &view.rows {
        let mut row_ok = true;

        if let (Some(start), Some(end)) = (&start_col, &end_col) {
            if let (Value::Timestamp(s), Value::Timestamp(e)) = (view.column(row, start), view.column(row, end)) {
                row_ok &= s <= e;
            }
        }

        if let Some(total_col) = &total_col {
            let component_sum: f64 = view
                .columns
                .iter()
                .filter(|c| *c != total_col && !c.to_lowercase().contains("start") && !c.to_lowercase().contains("end"))
                .filter_map(|c| match view.column(row, c) {
                    Value::Int(n) => Some(n as f64),
                    Value::Float(f) => Some(f),
                    _ => None,
                })
                .sum();
            if let Value::Int(_) | Value::Float(_) = view.column(row, total_col) {
                let stated = match view.column(row, total_col) {
                    Value::Int(n) => n as f64,
                    Value::Float(f) => f,
                    _ => unreachable!(),
                };
                if component_sum > 0.0 {
                    row_ok &= (stated - component_sum).abs() < 1e-6;
                }
            }
        }

        let key = elt_schemas::row_hash(row);
        if !seen.insert(key) {
            row_ok = false;
        }

        total += 1;
        if row_ok {
            passed += 1;
        }
    }

    let score = passed as f64 / total as f64;
    (score, format!("{passed}/{total} rows pass cross-field checks"))
}

fn timeliness(view: &TabularView, horizon_days: i64) -> (f64, String) {
    let cutoff = Utc::now() - Duration::days(horizon_days);
    let mut total = 0usize;
    let mut fresh = 0usize;

    for row in &view.rows {
        for col in &view.columns {
            if let Value::Timestamp(ts) = view.column(row, col) {
                total += 1;
                if ts >= cutoff {
                    fresh += 1;
                }
            }
        }
    }

    if total == 0 {
        return (1.0, "no date-typed cells found".to_string());
    }
    let score = fresh as f64 / total as f64;
    (score, format!("{fresh}/{total} date cells within {horizon_days}d horizon"))
}

impl QualityValidator for DefaultQualityValidator {
    fn validate(&self, view: &TabularView) -> QualityReport {
        let t = &self.thresholds;
        let (comp_score, comp_details) = completeness(view);
        let (uniq_score, uniq_details) = uniqueness(view);
        let (time_score, time_details) = timeliness(view, t.timeliness_horizon_days);
        let (valid_score, valid_details) = validity(view);
        let (acc_score, acc_details) = accuracy(view);
        let (cons_score, cons_details) = consistency(view);

        let scored: Vec<(&str, f64, String)> = vec![
            ("completeness", comp_score, comp_details),
            ("uniqueness", uniq_score, uniq_details),
            ("timeliness", time_score, time_details),
            ("validity", valid_score, valid_details),
            ("accuracy", acc_score, acc_details),
            ("consistency", cons_score, cons_details),
        ];

        let mut dimensions = std::collections::HashMap::new();
        let mut overall_score = 0.0;
        let mut overall_passed = true;

        for (name, score, details) in scored {
            let threshold = threshold_for(name, t);
            let weight = DIMENSION_WEIGHTS.iter().find(|(n, _)| *n == name).map(|(_, w)| *w).unwrap_or(0.0);
            let passed = score >= threshold;
            overall_passed &= passed;
            overall_score += weight * score;
            dimensions.insert(name.to_string(), DimensionResult { score, passed, threshold, details });
        }

        QualityReport { overall_score, overall_passed, dimensions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elt_schemas::value::Fields;

    #[test]
    fn all_complete_unique_rows_score_perfectly_on_those_dimensions() {
        let mut row1 = Fields::new();
        row1.insert("id".into(), Value::Int(1));
        let mut row2 = Fields::new();
        row2.insert("id".into(), Value::Int(2));
        let view = TabularView::from_records(&[row1, row2]);

        let report = DefaultQualityValidator::default().validate(&view);
        assert_eq!(report.dimensions["completeness"].score, 1.0);
        assert_eq!(report.dimensions["uniqueness"].score, 1.0);
    }

    #[test]
    fn duplicate_rows_reduce_uniqueness_score() {
        let mut row = Fields::new();
        row.insert("id".into(), Value::Int(1));
        let view = TabularView::from_records(&[row.clone(), row]);
        let (score, _) = uniqueness(&view);
        assert!(score < 1.0);
    }

    #[test]
    fn infinite_float_fails_validity() {
        let mut row = Fields::new();
        row.insert("x".into(), Value::Float(f64::INFINITY));
        let view = TabularView::from_records(&[row]);
        let (score, _) = validity(&view);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn overall_passed_requires_every_dimension_above_threshold() {
        let mut row = Fields::new();
        row.insert("x".into(), Value::Null);
        let view = TabularView::from_records(&[row]);
        let report = DefaultQualityValidator::default().validate(&view);
        assert!(!report.overall_passed);
    }
}
