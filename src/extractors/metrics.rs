// src/extractors/metrics.rs

// --- Imports ---
use crate::extractors::catalog::{DerivedMetric, Metric, MetricCatalog, DEFAULT_CATALOG};
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::borrow::Cow;

// --- Constants ---
/// Error value reported when no base metric is found anywhere in a document.
pub const NO_DATA_ERROR: &str = "NO_RELEVANT_FINANCIAL_DATA_FOUND";

/// Unit-less numbers below this magnitude are treated as noise
/// (footnote markers, page numbers, stray ratios).
const MIN_UNITLESS_MAGNITUDE: f64 = 10.0;

// --- Regex Patterns (Lazy Static) ---
// Footnote references such as "(1)" or "(12)"
static FOOTNOTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\d+\)").expect("Failed to compile FOOTNOTE_RE")
});

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").expect("Failed to compile WHITESPACE_RE")
});

// Number with optional comma grouping and fraction, then an optional unit suffix.
// Digits are ASCII only. Longer unit words come first so "billion" is consumed whole.
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(-?[0-9][0-9,]*\.?[0-9]*)\s*(billion|million|b|m)?")
        .expect("Failed to compile NUMBER_RE")
});

// --- Data Structures ---

/// Unit suffix attached to a number. All values are tracked in millions,
/// so unit-less numbers are assumed to already be in millions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Million,
    Billion,
}

impl Unit {
    fn parse(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "b" | "billion" => Some(Unit::Billion),
            "m" | "million" => Some(Unit::Million),
            _ => None,
        }
    }

    /// Factor converting a value in this unit to millions.
    pub fn to_millions(self) -> f64 {
        match self {
            Unit::Million => 1.0,
            Unit::Billion => 1000.0,
        }
    }
}

/// A numeric token found on a line, before filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub value: f64,
    pub unit: Option<Unit>,
}

impl Candidate {
    /// Value in millions, or `None` if the candidate is filtered out as noise.
    fn usable_value(&self) -> Option<f64> {
        match self.unit {
            Some(unit) => Some(self.value * unit.to_millions()),
            None if self.value.abs() < MIN_UNITLESS_MAGNITUDE => None,
            None => Some(self.value),
        }
    }
}

/// Metrics found in one document, in discovery order, plus derived margins.
///
/// Serializes to the JSON contract consumed downstream: one key per metric,
/// or `{"error": "NO_RELEVANT_FINANCIAL_DATA_FOUND"}` when nothing was found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    base: Vec<(Metric, f64)>,
    derived: Vec<(DerivedMetric, f64)>,
}

impl ExtractionResult {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.base
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, v)| *v)
    }

    pub fn get_derived(&self, derived: DerivedMetric) -> Option<f64> {
        self.derived
            .iter()
            .find(|(d, _)| *d == derived)
            .map(|(_, v)| *v)
    }

    pub fn contains(&self, metric: Metric) -> bool {
        self.get(metric).is_some()
    }

    pub fn metrics_found(&self) -> usize {
        self.base.len()
    }

    pub fn derived_found(&self) -> usize {
        self.derived.len()
    }

    /// True when no base metric was extracted.
    pub fn is_no_data(&self) -> bool {
        self.base.is_empty()
    }

    pub fn to_json(&self) -> Result<String, ExtractError> {
        Ok(serde_json::to_string(self)?)
    }

    /// First assignment wins; later values for the same metric are ignored.
    fn assign(&mut self, metric: Metric, value: f64) -> bool {
        if self.contains(metric) {
            return false;
        }
        self.base.push((metric, value));
        true
    }

    /// Computes margins against revenue. Skipped when revenue is absent or zero.
    fn finalize(&mut self) {
        let revenue = match self.get(Metric::Revenue) {
            Some(r) if r != 0.0 => r,
            _ => return,
        };

        for derived in DerivedMetric::ALL {
            if let Some(value) = self.get(derived.numerator()) {
                self.derived.push((derived, round2(value / revenue * 100.0)));
            }
        }
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_no_data() {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry("error", NO_DATA_ERROR)?;
            return map.end();
        }

        let mut map = serializer.serialize_map(Some(self.base.len() + self.derived.len()))?;
        for (metric, value) in &self.base {
            map.serialize_entry(metric.as_str(), value)?;
        }
        for (derived, value) in &self.derived {
            map.serialize_entry(derived.as_str(), value)?;
        }
        map.end()
    }
}

// --- Main Extractor Structure ---

/// Rule-based extractor pulling financial metrics out of page text.
///
/// Holds only the read-only catalog; every call builds its own result, so one
/// extractor can be shared across threads.
#[derive(Debug, Clone)]
pub struct MetricExtractor {
    catalog: Cow<'static, MetricCatalog>,
}

impl MetricExtractor {
    /// Extractor backed by the built-in catalog.
    pub fn new() -> Self {
        Self { catalog: Cow::Borrowed(&*DEFAULT_CATALOG) }
    }

    pub fn with_catalog(catalog: MetricCatalog) -> Self {
        Self { catalog: Cow::Owned(catalog) }
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// Scans pages in order, line by line, and returns the finalized result.
    pub fn extract<I, S>(&self, pages: I) -> ExtractionResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result = ExtractionResult::default();
        let total = self.catalog.len();
        let mut lines_scanned = 0usize;

        'pages: for (page_idx, page) in pages.into_iter().enumerate() {
            for line in page.as_ref().split('\n') {
                if result.metrics_found() == total {
                    tracing::trace!("All {} metrics assigned, stopping at page {}", total, page_idx + 1);
                    break 'pages;
                }
                lines_scanned += 1;
                self.scan_line(line, &mut result);
            }
        }

        result.finalize();
        tracing::debug!(
            "Scanned {} lines: {} metrics, {} derived margins",
            lines_scanned,
            result.metrics_found(),
            result.derived_found()
        );
        result
    }

    fn scan_line(&self, line: &str, result: &mut ExtractionResult) {
        let clean = normalize_line(line);
        if clean.is_empty() {
            return;
        }
        let lower = clean.to_lowercase();

        // Candidates are computed at most once per line, and only if some keyword hits.
        let mut value: Option<Option<f64>> = None;

        for (metric, keywords) in self.catalog.entries() {
            if result.contains(metric) {
                continue;
            }
            if !keywords.iter().any(|k| lower.contains(k.as_str())) {
                continue;
            }

            let selected = *value.get_or_insert_with(|| select_value(&clean));
            if let Some(v) = selected {
                if result.assign(metric, v) {
                    tracing::trace!("Assigned {} = {} from line '{}'", metric.as_str(), v, clean);
                }
            }
        }
    }
}

// --- Line Helpers ---

/// Strips footnote markers, collapses whitespace and trims.
pub fn normalize_line(line: &str) -> String {
    let without_notes = FOOTNOTE_RE.replace_all(line, "");
    WHITESPACE_RE
        .replace_all(&without_notes, " ")
        .trim()
        .to_string()
}

/// Every numeric token on the line with its unit suffix, in left-to-right order.
/// Tokens that do not parse to a finite number are skipped.
pub fn find_candidates(line: &str) -> Vec<Candidate> {
    NUMBER_RE
        .captures_iter(line)
        .filter_map(|caps| {
            let number = caps.get(1)?.as_str().replace(',', "");
            let value = parse_number(&number)?;
            let unit = caps.get(2).and_then(|m| Unit::parse(m.as_str()));
            Some(Candidate { value, unit })
        })
        .collect()
}

/// Usable values on a line in millions, after the percentage and noise filters.
pub fn extract_values(line: &str) -> Vec<f64> {
    // Percentage lines never carry absolute metric values
    if line.contains('%') {
        return Vec::new();
    }
    find_candidates(line)
        .iter()
        .filter_map(Candidate::usable_value)
        .collect()
}

/// The last usable value on the line, rounded to cents of a million.
fn select_value(line: &str) -> Option<f64> {
    extract_values(line).last().copied().map(round2)
}

fn parse_number(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

// Rounds the exact decimal expansion, ties to even, so 10.125 gives 10.12.
fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    fn extract(pages: &[&str]) -> ExtractionResult {
        MetricExtractor::new().extract(pages.iter())
    }

    #[test]
    fn test_no_keywords_yields_error_marker() {
        let pages = ["Letter to shareholders", "We had a great year 2023 with 450 stores"];
        let json = MetricExtractor::new().extract(pages).to_json().unwrap();
        assert_eq!(json, r#"{"error":"NO_RELEVANT_FINANCIAL_DATA_FOUND"}"#);

        let empty: [&str; 0] = [];
        let result = MetricExtractor::new().extract(empty);
        assert!(result.is_no_data());
        assert_eq!(result.to_json().unwrap(), r#"{"error":"NO_RELEVANT_FINANCIAL_DATA_FOUND"}"#);
    }

    #[test]
    fn test_percentage_lines_are_ignored() {
        let result = extract(&["Total revenue grew 12% to 450", "Net income 300"]);
        assert!(!result.contains(Metric::Revenue));
        assert_eq!(result.get(Metric::NetIncome), Some(300.0));
        assert!(extract_values("Gross profit 1,200 margin 40 %").is_empty());
    }

    #[test]
    fn test_small_unitless_values_rejected() {
        let result = extract(&["Total revenue 3"]);
        assert!(result.is_no_data());

        // Negative small numbers are noise too; with a unit they count
        assert!(extract_values("Net income -5").is_empty());
        assert_eq!(extract_values("Net income 5 M"), vec![5.0]);
    }

    #[test]
    fn test_units_normalized_to_millions() {
        let result = extract(&["Total revenue $12.5 billion"]);
        assert_eq!(result.get(Metric::Revenue), Some(12500.0));

        assert_eq!(extract_values("Free cash flow 2.1B"), vec![2100.0]);
        assert_eq!(extract_values("EBITDA 830 million"), vec![830.0]);
        assert_eq!(extract_values("Gross profit 1,234.5"), vec![1234.5]);
    }

    #[test]
    fn test_first_qualifying_line_wins() {
        let result = extract(&["Total revenue 450\nTotal revenue 500"]);
        assert_eq!(result.get(Metric::Revenue), Some(450.0));

        // A keyword line without usable numbers does not claim the metric
        let result = extract(&["Revenue", "Revenue 5", "Revenue 600", "Revenue 700"]);
        assert_eq!(result.get(Metric::Revenue), Some(600.0));
    }

    #[test]
    fn test_first_page_wins_over_later_pages() {
        let result = extract(&["Operating income 120", "Operating income 999"]);
        assert_eq!(result.get(Metric::OperatingIncome), Some(120.0));
    }

    #[test]
    fn test_last_candidate_selected() {
        let result = extract(&["Total revenue 2023: 800 2022: 750"]);
        assert_eq!(result.get(Metric::Revenue), Some(750.0));
    }

    #[test]
    fn test_margins_derived_from_revenue() {
        let result = extract(&["Total revenue 1,000\nOperating income 200\nNet income 150\nAdjusted EBITDA 333"]);
        assert_eq!(result.get_derived(DerivedMetric::OperatingMargin), Some(20.0));
        assert_eq!(result.get_derived(DerivedMetric::NetMargin), Some(15.0));
        assert_eq!(result.get_derived(DerivedMetric::EbitdaMargin), Some(33.3));
    }

    #[test]
    fn test_margins_absent_without_revenue() {
        let result = extract(&["Operating income 200"]);
        assert_eq!(result.get_derived(DerivedMetric::OperatingMargin), None);

        let mut zero_revenue = ExtractionResult::default();
        zero_revenue.assign(Metric::Revenue, 0.0);
        zero_revenue.assign(Metric::OperatingIncome, 200.0);
        zero_revenue.finalize();
        assert_eq!(zero_revenue.derived_found(), 0);
        assert_eq!(zero_revenue.to_json().unwrap(), r#"{"revenue":0.0,"operating_income":200.0}"#);
    }

    #[test]
    fn test_footnote_markers_stripped() {
        assert_eq!(normalize_line("Net income (1) 123"), "Net income 123");
        assert_eq!(normalize_line("  Gross\tprofit   (12)  (3) 88 "), "Gross profit 88");

        let result = extract(&["Net income (1) 123"]);
        assert_eq!(result.get(Metric::NetIncome), Some(123.0));
        assert_eq!(find_candidates(&normalize_line("Net income (1) 123")).len(), 1);
    }

    #[test]
    fn test_line_can_assign_several_metrics() {
        let result = extract(&["Operating income and net income 300"]);
        assert_eq!(result.get(Metric::NetIncome), Some(300.0));
        assert_eq!(result.get(Metric::OperatingIncome), Some(300.0));
    }

    #[test]
    fn test_json_key_order_and_idempotence() {
        let pages = [
            "Cash and cash equivalents 2,500\r\n",
            "Total revenues 4,000 3,800\nIncome from operations 600 550\nEBITDA 900",
        ];
        let extractor = MetricExtractor::new();
        let first = extractor.extract(pages).to_json().unwrap();
        let second = extractor.extract(pages).to_json().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            r#"{"cash_position":2500.0,"revenue":3800.0,"operating_income":550.0,"ebitda":900.0,"operating_margin_percent":14.47,"ebitda_margin_percent":23.68}"#
        );
    }

    #[test]
    fn test_values_rounded_to_two_decimals() {
        let result = extract(&["Gross profit 1,234.5678"]);
        assert_eq!(result.get(Metric::GrossProfit), Some(1234.57));
    }

    #[test]
    fn test_rounding_matches_decimal_ties_to_even() {
        let result = extract(&[
            "Gross profit 10.125",
            "Free cash flow 10.625",
            "Cash and cash equivalents 1.115 M",
        ]);
        assert_eq!(result.get(Metric::GrossProfit), Some(10.12));
        assert_eq!(result.get(Metric::FreeCashFlow), Some(10.62));
        assert_eq!(result.get(Metric::CashPosition), Some(1.11));

        let result = extract(&["Revenue 400 M", "Net income 40.5 M"]);
        assert_eq!(result.get_derived(DerivedMetric::NetMargin), Some(10.12));
    }

    #[test]
    fn test_overflowing_tokens_skipped() {
        let huge = "9".repeat(400);

        let revenue_line = format!("Total revenue {} 450", huge);
        let result = extract(&[revenue_line.as_str()]);
        assert_eq!(result.get(Metric::Revenue), Some(450.0));

        let income_line = format!("Net income {}", huge);
        let result = extract(&[income_line.as_str()]);
        assert!(result.is_no_data());
        assert!(find_candidates(&huge).is_empty());
    }

    #[test]
    fn test_non_ascii_digits_are_not_numbers() {
        let result = extract(&["Net income \u{ff11}\u{ff12}\u{ff13}"]);
        assert!(result.is_no_data());

        let candidates = find_candidates("Revenue \u{0664}\u{0665}\u{0660} 450");
        assert_eq!(candidates, vec![Candidate { value: 450.0, unit: None }]);
    }

    #[test]
    fn test_scanning_stops_once_catalog_is_complete() {
        let complete = "Revenue 1,000\nNet income 100\nOperating income 200\nGross profit 400\n\
                        Free cash flow 150\nCash and cash equivalents 500\nEBITDA 250";
        let extractor = MetricExtractor::new();

        let alone = extractor.extract([complete]);
        assert_eq!(alone.metrics_found(), 7);

        let with_later_lines =
            extractor.extract([complete, "Total revenue 5,000\nEBITDA 9,999\nNet income 1"]);
        assert_eq!(with_later_lines.to_json().unwrap(), alone.to_json().unwrap());
        assert_eq!(with_later_lines.get(Metric::Revenue), Some(1000.0));
    }

    #[test]
    fn test_custom_catalog() {
        let catalog = MetricCatalog::from_json(
            r#"[{"metric": "revenue", "keywords": ["Net Sales"]}]"#,
        )
        .unwrap();
        let extractor = MetricExtractor::with_catalog(catalog);
        let result = extractor.extract(["Total revenue 900", "Net sales 1.2 billion"]);
        assert_eq!(result.get(Metric::Revenue), Some(1200.0));
        assert_eq!(result.metrics_found(), 1);
    }

    #[test]
    fn test_candidates_keep_units_and_order() {
        let candidates = find_candidates("Revenue 1.5 B versus 900 M and 42");
        assert_eq!(
            candidates,
            vec![
                Candidate { value: 1.5, unit: Some(Unit::Billion) },
                Candidate { value: 900.0, unit: Some(Unit::Million) },
                Candidate { value: 42.0, unit: None },
            ]
        );
    }
}
