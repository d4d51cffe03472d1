// src/extractors/catalog.rs

// --- Imports ---
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;

// --- Metric Names ---

/// Canonical financial line items the extractor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Revenue,
    NetIncome,
    OperatingIncome,
    GrossProfit,
    FreeCashFlow,
    CashPosition,
    Ebitda,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Revenue => "revenue",
            Metric::NetIncome => "net_income",
            Metric::OperatingIncome => "operating_income",
            Metric::GrossProfit => "gross_profit",
            Metric::FreeCashFlow => "free_cash_flow",
            Metric::CashPosition => "cash_position",
            Metric::Ebitda => "ebitda",
        }
    }
}

/// Margin ratios computed from a base metric and revenue after scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedMetric {
    OperatingMargin,
    NetMargin,
    EbitdaMargin,
}

impl DerivedMetric {
    /// Output order of derived keys.
    pub const ALL: [DerivedMetric; 3] = [
        DerivedMetric::OperatingMargin,
        DerivedMetric::NetMargin,
        DerivedMetric::EbitdaMargin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DerivedMetric::OperatingMargin => "operating_margin_percent",
            DerivedMetric::NetMargin => "net_margin_percent",
            DerivedMetric::EbitdaMargin => "ebitda_margin_percent",
        }
    }

    /// The base metric divided by revenue.
    pub fn numerator(self) -> Metric {
        match self {
            DerivedMetric::OperatingMargin => Metric::OperatingIncome,
            DerivedMetric::NetMargin => Metric::NetIncome,
            DerivedMetric::EbitdaMargin => Metric::Ebitda,
        }
    }
}

// --- Default Keywords ---
// Metric order here is the order metrics are evaluated against each line.
const DEFAULT_KEYWORDS: [(Metric, &[&str]); 7] = [
    (Metric::Revenue, &["total revenue", "total revenues", "revenue"]),
    (
        Metric::NetIncome,
        &["net income attributable", "net income", "net earnings"],
    ),
    (
        Metric::OperatingIncome,
        &["income from operations", "operating income"],
    ),
    (Metric::GrossProfit, &["gross profit"]),
    (Metric::FreeCashFlow, &["free cash flow"]),
    (
        Metric::CashPosition,
        &[
            "cash and cash equivalents",
            "cash, cash equivalents and investments",
        ],
    ),
    (Metric::Ebitda, &["adjusted ebitda", "ebitda"]),
];

/// Built-in catalog, constructed once and shared read-only.
pub static DEFAULT_CATALOG: Lazy<MetricCatalog> = Lazy::new(|| MetricCatalog {
    entries: DEFAULT_KEYWORDS
        .iter()
        .map(|(metric, keywords)| (*metric, keywords.iter().map(|k| k.to_string()).collect()))
        .collect(),
});

// --- Data Structures ---

/// One entry of a catalog file: `{"metric": "revenue", "keywords": ["total revenue"]}`.
#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    metric: Metric,
    keywords: Vec<String>,
}

/// Ordered mapping of metric to the lowercase keyword phrases identifying it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCatalog {
    entries: Vec<(Metric, Vec<String>)>,
}

impl MetricCatalog {
    /// Builds a catalog, lowercasing keywords and rejecting duplicate metrics or empty keywords.
    pub fn new(entries: Vec<(Metric, Vec<String>)>) -> Result<Self, ExtractError> {
        if entries.is_empty() {
            return Err(ExtractError::Catalog("catalog defines no metrics".to_string()));
        }

        let mut normalized: Vec<(Metric, Vec<String>)> = Vec::with_capacity(entries.len());
        for (metric, keywords) in entries {
            if normalized.iter().any(|(seen, _)| *seen == metric) {
                return Err(ExtractError::Catalog(format!(
                    "metric '{}' is listed more than once",
                    metric.as_str()
                )));
            }

            let keywords: Vec<String> = keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .collect();
            if keywords.is_empty() || keywords.iter().any(|k| k.is_empty()) {
                return Err(ExtractError::Catalog(format!(
                    "metric '{}' needs at least one non-empty keyword",
                    metric.as_str()
                )));
            }

            normalized.push((metric, keywords));
        }

        Ok(Self { entries: normalized })
    }

    /// Parses a catalog from a JSON array of `{metric, keywords}` objects.
    pub fn from_json(json: &str) -> Result<Self, ExtractError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Self::new(entries.into_iter().map(|e| (e.metric, e.keywords)).collect())
    }

    /// Reads and parses a catalog JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::Catalog(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::info!("Loaded metric catalog from {}", path.display());
        Self::from_json(&json)
    }

    pub fn entries(&self) -> impl Iterator<Item = (Metric, &[String])> {
        self.entries.iter().map(|(m, k)| (*m, k.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
