// src/pipeline.rs
use crate::extractors::{ExtractionResult, MetricExtractor};
use crate::sources::{client, document_name, loader, Document, SourceKind};
use crate::utils::error::SourceError;
use crate::utils::AppError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Outcome of extracting metrics from one input document.
#[derive(Debug, Clone)]
pub struct AnalysisRecord {
    pub input: String,
    pub document: String,
    pub source: SourceKind,
    pub page_count: usize,
    pub result: ExtractionResult,
}

/// Loads a local file or URL into page texts. Parsing runs on the blocking pool.
pub async fn load_document(input: &str) -> Result<Document, SourceError> {
    if client::is_url(input) {
        let downloaded = client::download_document(input).await?;
        let name = document_name(input);
        let kind = downloaded
            .content_type
            .as_deref()
            .and_then(SourceKind::from_content_type)
            .unwrap_or_else(|| SourceKind::from_path(Path::new(&name_with_extension(input))));

        let pages = tokio::task::spawn_blocking(move || {
            loader::pages_from_bytes(kind, &downloaded.bytes)
        })
        .await
        .map_err(|e| SourceError::Task(e.to_string()))??;

        Ok(Document { name, kind, pages })
    } else {
        let path = PathBuf::from(input);
        tokio::task::spawn_blocking(move || loader::load_file(&path))
            .await
            .map_err(|e| SourceError::Task(e.to_string()))?
    }
}

// Last URL path segment, keeping its extension, for kind detection.
fn name_with_extension(url: &str) -> String {
    url.split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or_default()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Loads one input and extracts its metrics.
pub async fn process_input(
    input: String,
    extractor: Arc<MetricExtractor>,
) -> Result<AnalysisRecord, AppError> {
    let document = load_document(&input).await?;
    tracing::info!(
        "Extracting metrics from '{}' ({} pages)",
        document.name,
        document.pages.len()
    );

    let (document, result) = tokio::task::spawn_blocking(move || {
        let result = extractor.extract(&document.pages);
        (document, result)
    })
    .await
    .map_err(|e| AppError::Processing(format!("extraction task failed: {}", e)))?;

    if result.is_no_data() {
        tracing::warn!("No financial metrics found in '{}'", document.name);
    } else {
        tracing::info!(
            "Found {} metrics and {} margins in '{}'",
            result.metrics_found(),
            result.derived_found(),
            document.name
        );
    }

    Ok(AnalysisRecord {
        input,
        document: document.name,
        source: document.kind,
        page_count: document.pages.len(),
        result,
    })
}

/// Processes every input as its own task with at most `jobs` in flight.
/// Outcomes are returned in input order; one failure never stops the others.
pub async fn process_all(
    inputs: Vec<String>,
    extractor: Arc<MetricExtractor>,
    jobs: usize,
) -> Vec<(String, Result<AnalysisRecord, AppError>)> {
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));

    let handles: Vec<_> = inputs
        .into_iter()
        .map(|input| {
            let semaphore = Arc::clone(&semaphore);
            let extractor = Arc::clone(&extractor);
            let task_input = input.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Processing(e.to_string()))?;
                process_input(task_input, extractor).await
            });
            (input, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (input, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(AppError::Processing(format!("task for {} failed: {}", input, e))),
        };
        outcomes.push((input, outcome));
    }
    outcomes
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{DerivedMetric, Metric};

    fn write_fixture(dir: &Path, name: &str, contents: &str) -> String {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_process_text_document() {
        let dir = std::env::temp_dir().join(format!("fin_metrics_pipeline_{}", std::process::id()));
        let input = write_fixture(
            &dir,
            "fy2023.txt",
            "Annual Report 2023\nTotal revenue (1) 2,000 1,800\x0C\
             Operating income 500 450\nNet income 300\nRevenue growth 11%",
        );

        let extractor = Arc::new(MetricExtractor::new());
        let record = tokio_test::block_on(process_input(input.clone(), extractor)).unwrap();

        assert_eq!(record.input, input);
        assert_eq!(record.document, "fy2023");
        assert_eq!(record.source, SourceKind::Text);
        assert_eq!(record.page_count, 2);
        assert_eq!(record.result.get(Metric::Revenue), Some(1800.0));
        assert_eq!(record.result.get_derived(DerivedMetric::OperatingMargin), Some(25.0));
        assert_eq!(record.result.get_derived(DerivedMetric::NetMargin), Some(16.67));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_process_all_keeps_order_and_isolates_failures() {
        let dir = std::env::temp_dir().join(format!("fin_metrics_batch_{}", std::process::id()));
        let good = write_fixture(&dir, "good.html", "<p>Gross profit 1.1 billion</p>");
        let empty = write_fixture(&dir, "empty.txt", "Nothing to see here 3");
        let missing = dir.join("missing.pdf").to_string_lossy().into_owned();

        let extractor = Arc::new(MetricExtractor::new());
        let outcomes = tokio_test::block_on(process_all(
            vec![good.clone(), missing.clone(), empty.clone()],
            extractor,
            2,
        ));

        let inputs: Vec<&str> = outcomes.iter().map(|(i, _)| i.as_str()).collect();
        assert_eq!(inputs, vec![good.as_str(), missing.as_str(), empty.as_str()]);

        let good_record = outcomes[0].1.as_ref().unwrap();
        assert_eq!(good_record.result.get(Metric::GrossProfit), Some(1100.0));
        assert!(matches!(outcomes[1].1, Err(AppError::Source(SourceError::Io(_)))));
        assert!(outcomes[2].1.as_ref().unwrap().result.is_no_data());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_name_with_extension() {
        assert_eq!(name_with_extension("https://example.com/a/b/report.pdf?x=1"), "report.pdf");
        assert_eq!(name_with_extension("https://example.com/"), "");
    }
}
