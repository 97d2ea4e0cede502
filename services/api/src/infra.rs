use chrono::NaiveDate;
use course_enrollment::enrollment::{
    CatalogImporter, EnrollmentEngine, ImportSummary, InMemoryRecordStore,
    StoreInstructorDirectory,
};
use course_enrollment::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type ApiEngine =
    EnrollmentEngine<InMemoryRecordStore, StoreInstructorDirectory<InMemoryRecordStore>>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Engine over a fresh in-memory store, optionally seeded from a catalog CSV.
pub(crate) fn build_engine(
    seed: Option<&Path>,
) -> Result<(Arc<ApiEngine>, Option<ImportSummary>), AppError> {
    let store = Arc::new(InMemoryRecordStore::new());
    let engine = Arc::new(EnrollmentEngine::with_store(store));

    let summary = match seed {
        Some(path) => {
            let summary = CatalogImporter::from_path(path, engine.catalog())?;
            info!(
                path = %path.display(),
                created = summary.created.len(),
                "catalog seeded"
            );
            Some(summary)
        }
        None => None,
    };

    Ok((engine, summary))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
