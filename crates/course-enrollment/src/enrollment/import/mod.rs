mod parser;

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use super::catalog::{CatalogError, CourseCatalog, CourseDraft, InstructorDirectory};
use super::repository::RecordStore;
use parser::{parse_flag, CatalogRecord};

#[derive(Debug)]
pub enum CatalogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidFlag { row: usize, value: String },
    /// Prerequisites must reference a course already in the catalog or on an earlier row.
    UnknownPrerequisite { row: usize, code: String },
    Catalog { row: usize, source: CatalogError },
}

impl std::fmt::Display for CatalogImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogImportError::Io(err) => write!(f, "failed to read catalog file: {}", err),
            CatalogImportError::Csv(err) => write!(f, "invalid catalog CSV data: {}", err),
            CatalogImportError::InvalidFlag { row, value } => {
                write!(f, "row {}: waitlist_enabled value {:?} is not a flag", row, value)
            }
            CatalogImportError::UnknownPrerequisite { row, code } => {
                write!(f, "row {}: prerequisite {} is not in the catalog", row, code)
            }
            CatalogImportError::Catalog { row, source } => {
                write!(f, "row {}: could not save course: {}", row, source)
            }
        }
    }
}

impl std::error::Error for CatalogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogImportError::Io(err) => Some(err),
            CatalogImportError::Csv(err) => Some(err),
            CatalogImportError::Catalog { source, .. } => Some(source),
            CatalogImportError::InvalidFlag { .. }
            | CatalogImportError::UnknownPrerequisite { .. } => None,
        }
    }
}

impl From<std::io::Error> for CatalogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Course codes created and skipped by one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: Vec<String>,
    /// Rows whose code already existed; the stored course is left untouched.
    pub skipped: Vec<String>,
}

/// Loads courses from a catalog CSV export.
///
/// Expected header: `code,title,seat_limit,waitlist_enabled,prerequisites,instructor,meeting_times`
/// with an optional trailing `syllabus` column. Prerequisites are `;`-separated course codes.
pub struct CatalogImporter;

impl CatalogImporter {
    pub fn from_path<P, R, D>(
        path: P,
        catalog: &CourseCatalog<R, D>,
    ) -> Result<ImportSummary, CatalogImportError>
    where
        P: AsRef<Path>,
        R: RecordStore + 'static,
        D: InstructorDirectory + 'static,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, catalog)
    }

    pub fn from_reader<I, R, D>(
        reader: I,
        catalog: &CourseCatalog<R, D>,
    ) -> Result<ImportSummary, CatalogImportError>
    where
        I: Read,
        R: RecordStore + 'static,
        D: InstructorDirectory + 'static,
    {
        let mut summary = ImportSummary::default();

        for record in parser::parse_records(reader)? {
            let row = record.row;
            let existing = catalog
                .course_by_code(&record.code)
                .map_err(|source| CatalogImportError::Catalog { row, source })?;
            if existing.is_some() {
                debug!(row, code = %record.code, "catalog row skipped, code exists");
                summary.skipped.push(record.code);
                continue;
            }

            let draft = draft_from_record(record, catalog)?;
            let course = catalog
                .create_course(draft)
                .map_err(|source| CatalogImportError::Catalog { row, source })?;
            summary.created.push(course.code);
        }

        info!(
            created = summary.created.len(),
            skipped = summary.skipped.len(),
            "catalog import finished"
        );
        Ok(summary)
    }
}

fn draft_from_record<R, D>(
    record: CatalogRecord,
    catalog: &CourseCatalog<R, D>,
) -> Result<CourseDraft, CatalogImportError>
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    let row = record.row;
    let waitlist_enabled = match record.waitlist_enabled.as_deref() {
        Some(value) => parse_flag(value).ok_or_else(|| CatalogImportError::InvalidFlag {
            row,
            value: value.to_string(),
        })?,
        None => true,
    };

    let mut prerequisites = BTreeSet::new();
    for code in record.prerequisites {
        let course = catalog
            .course_by_code(&code)
            .map_err(|source| CatalogImportError::Catalog { row, source })?
            .ok_or(CatalogImportError::UnknownPrerequisite { row, code })?;
        prerequisites.insert(course.id);
    }

    Ok(CourseDraft {
        code: record.code,
        title: record.title,
        syllabus: record.syllabus,
        meeting_times: record.meeting_times,
        seat_limit: record.seat_limit,
        instructor: record.instructor,
        prerequisites,
        waitlist_enabled,
    })
}
