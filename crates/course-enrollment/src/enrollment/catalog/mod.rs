//! Course catalog maintenance: saving courses with validated prerequisite
//! graphs, resolving instructors by name, and eligibility-aware search.

mod directory;
mod graph;

pub use directory::{
    DirectoryError, InstructorDirectory, InstructorMatch, StoreInstructorDirectory,
};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{Course, CourseId, NewCourse, UserId};
use super::eligibility::unmet_prerequisites;
use super::locks::{hold, CourseLocks};
use super::repository::{RecordStore, RepositoryError};
use super::service::{require_student, EnrollmentServiceError};
use graph::find_cycle;

/// Course fields as submitted by an administrator or a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDraft {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub syllabus: String,
    #[serde(default)]
    pub meeting_times: String,
    pub seat_limit: u32,
    /// Instructor display name, resolved through the [`InstructorDirectory`].
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub prerequisites: BTreeSet<CourseId>,
    #[serde(default = "waitlist_default")]
    pub waitlist_enabled: bool,
}

fn waitlist_default() -> bool {
    true
}

/// Search filters; both match case-insensitively by substring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSearch {
    /// Matched against title or code.
    #[serde(default)]
    pub query: Option<String>,
    /// Matched against meeting times.
    #[serde(default)]
    pub schedule: Option<String>,
}

impl CourseSearch {
    fn matches(&self, course: &Course) -> bool {
        let query_ok = match normalized(self.query.as_deref()) {
            Some(query) => {
                course.title.to_lowercase().contains(&query)
                    || course.code.to_lowercase().contains(&query)
            }
            None => true,
        };
        let schedule_ok = match normalized(self.schedule.as_deref()) {
            Some(schedule) => course.meeting_times.to_lowercase().contains(&schedule),
            None => true,
        };
        query_ok && schedule_ok
    }
}

fn normalized(filter: Option<&str>) -> Option<String> {
    filter
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

fn render_path(path: &[CourseId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn render_ids(ids: &[UserId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} must not be blank")]
    BlankField(&'static str),
    #[error("course code {0} is already in use")]
    DuplicateCode(String),
    #[error("prerequisite {0} does not exist")]
    UnknownPrerequisite(CourseId),
    #[error("{0} cannot be its own prerequisite")]
    SelfPrerequisite(CourseId),
    #[error("prerequisite cycle: {}", render_path(.0))]
    PrerequisiteCycle(Vec<CourseId>),
    #[error("instructor name {name} matches several accounts: {}", render_ids(.candidates))]
    AmbiguousInstructor {
        name: String,
        candidates: Vec<UserId>,
    },
    #[error("{0} not found")]
    NotFound(CourseId),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Enrollment(#[from] EnrollmentServiceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Administrative view over the course table.
pub struct CourseCatalog<R, D> {
    repository: Arc<R>,
    directory: Arc<D>,
    locks: Arc<CourseLocks>,
    /// Serializes catalog writes so the cycle check sees a stable graph.
    edits: Mutex<()>,
}

impl<R, D> CourseCatalog<R, D>
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    pub fn new(repository: Arc<R>, directory: Arc<D>) -> Self {
        Self::with_locks(repository, directory, Arc::new(CourseLocks::default()))
    }

    pub(crate) fn with_locks(
        repository: Arc<R>,
        directory: Arc<D>,
        locks: Arc<CourseLocks>,
    ) -> Self {
        Self {
            repository,
            directory,
            locks,
            edits: Mutex::new(()),
        }
    }

    pub fn create_course(&self, draft: CourseDraft) -> Result<Course, CatalogError> {
        let draft = validate_fields(draft)?;
        let _edits = hold(&self.edits);

        if self.repository.course_by_code(&draft.code)?.is_some() {
            return Err(CatalogError::DuplicateCode(draft.code));
        }
        self.ensure_prerequisites_exist(&draft.prerequisites)?;
        let instructor = self.resolve_instructor(draft.instructor.as_deref())?;

        let code = draft.code.clone();
        let course = self
            .repository
            .insert_course(NewCourse {
                code: draft.code,
                title: draft.title,
                syllabus: draft.syllabus,
                meeting_times: draft.meeting_times,
                seat_limit: draft.seat_limit,
                instructor,
                prerequisites: draft.prerequisites,
                waitlist_enabled: draft.waitlist_enabled,
            })
            .map_err(|error| match error {
                RepositoryError::Conflict => CatalogError::DuplicateCode(code),
                other => CatalogError::Repository(other),
            })?;

        info!(course = %course.id, code = %course.code, seats = course.seat_limit, "course created");
        Ok(course)
    }

    pub fn update_course(&self, id: CourseId, draft: CourseDraft) -> Result<Course, CatalogError> {
        let draft = validate_fields(draft)?;
        let _edits = hold(&self.edits);

        let existing = self.course(id)?;
        if let Some(other) = self.repository.course_by_code(&draft.code)? {
            if other.id != id {
                return Err(CatalogError::DuplicateCode(draft.code));
            }
        }
        if draft.prerequisites.contains(&id) {
            return Err(CatalogError::SelfPrerequisite(id));
        }
        self.ensure_prerequisites_exist(&draft.prerequisites)?;

        let mut edges: BTreeMap<CourseId, BTreeSet<CourseId>> = self
            .repository
            .courses()?
            .into_iter()
            .map(|course| (course.id, course.prerequisites))
            .collect();
        edges.insert(id, draft.prerequisites.clone());
        if let Some(cycle) = find_cycle(&edges) {
            warn!(course = %id, "prerequisite update rejected, cycle detected");
            return Err(CatalogError::PrerequisiteCycle(cycle));
        }

        let instructor = self.resolve_instructor(draft.instructor.as_deref())?;
        let updated = Course {
            id: existing.id,
            code: draft.code,
            title: draft.title,
            syllabus: draft.syllabus,
            meeting_times: draft.meeting_times,
            seat_limit: draft.seat_limit,
            instructor,
            prerequisites: draft.prerequisites,
            waitlist_enabled: draft.waitlist_enabled,
        };

        let slot = self.locks.slot(id);
        let _guard = hold(&slot);
        self.repository
            .update_course(updated.clone())
            .map_err(|error| match error {
                RepositoryError::Conflict => CatalogError::DuplicateCode(updated.code.clone()),
                RepositoryError::NotFound => CatalogError::NotFound(id),
                other => CatalogError::Repository(other),
            })?;

        info!(course = %id, code = %updated.code, "course updated");
        Ok(updated)
    }

    /// Removes the course along with its enrollments, waitlist entries, and override requests.
    pub fn delete_course(&self, id: CourseId) -> Result<(), CatalogError> {
        let _edits = hold(&self.edits);
        let slot = self.locks.slot(id);
        let _guard = hold(&slot);

        self.repository
            .delete_course(id)
            .map_err(|error| match error {
                RepositoryError::NotFound => CatalogError::NotFound(id),
                other => CatalogError::Repository(other),
            })?;
        info!(course = %id, "course deleted");
        Ok(())
    }

    pub fn course(&self, id: CourseId) -> Result<Course, CatalogError> {
        self.repository
            .fetch_course(id)?
            .ok_or(CatalogError::NotFound(id))
    }

    pub fn course_by_code(&self, code: &str) -> Result<Option<Course>, CatalogError> {
        Ok(self.repository.course_by_code(code.trim())?)
    }

    /// All courses ordered by code.
    pub fn courses(&self) -> Result<Vec<Course>, CatalogError> {
        let mut courses = self.repository.courses()?;
        courses.sort_by(|left, right| left.code.cmp(&right.code));
        Ok(courses)
    }

    /// Courses matching the filters whose prerequisites the student has completed.
    pub fn search(
        &self,
        student: UserId,
        filter: &CourseSearch,
        today: NaiveDate,
    ) -> Result<Vec<Course>, CatalogError> {
        let student = require_student(self.repository.as_ref(), student)?;
        let enrollments = self.repository.enrollments_for_student(student.id)?;

        let results: Vec<Course> = self
            .courses()?
            .into_iter()
            .filter(|course| filter.matches(course))
            .filter(|course| unmet_prerequisites(course, &enrollments, today).is_empty())
            .collect();

        debug!(student = %student.id, results = results.len(), "course search");
        Ok(results)
    }

    fn ensure_prerequisites_exist(
        &self,
        prerequisites: &BTreeSet<CourseId>,
    ) -> Result<(), CatalogError> {
        for &prerequisite in prerequisites {
            if self.repository.fetch_course(prerequisite)?.is_none() {
                return Err(CatalogError::UnknownPrerequisite(prerequisite));
            }
        }
        Ok(())
    }

    fn resolve_instructor(&self, name: Option<&str>) -> Result<Option<UserId>, CatalogError> {
        let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) else {
            return Ok(None);
        };

        match self.directory.resolve_or_create(name)? {
            InstructorMatch::Ambiguous(candidates) => Err(CatalogError::AmbiguousInstructor {
                name: name.to_string(),
                candidates,
            }),
            resolved => Ok(resolved.user_id()),
        }
    }
}

fn validate_fields(mut draft: CourseDraft) -> Result<CourseDraft, CatalogError> {
    draft.code = draft.code.trim().to_string();
    draft.title = draft.title.trim().to_string();
    if draft.code.is_empty() {
        return Err(CatalogError::BlankField("code"));
    }
    if draft.title.is_empty() {
        return Err(CatalogError::BlankField("title"));
    }
    Ok(draft)
}
