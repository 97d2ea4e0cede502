use std::sync::Arc;

use super::catalog::{CourseCatalog, InstructorDirectory, StoreInstructorDirectory};
use super::overrides::OverrideWorkflow;
use super::repository::RecordStore;
use super::service::EnrollmentService;

/// Enrollment, override, and catalog services over one store with shared course locks.
pub struct EnrollmentEngine<R, D> {
    enrollments: EnrollmentService<R>,
    overrides: OverrideWorkflow<R>,
    catalog: CourseCatalog<R, D>,
}

impl<R> EnrollmentEngine<R, StoreInstructorDirectory<R>>
where
    R: RecordStore + 'static,
{
    /// Engine whose instructor directory reads and writes the same store.
    pub fn with_store(repository: Arc<R>) -> Self {
        let directory = Arc::new(StoreInstructorDirectory::new(repository.clone()));
        Self::new(repository, directory)
    }
}

impl<R, D> EnrollmentEngine<R, D>
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    pub fn new(repository: Arc<R>, directory: Arc<D>) -> Self {
        let enrollments = EnrollmentService::new(repository.clone());
        let overrides = enrollments.override_workflow();
        let catalog = CourseCatalog::with_locks(repository, directory, enrollments.locks());
        Self {
            enrollments,
            overrides,
            catalog,
        }
    }

    pub fn enrollments(&self) -> &EnrollmentService<R> {
        &self.enrollments
    }

    pub fn overrides(&self) -> &OverrideWorkflow<R> {
        &self.overrides
    }

    pub fn catalog(&self) -> &CourseCatalog<R, D> {
        &self.catalog
    }
}
