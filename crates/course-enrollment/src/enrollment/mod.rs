//! Course enrollment eligibility, seat allocation, waitlists, and overrides.
//!
//! Every operation takes resolved ids and an injectable clock so callers decide
//! identity and time. Capacity checks and the inserts that follow them run under
//! a per-course lock held by the services.

pub mod catalog;
pub mod domain;
pub(crate) mod eligibility;
pub mod engine;
pub mod import;
mod locks;
pub mod memory;
pub mod overrides;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use catalog::{
    CatalogError, CourseCatalog, CourseDraft, CourseSearch, DirectoryError, InstructorDirectory,
    InstructorMatch, StoreInstructorDirectory,
};
pub use domain::{
    Course, CourseId, Enrollment, EnrollmentId, NewCourse, NewEnrollment, NewOverrideRequest,
    NewUser, NewWaitlistEntry, OverrideRequest, OverrideRequestId, OverrideStatus, User, UserId,
    UserRole, WaitlistEntry, WaitlistEntryId,
};
pub use eligibility::{
    is_mature, maturity_cutoff, EligibilityDecision, EligibilityEvaluator, EligibilitySnapshot,
    PREREQUISITE_MATURITY_DAYS,
};
pub use engine::EnrollmentEngine;
pub use import::{CatalogImportError, CatalogImporter, ImportSummary};
pub use memory::InMemoryRecordStore;
pub use overrides::{OverrideAction, OverrideResolution, OverrideSubmission, OverrideWorkflow};
pub use repository::{RecordStore, RepositoryError};
pub use router::enrollment_router;
pub use service::{
    DropOutcome, EnrollOutcome, EnrollmentEdit, EnrollmentHistory, EnrollmentService,
    EnrollmentServiceError, MissingRecord, NoOpReason, RejectionReason, WaitlistStanding,
};
