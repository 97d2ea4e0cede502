use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    Course, CourseId, Enrollment, NewEnrollment, NewOverrideRequest, OverrideRequest,
    OverrideRequestId, OverrideStatus, User, UserId, UserRole,
};
use super::locks::{hold, CourseLocks};
use super::repository::RecordStore;
use super::service::{
    require_course, require_student, require_user, EnrollmentServiceError,
};

/// Reviewer verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAction {
    Approve,
    Deny,
}

/// Result of a student filing a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OverrideSubmission {
    Created { request: OverrideRequest },
    /// Any earlier request for the pair, pending or resolved, blocks a new one.
    AlreadyRequested { request: OverrideRequest },
}

/// Result of a reviewer acting on a request. Every variant is non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OverrideResolution {
    Approved {
        request: OverrideRequest,
        enrollment: Enrollment,
        newly_enrolled: bool,
        waitlist_cleared: bool,
    },
    Denied {
        request: OverrideRequest,
    },
    AlreadyResolved {
        request: OverrideRequest,
    },
    /// Unknown id; carries the reviewer's current pending list for re-display.
    NotFound {
        request_id: OverrideRequestId,
        pending: Vec<OverrideRequest>,
    },
}

impl OverrideResolution {
    pub fn summary(&self) -> String {
        match self {
            OverrideResolution::Approved { request, .. } => {
                format!("{} approved, student enrolled", request.id)
            }
            OverrideResolution::Denied { request } => format!("{} denied", request.id),
            OverrideResolution::AlreadyResolved { request } => {
                format!("{} already {}", request.id, request.status.label())
            }
            OverrideResolution::NotFound { request_id, .. } => {
                format!("{request_id} not found")
            }
        }
    }
}

/// Pending → approved/denied workflow that bypasses eligibility for one student/course pair.
pub struct OverrideWorkflow<R> {
    repository: Arc<R>,
    locks: Arc<CourseLocks>,
}

impl<R> OverrideWorkflow<R>
where
    R: RecordStore + 'static,
{
    pub(crate) fn new(repository: Arc<R>, locks: Arc<CourseLocks>) -> Self {
        Self { repository, locks }
    }

    pub fn request(
        &self,
        student: UserId,
        course: CourseId,
        reason: impl Into<String>,
    ) -> Result<OverrideSubmission, EnrollmentServiceError> {
        let student = require_student(self.repository.as_ref(), student)?;
        let course = require_course(self.repository.as_ref(), course)?;

        let slot = self.locks.slot(course.id);
        let _guard = hold(&slot);

        if let Some(existing) = self.repository.find_override_request(student.id, course.id)? {
            return Ok(OverrideSubmission::AlreadyRequested { request: existing });
        }

        let request = self.repository.insert_override_request(NewOverrideRequest {
            student: student.id,
            course: course.id,
            reason: reason.into(),
        })?;
        info!(request = %request.id, student = %student.id, course = %course.code, "override requested");
        Ok(OverrideSubmission::Created { request })
    }

    /// Administrators see every pending request; instructors see their own courses'.
    pub fn pending(
        &self,
        reviewer: UserId,
    ) -> Result<Vec<OverrideRequest>, EnrollmentServiceError> {
        let reviewer = require_user(self.repository.as_ref(), reviewer)?;
        self.pending_for(&reviewer)
    }

    fn pending_for(&self, reviewer: &User) -> Result<Vec<OverrideRequest>, EnrollmentServiceError> {
        let pending = self
            .repository
            .override_requests_with_status(OverrideStatus::Pending)?;

        match reviewer.role {
            UserRole::Administrator => Ok(pending),
            UserRole::Instructor => {
                let mut visible = Vec::with_capacity(pending.len());
                for request in pending {
                    let taught = self
                        .repository
                        .fetch_course(request.course)?
                        .map(|course| course.is_instructed_by(reviewer.id))
                        .unwrap_or(false);
                    if taught {
                        visible.push(request);
                    }
                }
                Ok(visible)
            }
            other => Err(EnrollmentServiceError::RoleMismatch {
                user: reviewer.id,
                expected: UserRole::Instructor,
                actual: other,
            }),
        }
    }

    pub fn approve(
        &self,
        request: OverrideRequestId,
        reviewer: UserId,
        today: NaiveDate,
    ) -> Result<OverrideResolution, EnrollmentServiceError> {
        self.resolve(request, reviewer, OverrideAction::Approve, today)
    }

    pub fn deny(
        &self,
        request: OverrideRequestId,
        reviewer: UserId,
        today: NaiveDate,
    ) -> Result<OverrideResolution, EnrollmentServiceError> {
        self.resolve(request, reviewer, OverrideAction::Deny, today)
    }

    pub fn resolve(
        &self,
        request_id: OverrideRequestId,
        reviewer: UserId,
        action: OverrideAction,
        today: NaiveDate,
    ) -> Result<OverrideResolution, EnrollmentServiceError> {
        let reviewer = require_user(self.repository.as_ref(), reviewer)?;

        let Some(unlocked) = self.repository.fetch_override_request(request_id)? else {
            return self.not_found(request_id, &reviewer);
        };

        let slot = self.locks.slot(unlocked.course);
        let _guard = hold(&slot);

        // Another reviewer may have resolved or a cascade removed it while we waited.
        let Some(request) = self.repository.fetch_override_request(request_id)? else {
            return self.not_found(request_id, &reviewer);
        };
        let course = require_course(self.repository.as_ref(), request.course)?;
        authorize(&reviewer, &course)?;

        if request.status.is_terminal() {
            return Ok(OverrideResolution::AlreadyResolved { request });
        }

        match action {
            OverrideAction::Deny => {
                let request = OverrideRequest {
                    status: OverrideStatus::Denied,
                    ..request
                };
                self.repository.update_override_request(request.clone())?;
                info!(request = %request.id, reviewer = %reviewer.id, "override denied");
                Ok(OverrideResolution::Denied { request })
            }
            OverrideAction::Approve => self.approve_locked(request, &course, &reviewer, today),
        }
    }

    fn not_found(
        &self,
        request_id: OverrideRequestId,
        reviewer: &User,
    ) -> Result<OverrideResolution, EnrollmentServiceError> {
        warn!(request = %request_id, "override request not found");
        let pending = self.pending_for(reviewer)?;
        Ok(OverrideResolution::NotFound {
            request_id,
            pending,
        })
    }

    /// Caller holds the course slot and has seen the request pending.
    fn approve_locked(
        &self,
        request: OverrideRequest,
        course: &Course,
        reviewer: &User,
        today: NaiveDate,
    ) -> Result<OverrideResolution, EnrollmentServiceError> {
        let request = OverrideRequest {
            status: OverrideStatus::Approved,
            ..request
        };
        self.repository.update_override_request(request.clone())?;

        let (enrollment, newly_enrolled) =
            match self.repository.find_enrollment(request.student, course.id)? {
                Some(existing) => (existing, false),
                None => {
                    let created = self.repository.insert_enrollment(NewEnrollment {
                        student: request.student,
                        course: course.id,
                        date_enrolled: today,
                    })?;
                    (created, true)
                }
            };

        let waitlist_cleared = match self
            .repository
            .find_waitlist_entry(request.student, course.id)?
        {
            Some(entry) => self.repository.delete_waitlist_entry(entry.id)?,
            None => false,
        };

        info!(
            request = %request.id,
            reviewer = %reviewer.id,
            course = %course.code,
            newly_enrolled,
            waitlist_cleared,
            "override approved"
        );
        Ok(OverrideResolution::Approved {
            request,
            enrollment,
            newly_enrolled,
            waitlist_cleared,
        })
    }
}

fn authorize(reviewer: &User, course: &Course) -> Result<(), EnrollmentServiceError> {
    let allowed = match reviewer.role {
        UserRole::Administrator => true,
        UserRole::Instructor => course.is_instructed_by(reviewer.id),
        UserRole::Student | UserRole::Advisor => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(EnrollmentServiceError::Forbidden {
            reviewer: reviewer.id,
            course: course.id,
        })
    }
}
