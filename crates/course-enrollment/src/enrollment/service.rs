use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{
    Course, CourseId, Enrollment, EnrollmentId, NewEnrollment, NewWaitlistEntry, User, UserId,
    UserRole, WaitlistEntry,
};
use super::eligibility::{
    maturity_cutoff, EligibilityDecision, EligibilityEvaluator, EligibilitySnapshot,
};
use super::locks::{hold, CourseLocks};
use super::overrides::OverrideWorkflow;
use super::repository::{RecordStore, RepositoryError};

/// Result of an enroll attempt. Rejections and no-ops are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnrollOutcome {
    Enrolled { enrollment: Enrollment },
    Waitlisted { entry: WaitlistEntry, position: usize },
    NoOp { reason: NoOpReason },
    Rejected { reason: RejectionReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    AlreadyEnrolled,
    AlreadyWaitlisted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    MissingPrerequisites { missing: Vec<CourseId> },
    CourseFull,
}

impl EnrollOutcome {
    pub fn summary(&self) -> String {
        match self {
            EnrollOutcome::Enrolled { enrollment } => {
                format!("enrolled in {} on {}", enrollment.course, enrollment.date_enrolled)
            }
            EnrollOutcome::Waitlisted { entry, position } => {
                format!("waitlisted for {} at position {position}", entry.course)
            }
            EnrollOutcome::NoOp {
                reason: NoOpReason::AlreadyEnrolled,
            } => "already enrolled".to_string(),
            EnrollOutcome::NoOp {
                reason: NoOpReason::AlreadyWaitlisted,
            } => "already on the waitlist".to_string(),
            EnrollOutcome::Rejected {
                reason: RejectionReason::MissingPrerequisites { missing },
            } => {
                let ids: Vec<String> = missing.iter().map(ToString::to_string).collect();
                format!("rejected, prerequisites missing or too recent: {}", ids.join(", "))
            }
            EnrollOutcome::Rejected {
                reason: RejectionReason::CourseFull,
            } => "rejected, course full and waitlist disabled".to_string(),
        }
    }
}

/// Result of a drop. `promoted` is the enrollment created for the head of the waitlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DropOutcome {
    Dropped {
        enrollment: Enrollment,
        promoted: Option<Enrollment>,
    },
    NotEnrolled,
}

/// One waitlist entry together with its 1-indexed queue position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistStanding {
    pub entry: WaitlistEntry,
    pub course_code: String,
    pub position: usize,
}

/// Enrollments split at the prerequisite maturity cutoff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentHistory {
    /// Enrolled on or after the cutoff.
    pub current: Vec<Enrollment>,
    /// Enrolled strictly before the cutoff.
    pub past: Vec<Enrollment>,
}

/// Administrative correction of a stored enrollment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentEdit {
    /// `Some("")` clears the grade.
    #[serde(default)]
    pub final_grade: Option<String>,
    #[serde(default)]
    pub date_enrolled: Option<NaiveDate>,
}

/// Record the caller referenced that the store does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRecord {
    User(UserId),
    Course(CourseId),
    Enrollment(EnrollmentId),
    WaitlistEntry { student: UserId, course: CourseId },
}

impl fmt::Display for MissingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingRecord::User(id) => write!(f, "{id}"),
            MissingRecord::Course(id) => write!(f, "{id}"),
            MissingRecord::Enrollment(id) => write!(f, "{id}"),
            MissingRecord::WaitlistEntry { student, course } => {
                write!(f, "waitlist entry for {student} in {course}")
            }
        }
    }
}

/// Error raised by the enrollment and override services.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentServiceError {
    #[error("{0} not found")]
    NotFound(MissingRecord),
    #[error("{user} has role {actual}, expected {expected}")]
    RoleMismatch {
        user: UserId,
        expected: UserRole,
        actual: UserRole,
    },
    #[error("{reviewer} may not resolve override requests for {course}")]
    Forbidden { reviewer: UserId, course: CourseId },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub(crate) fn require_user<R: RecordStore + ?Sized>(
    repository: &R,
    id: UserId,
) -> Result<User, EnrollmentServiceError> {
    repository
        .fetch_user(id)?
        .ok_or(EnrollmentServiceError::NotFound(MissingRecord::User(id)))
}

pub(crate) fn require_student<R: RecordStore + ?Sized>(
    repository: &R,
    id: UserId,
) -> Result<User, EnrollmentServiceError> {
    let user = require_user(repository, id)?;
    if user.role != UserRole::Student {
        return Err(EnrollmentServiceError::RoleMismatch {
            user: id,
            expected: UserRole::Student,
            actual: user.role,
        });
    }
    Ok(user)
}

pub(crate) fn require_course<R: RecordStore + ?Sized>(
    repository: &R,
    id: CourseId,
) -> Result<Course, EnrollmentServiceError> {
    repository
        .fetch_course(id)?
        .ok_or(EnrollmentServiceError::NotFound(MissingRecord::Course(id)))
}

/// Enrollment transaction manager: runs eligibility decisions against the store.
pub struct EnrollmentService<R> {
    repository: Arc<R>,
    evaluator: EligibilityEvaluator,
    locks: Arc<CourseLocks>,
}

impl<R> EnrollmentService<R>
where
    R: RecordStore + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            evaluator: EligibilityEvaluator::new(),
            locks: Arc::new(CourseLocks::default()),
        }
    }

    pub(crate) fn locks(&self) -> Arc<CourseLocks> {
        self.locks.clone()
    }

    /// Override workflow sharing this service's store and course locks.
    pub fn override_workflow(&self) -> OverrideWorkflow<R> {
        OverrideWorkflow::new(self.repository.clone(), self.locks.clone())
    }

    /// Evaluate without mutating anything.
    pub fn check(
        &self,
        student: UserId,
        course: CourseId,
        today: NaiveDate,
    ) -> Result<EligibilityDecision, EnrollmentServiceError> {
        let student = require_student(self.repository.as_ref(), student)?;
        let course = require_course(self.repository.as_ref(), course)?;
        self.decide(&student, &course, today)
    }

    fn decide(
        &self,
        student: &User,
        course: &Course,
        today: NaiveDate,
    ) -> Result<EligibilityDecision, EnrollmentServiceError> {
        let student_enrollments = self.repository.enrollments_for_student(student.id)?;
        let seats_taken = self.repository.count_enrollments(course.id)?;
        let waitlisted = self
            .repository
            .find_waitlist_entry(student.id, course.id)?
            .is_some();

        let snapshot = EligibilitySnapshot {
            course,
            student_enrollments: &student_enrollments,
            seats_taken,
            waitlisted,
        };
        Ok(self.evaluator.evaluate(&snapshot, today))
    }

    /// Enroll directly, queue on the waitlist, or report why neither happened.
    pub fn enroll(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<EnrollOutcome, EnrollmentServiceError> {
        let student = require_student(self.repository.as_ref(), student)?;
        let today = now.date_naive();

        let slot = self.locks.slot(course);
        let _guard = hold(&slot);
        // Seat limit and flags are read under the slot, after any concurrent update commits.
        let course = require_course(self.repository.as_ref(), course)?;

        let decision = self.decide(&student, &course, today)?;
        debug!(
            student = %student.id,
            course = %course.code,
            decision = %decision.summary(),
            "eligibility evaluated"
        );

        let outcome = match decision {
            EligibilityDecision::Allow => {
                let enrollment = self.repository.insert_enrollment(NewEnrollment {
                    student: student.id,
                    course: course.id,
                    date_enrolled: today,
                })?;
                if let Some(entry) = self.repository.find_waitlist_entry(student.id, course.id)? {
                    self.repository.delete_waitlist_entry(entry.id)?;
                    debug!(
                        student = %student.id,
                        course = %course.code,
                        "waitlist entry cleared by direct enrollment"
                    );
                }
                info!(student = %student.id, course = %course.code, "student enrolled");
                EnrollOutcome::Enrolled { enrollment }
            }
            EligibilityDecision::AlreadyEnrolled => EnrollOutcome::NoOp {
                reason: NoOpReason::AlreadyEnrolled,
            },
            EligibilityDecision::MissingPrerequisites(missing) => {
                warn!(
                    student = %student.id,
                    course = %course.code,
                    missing = missing.len(),
                    "enrollment blocked by prerequisites"
                );
                EnrollOutcome::Rejected {
                    reason: RejectionReason::MissingPrerequisites { missing },
                }
            }
            EligibilityDecision::SeatsFullWaitlist {
                already_queued: false,
            } => {
                let entry = self.repository.insert_waitlist_entry(NewWaitlistEntry {
                    student: student.id,
                    course: course.id,
                    timestamp: now,
                })?;
                let position = self.position_of(&entry)?;
                info!(
                    student = %student.id,
                    course = %course.code,
                    position,
                    "student waitlisted"
                );
                EnrollOutcome::Waitlisted { entry, position }
            }
            EligibilityDecision::SeatsFullWaitlist {
                already_queued: true,
            } => EnrollOutcome::NoOp {
                reason: NoOpReason::AlreadyWaitlisted,
            },
            EligibilityDecision::SeatsFullNoWaitlist => {
                warn!(
                    student = %student.id,
                    course = %course.code,
                    "course full without waitlist"
                );
                EnrollOutcome::Rejected {
                    reason: RejectionReason::CourseFull,
                }
            }
        };

        Ok(outcome)
    }

    /// Remove the student's enrollment if present; a real removal promotes one waitlisted student.
    pub fn drop_course(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<DropOutcome, EnrollmentServiceError> {
        let student = require_student(self.repository.as_ref(), student)?;

        let slot = self.locks.slot(course);
        let _guard = hold(&slot);
        let course = require_course(self.repository.as_ref(), course)?;

        match self.repository.find_enrollment(student.id, course.id)? {
            Some(enrollment) => self.drop_locked(enrollment, &course, now.date_naive()),
            None => {
                debug!(student = %student.id, course = %course.code, "drop ignored, not enrolled");
                Ok(DropOutcome::NotEnrolled)
            }
        }
    }

    /// Roster removal by enrollment id; behaves like a drop, including promotion.
    pub fn remove_enrollment(
        &self,
        enrollment: EnrollmentId,
        now: DateTime<Utc>,
    ) -> Result<DropOutcome, EnrollmentServiceError> {
        let existing = self
            .repository
            .fetch_enrollment(enrollment)?
            .ok_or(EnrollmentServiceError::NotFound(MissingRecord::Enrollment(
                enrollment,
            )))?;
        let slot = self.locks.slot(existing.course);
        let _guard = hold(&slot);
        let course = require_course(self.repository.as_ref(), existing.course)?;

        match self.repository.fetch_enrollment(enrollment)? {
            Some(current) => self.drop_locked(current, &course, now.date_naive()),
            None => Ok(DropOutcome::NotEnrolled),
        }
    }

    fn drop_locked(
        &self,
        enrollment: Enrollment,
        course: &Course,
        today: NaiveDate,
    ) -> Result<DropOutcome, EnrollmentServiceError> {
        if !self.repository.delete_enrollment(enrollment.id)? {
            return Ok(DropOutcome::NotEnrolled);
        }
        info!(student = %enrollment.student, course = %course.code, "enrollment dropped");

        let promoted = self.promote_next(course, today)?;
        Ok(DropOutcome::Dropped {
            enrollment,
            promoted,
        })
    }

    /// Enroll the head of the waitlist. Entries whose student already holds an
    /// enrollment are stale and are discarded rather than promoted.
    fn promote_next(
        &self,
        course: &Course,
        today: NaiveDate,
    ) -> Result<Option<Enrollment>, EnrollmentServiceError> {
        while let Some(head) = self.repository.first_waitlisted(course.id)? {
            if self
                .repository
                .find_enrollment(head.student, course.id)?
                .is_some()
            {
                self.repository.delete_waitlist_entry(head.id)?;
                debug!(
                    student = %head.student,
                    course = %course.code,
                    "discarded stale waitlist entry"
                );
                continue;
            }

            let enrollment = self.repository.insert_enrollment(NewEnrollment {
                student: head.student,
                course: course.id,
                date_enrolled: today,
            })?;
            // A failed insert must leave the entry queued.
            self.repository.delete_waitlist_entry(head.id)?;
            info!(student = %head.student, course = %course.code, "promoted from waitlist");
            return Ok(Some(enrollment));
        }

        Ok(None)
    }

    fn position_of(&self, entry: &WaitlistEntry) -> Result<usize, EnrollmentServiceError> {
        let earlier = self
            .repository
            .count_waitlisted_before(entry.course, entry.timestamp)?;
        Ok(earlier + 1)
    }

    /// 1 + number of entries for the course queued strictly earlier.
    pub fn position(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<usize, EnrollmentServiceError> {
        let entry = self
            .repository
            .find_waitlist_entry(student, course)?
            .ok_or(EnrollmentServiceError::NotFound(
                MissingRecord::WaitlistEntry { student, course },
            ))?;
        self.position_of(&entry)
    }

    /// Every waitlist entry the student holds, oldest first.
    pub fn waitlist_status(
        &self,
        student: UserId,
    ) -> Result<Vec<WaitlistStanding>, EnrollmentServiceError> {
        let student = require_student(self.repository.as_ref(), student)?;
        let mut entries = self.repository.waitlist_for_student(student.id)?;
        entries.sort_by_key(|entry| (entry.timestamp, entry.id));

        let mut standings = Vec::with_capacity(entries.len());
        for entry in entries {
            let course = require_course(self.repository.as_ref(), entry.course)?;
            let position = self.position_of(&entry)?;
            standings.push(WaitlistStanding {
                entry,
                course_code: course.code,
                position,
            });
        }
        Ok(standings)
    }

    pub fn history(
        &self,
        student: UserId,
        today: NaiveDate,
    ) -> Result<EnrollmentHistory, EnrollmentServiceError> {
        let student = require_student(self.repository.as_ref(), student)?;
        let mut enrollments = self.repository.enrollments_for_student(student.id)?;
        enrollments.sort_by_key(|enrollment| (enrollment.date_enrolled, enrollment.id));

        let cutoff = maturity_cutoff(today);
        let (past, current) = enrollments
            .into_iter()
            .partition(|enrollment| enrollment.date_enrolled < cutoff);
        Ok(EnrollmentHistory { current, past })
    }

    pub fn roster(&self, course: CourseId) -> Result<Vec<Enrollment>, EnrollmentServiceError> {
        let course = require_course(self.repository.as_ref(), course)?;
        let mut enrollments = self.repository.enrollments_for_course(course.id)?;
        enrollments.sort_by_key(|enrollment| (enrollment.date_enrolled, enrollment.id));
        Ok(enrollments)
    }

    pub fn edit_enrollment(
        &self,
        enrollment: EnrollmentId,
        edit: EnrollmentEdit,
    ) -> Result<Enrollment, EnrollmentServiceError> {
        let mut record = self
            .repository
            .fetch_enrollment(enrollment)?
            .ok_or(EnrollmentServiceError::NotFound(MissingRecord::Enrollment(
                enrollment,
            )))?;

        if let Some(grade) = edit.final_grade {
            let trimmed = grade.trim();
            record.final_grade = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        if let Some(date) = edit.date_enrolled {
            record.date_enrolled = date;
        }

        self.repository.update_enrollment(record.clone())?;
        info!(enrollment = %record.id, "enrollment edited");
        Ok(record)
    }
}
