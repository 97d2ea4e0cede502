use chrono::{DateTime, Utc};

use super::domain::{
    Course, CourseId, Enrollment, EnrollmentId, NewCourse, NewEnrollment, NewOverrideRequest,
    NewUser, NewWaitlistEntry, OverrideRequest, OverrideRequestId, OverrideStatus, User, UserId,
    UserRole, WaitlistEntry, WaitlistEntryId,
};

/// Storage abstraction over the durable enrollment entities.
///
/// Implementations provide atomic single-row operations and filtered queries;
/// nothing here enforces (student, course) uniqueness for enrollments, waitlist
/// entries, or override requests. Deleting a user or a course cascades to the
/// rows that reference it.
pub trait RecordStore: Send + Sync {
    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    fn users_named(&self, name: &str, role: UserRole) -> Result<Vec<User>, RepositoryError>;
    fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    fn delete_user(&self, id: UserId) -> Result<(), RepositoryError>;

    fn fetch_course(&self, id: CourseId) -> Result<Option<Course>, RepositoryError>;
    fn course_by_code(&self, code: &str) -> Result<Option<Course>, RepositoryError>;
    fn courses(&self) -> Result<Vec<Course>, RepositoryError>;
    /// Fails with [`RepositoryError::Conflict`] when the code is already taken.
    fn insert_course(&self, course: NewCourse) -> Result<Course, RepositoryError>;
    fn update_course(&self, course: Course) -> Result<(), RepositoryError>;
    fn delete_course(&self, id: CourseId) -> Result<(), RepositoryError>;

    fn fetch_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, RepositoryError>;
    fn find_enrollment(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    fn enrollments_for_student(&self, student: UserId) -> Result<Vec<Enrollment>, RepositoryError>;
    fn enrollments_for_course(&self, course: CourseId) -> Result<Vec<Enrollment>, RepositoryError>;
    fn count_enrollments(&self, course: CourseId) -> Result<usize, RepositoryError>;
    fn insert_enrollment(&self, enrollment: NewEnrollment) -> Result<Enrollment, RepositoryError>;
    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError>;
    /// Returns `false` when no row matched.
    fn delete_enrollment(&self, id: EnrollmentId) -> Result<bool, RepositoryError>;

    fn find_waitlist_entry(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<WaitlistEntry>, RepositoryError>;
    /// Entries for the course in queue order (timestamp, then insertion order).
    fn waitlist_for_course(&self, course: CourseId) -> Result<Vec<WaitlistEntry>, RepositoryError>;
    fn waitlist_for_student(&self, student: UserId) -> Result<Vec<WaitlistEntry>, RepositoryError>;
    fn count_waitlisted_before(
        &self,
        course: CourseId,
        timestamp: DateTime<Utc>,
    ) -> Result<usize, RepositoryError>;
    fn insert_waitlist_entry(
        &self,
        entry: NewWaitlistEntry,
    ) -> Result<WaitlistEntry, RepositoryError>;
    fn delete_waitlist_entry(&self, id: WaitlistEntryId) -> Result<bool, RepositoryError>;

    fn fetch_override_request(
        &self,
        id: OverrideRequestId,
    ) -> Result<Option<OverrideRequest>, RepositoryError>;
    fn find_override_request(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<OverrideRequest>, RepositoryError>;
    fn override_requests_with_status(
        &self,
        status: OverrideStatus,
    ) -> Result<Vec<OverrideRequest>, RepositoryError>;
    fn insert_override_request(
        &self,
        request: NewOverrideRequest,
    ) -> Result<OverrideRequest, RepositoryError>;
    fn update_override_request(&self, request: OverrideRequest) -> Result<(), RepositoryError>;

    /// Head of the course's waitlist.
    fn first_waitlisted(&self, course: CourseId) -> Result<Option<WaitlistEntry>, RepositoryError> {
        Ok(self.waitlist_for_course(course)?.into_iter().next())
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}
