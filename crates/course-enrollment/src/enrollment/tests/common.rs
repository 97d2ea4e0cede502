use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::enrollment::domain::{
    Course, CourseId, Enrollment, EnrollmentId, NewCourse, NewEnrollment, NewOverrideRequest,
    NewUser, NewWaitlistEntry, OverrideRequest, OverrideRequestId, OverrideStatus, User, UserId,
    UserRole, WaitlistEntry, WaitlistEntryId,
};
use crate::enrollment::repository::{RecordStore, RepositoryError};
use crate::enrollment::{
    enrollment_router, EnrollmentEngine, InMemoryRecordStore, StoreInstructorDirectory,
};

pub(super) type MemoryEngine =
    EnrollmentEngine<InMemoryRecordStore, StoreInstructorDirectory<InMemoryRecordStore>>;

pub(super) type ScriptedEngine =
    EnrollmentEngine<ScriptedStore, StoreInstructorDirectory<ScriptedStore>>;

pub(super) fn build_engine() -> (MemoryEngine, Arc<InMemoryRecordStore>) {
    let store = Arc::new(InMemoryRecordStore::new());
    (EnrollmentEngine::with_store(store.clone()), store)
}

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 1).expect("valid date")
}

pub(super) fn days_ago(days: i64) -> NaiveDate {
    today() - Duration::days(days)
}

/// `today()` at 09:00 UTC plus the given minutes; later minutes queue later.
pub(super) fn at_minute(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
        + Duration::minutes(minute)
}

pub(super) fn add_user(store: &InMemoryRecordStore, name: &str, role: UserRole) -> User {
    store
        .insert_user(NewUser {
            full_name: name.to_string(),
            name: name.to_lowercase(),
            role,
            email: Some(format!("{}@example.edu", name.to_lowercase())),
        })
        .expect("insert user")
}

pub(super) fn add_student(store: &InMemoryRecordStore, name: &str) -> User {
    add_user(store, name, UserRole::Student)
}

pub(super) fn add_course(
    store: &InMemoryRecordStore,
    code: &str,
    seat_limit: u32,
    waitlist_enabled: bool,
    prerequisites: &[CourseId],
) -> Course {
    store
        .insert_course(NewCourse {
            code: code.to_string(),
            title: format!("{code} lecture"),
            syllabus: String::new(),
            meeting_times: "MWF 10:00".to_string(),
            seat_limit,
            instructor: None,
            prerequisites: prerequisites.iter().copied().collect::<BTreeSet<_>>(),
            waitlist_enabled,
        })
        .expect("insert course")
}

pub(super) fn assign_instructor(store: &InMemoryRecordStore, course: &Course, instructor: &User) {
    let mut updated = course.clone();
    updated.instructor = Some(instructor.id);
    store.update_course(updated).expect("assign instructor");
}

pub(super) fn enrolled_on(
    store: &InMemoryRecordStore,
    student: &User,
    course: &Course,
    date_enrolled: NaiveDate,
) -> Enrollment {
    store
        .insert_enrollment(NewEnrollment {
            student: student.id,
            course: course.id,
            date_enrolled,
        })
        .expect("insert enrollment")
}

pub(super) fn waitlist_students(store: &InMemoryRecordStore, course: &Course) -> Vec<UserId> {
    store
        .waitlist_for_course(course.id)
        .expect("waitlist")
        .into_iter()
        .map(|entry| entry.student)
        .collect()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn router_with_engine(engine: MemoryEngine) -> axum::Router {
    enrollment_router(Arc::new(engine))
}

/// Store double whose backend is offline for every call.
pub(super) struct UnavailableRepository;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl RecordStore for UnavailableRepository {
    fn fetch_user(&self, _id: UserId) -> Result<Option<User>, RepositoryError> {
        offline()
    }

    fn users_named(&self, _name: &str, _role: UserRole) -> Result<Vec<User>, RepositoryError> {
        offline()
    }

    fn insert_user(&self, _user: NewUser) -> Result<User, RepositoryError> {
        offline()
    }

    fn delete_user(&self, _id: UserId) -> Result<(), RepositoryError> {
        offline()
    }

    fn fetch_course(&self, _id: CourseId) -> Result<Option<Course>, RepositoryError> {
        offline()
    }

    fn course_by_code(&self, _code: &str) -> Result<Option<Course>, RepositoryError> {
        offline()
    }

    fn courses(&self) -> Result<Vec<Course>, RepositoryError> {
        offline()
    }

    fn insert_course(&self, _course: NewCourse) -> Result<Course, RepositoryError> {
        offline()
    }

    fn update_course(&self, _course: Course) -> Result<(), RepositoryError> {
        offline()
    }

    fn delete_course(&self, _id: CourseId) -> Result<(), RepositoryError> {
        offline()
    }

    fn fetch_enrollment(&self, _id: EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        offline()
    }

    fn find_enrollment(
        &self,
        _student: UserId,
        _course: CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        offline()
    }

    fn enrollments_for_student(&self, _student: UserId) -> Result<Vec<Enrollment>, RepositoryError> {
        offline()
    }

    fn enrollments_for_course(&self, _course: CourseId) -> Result<Vec<Enrollment>, RepositoryError> {
        offline()
    }

    fn count_enrollments(&self, _course: CourseId) -> Result<usize, RepositoryError> {
        offline()
    }

    fn insert_enrollment(&self, _enrollment: NewEnrollment) -> Result<Enrollment, RepositoryError> {
        offline()
    }

    fn update_enrollment(&self, _enrollment: Enrollment) -> Result<(), RepositoryError> {
        offline()
    }

    fn delete_enrollment(&self, _id: EnrollmentId) -> Result<bool, RepositoryError> {
        offline()
    }

    fn find_waitlist_entry(
        &self,
        _student: UserId,
        _course: CourseId,
    ) -> Result<Option<WaitlistEntry>, RepositoryError> {
        offline()
    }

    fn waitlist_for_course(&self, _course: CourseId) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        offline()
    }

    fn waitlist_for_student(&self, _student: UserId) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        offline()
    }

    fn count_waitlisted_before(
        &self,
        _course: CourseId,
        _timestamp: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        offline()
    }

    fn insert_waitlist_entry(
        &self,
        _entry: NewWaitlistEntry,
    ) -> Result<WaitlistEntry, RepositoryError> {
        offline()
    }

    fn delete_waitlist_entry(&self, _id: WaitlistEntryId) -> Result<bool, RepositoryError> {
        offline()
    }

    fn fetch_override_request(
        &self,
        _id: OverrideRequestId,
    ) -> Result<Option<OverrideRequest>, RepositoryError> {
        offline()
    }

    fn find_override_request(
        &self,
        _student: UserId,
        _course: CourseId,
    ) -> Result<Option<OverrideRequest>, RepositoryError> {
        offline()
    }

    fn override_requests_with_status(
        &self,
        _status: OverrideStatus,
    ) -> Result<Vec<OverrideRequest>, RepositoryError> {
        offline()
    }

    fn insert_override_request(
        &self,
        _request: NewOverrideRequest,
    ) -> Result<OverrideRequest, RepositoryError> {
        offline()
    }

    fn update_override_request(&self, _request: OverrideRequest) -> Result<(), RepositoryError> {
        offline()
    }
}

/// In-memory store with hooks for interleaving tests.
///
/// Armed override fetches read the row and then wait on a shared barrier, so
/// every party observes the same state before any of them writes.
pub(super) struct ScriptedStore {
    inner: InMemoryRecordStore,
    rendezvous: Barrier,
    gated_override_fetches: AtomicUsize,
    fail_enrollment_inserts: AtomicBool,
}

impl ScriptedStore {
    pub(super) fn new(parties: usize) -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            rendezvous: Barrier::new(parties),
            gated_override_fetches: AtomicUsize::new(0),
            fail_enrollment_inserts: AtomicBool::new(false),
        }
    }

    pub(super) fn inner(&self) -> &InMemoryRecordStore {
        &self.inner
    }

    /// The next `calls` override fetches wait on the barrier.
    pub(super) fn gate_override_fetches(&self, calls: usize) {
        self.gated_override_fetches.store(calls, Ordering::SeqCst);
    }

    pub(super) fn fail_enrollment_inserts(&self, fail: bool) {
        self.fail_enrollment_inserts.store(fail, Ordering::SeqCst);
    }
}

pub(super) fn scripted_engine(parties: usize) -> (ScriptedEngine, Arc<ScriptedStore>) {
    let store = Arc::new(ScriptedStore::new(parties));
    (EnrollmentEngine::with_store(store.clone()), store)
}

impl RecordStore for ScriptedStore {
    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.fetch_user(id)
    }

    fn users_named(&self, name: &str, role: UserRole) -> Result<Vec<User>, RepositoryError> {
        self.inner.users_named(name, role)
    }

    fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        self.inner.insert_user(user)
    }

    fn delete_user(&self, id: UserId) -> Result<(), RepositoryError> {
        self.inner.delete_user(id)
    }

    fn fetch_course(&self, id: CourseId) -> Result<Option<Course>, RepositoryError> {
        self.inner.fetch_course(id)
    }

    fn course_by_code(&self, code: &str) -> Result<Option<Course>, RepositoryError> {
        self.inner.course_by_code(code)
    }

    fn courses(&self) -> Result<Vec<Course>, RepositoryError> {
        self.inner.courses()
    }

    fn insert_course(&self, course: NewCourse) -> Result<Course, RepositoryError> {
        self.inner.insert_course(course)
    }

    fn update_course(&self, course: Course) -> Result<(), RepositoryError> {
        self.inner.update_course(course)
    }

    fn delete_course(&self, id: CourseId) -> Result<(), RepositoryError> {
        self.inner.delete_course(id)
    }

    fn fetch_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        self.inner.fetch_enrollment(id)
    }

    fn find_enrollment(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        self.inner.find_enrollment(student, course)
    }

    fn enrollments_for_student(&self, student: UserId) -> Result<Vec<Enrollment>, RepositoryError> {
        self.inner.enrollments_for_student(student)
    }

    fn enrollments_for_course(&self, course: CourseId) -> Result<Vec<Enrollment>, RepositoryError> {
        self.inner.enrollments_for_course(course)
    }

    fn count_enrollments(&self, course: CourseId) -> Result<usize, RepositoryError> {
        self.inner.count_enrollments(course)
    }

    fn insert_enrollment(&self, enrollment: NewEnrollment) -> Result<Enrollment, RepositoryError> {
        if self.fail_enrollment_inserts.load(Ordering::SeqCst) {
            return offline();
        }
        self.inner.insert_enrollment(enrollment)
    }

    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        self.inner.update_enrollment(enrollment)
    }

    fn delete_enrollment(&self, id: EnrollmentId) -> Result<bool, RepositoryError> {
        self.inner.delete_enrollment(id)
    }

    fn find_waitlist_entry(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<WaitlistEntry>, RepositoryError> {
        self.inner.find_waitlist_entry(student, course)
    }

    fn waitlist_for_course(&self, course: CourseId) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        self.inner.waitlist_for_course(course)
    }

    fn waitlist_for_student(&self, student: UserId) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        self.inner.waitlist_for_student(student)
    }

    fn count_waitlisted_before(
        &self,
        course: CourseId,
        timestamp: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        self.inner.count_waitlisted_before(course, timestamp)
    }

    fn insert_waitlist_entry(
        &self,
        entry: NewWaitlistEntry,
    ) -> Result<WaitlistEntry, RepositoryError> {
        self.inner.insert_waitlist_entry(entry)
    }

    fn delete_waitlist_entry(&self, id: WaitlistEntryId) -> Result<bool, RepositoryError> {
        self.inner.delete_waitlist_entry(id)
    }

    fn fetch_override_request(
        &self,
        id: OverrideRequestId,
    ) -> Result<Option<OverrideRequest>, RepositoryError> {
        let request = self.inner.fetch_override_request(id)?;
        let gated = self
            .gated_override_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if gated {
            self.rendezvous.wait();
        }
        Ok(request)
    }

    fn find_override_request(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<OverrideRequest>, RepositoryError> {
        self.inner.find_override_request(student, course)
    }

    fn override_requests_with_status(
        &self,
        status: OverrideStatus,
    ) -> Result<Vec<OverrideRequest>, RepositoryError> {
        self.inner.override_requests_with_status(status)
    }

    fn insert_override_request(
        &self,
        request: NewOverrideRequest,
    ) -> Result<OverrideRequest, RepositoryError> {
        self.inner.insert_override_request(request)
    }

    fn update_override_request(&self, request: OverrideRequest) -> Result<(), RepositoryError> {
        self.inner.update_override_request(request)
    }
}
