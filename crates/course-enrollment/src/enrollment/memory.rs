use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    Course, CourseId, Enrollment, EnrollmentId, NewCourse, NewEnrollment, NewOverrideRequest,
    NewUser, NewWaitlistEntry, OverrideRequest, OverrideRequestId, OverrideStatus, User, UserId,
    UserRole, WaitlistEntry, WaitlistEntryId,
};
use super::repository::{RecordStore, RepositoryError};

/// Process-local [`RecordStore`] used by the API service, the CLI demo, and tests.
#[derive(Default, Clone)]
pub struct InMemoryRecordStore {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Default)]
struct Tables {
    next_id: u64,
    users: BTreeMap<UserId, User>,
    courses: BTreeMap<CourseId, Course>,
    enrollments: BTreeMap<EnrollmentId, Enrollment>,
    waitlist: BTreeMap<WaitlistEntryId, WaitlistEntry>,
    overrides: BTreeMap<OverrideRequestId, OverrideRequest>,
}

impl Tables {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn cascade_course(&mut self, course: CourseId) {
        self.courses.remove(&course);
        self.enrollments.retain(|_, row| row.course != course);
        self.waitlist.retain(|_, row| row.course != course);
        self.overrides.retain(|_, row| row.course != course);
        for other in self.courses.values_mut() {
            other.prerequisites.remove(&course);
        }
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("record store mutex poisoned".to_string()))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    fn users_named(&self, name: &str, role: UserRole) -> Result<Vec<User>, RepositoryError> {
        Ok(self
            .tables()?
            .users
            .values()
            .filter(|user| user.name == name && user.role == role)
            .cloned()
            .collect())
    }

    fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables()?;
        let id = UserId(tables.allocate());
        let record = User {
            id,
            full_name: user.full_name,
            name: user.name,
            role: user.role,
            email: user.email,
        };
        tables.users.insert(id, record.clone());
        Ok(record)
    }

    fn delete_user(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.users.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }

        let taught: Vec<CourseId> = tables
            .courses
            .values()
            .filter(|course| course.is_instructed_by(id))
            .map(|course| course.id)
            .collect();
        for course in taught {
            tables.cascade_course(course);
        }

        tables.enrollments.retain(|_, row| row.student != id);
        tables.waitlist.retain(|_, row| row.student != id);
        tables.overrides.retain(|_, row| row.student != id);
        Ok(())
    }

    fn fetch_course(&self, id: CourseId) -> Result<Option<Course>, RepositoryError> {
        Ok(self.tables()?.courses.get(&id).cloned())
    }

    fn course_by_code(&self, code: &str) -> Result<Option<Course>, RepositoryError> {
        Ok(self
            .tables()?
            .courses
            .values()
            .find(|course| course.code == code)
            .cloned())
    }

    fn courses(&self) -> Result<Vec<Course>, RepositoryError> {
        Ok(self.tables()?.courses.values().cloned().collect())
    }

    fn insert_course(&self, course: NewCourse) -> Result<Course, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.courses.values().any(|row| row.code == course.code) {
            return Err(RepositoryError::Conflict);
        }
        let id = CourseId(tables.allocate());
        let record = course.into_course(id);
        tables.courses.insert(id, record.clone());
        Ok(record)
    }

    fn update_course(&self, course: Course) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.courses.contains_key(&course.id) {
            return Err(RepositoryError::NotFound);
        }
        if tables
            .courses
            .values()
            .any(|row| row.id != course.id && row.code == course.code)
        {
            return Err(RepositoryError::Conflict);
        }
        tables.courses.insert(course.id, course);
        Ok(())
    }

    fn delete_course(&self, id: CourseId) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.courses.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        tables.cascade_course(id);
        Ok(())
    }

    fn fetch_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self.tables()?.enrollments.get(&id).cloned())
    }

    fn find_enrollment(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self
            .tables()?
            .enrollments
            .values()
            .find(|row| row.student == student && row.course == course)
            .cloned())
    }

    fn enrollments_for_student(&self, student: UserId) -> Result<Vec<Enrollment>, RepositoryError> {
        Ok(self
            .tables()?
            .enrollments
            .values()
            .filter(|row| row.student == student)
            .cloned()
            .collect())
    }

    fn enrollments_for_course(&self, course: CourseId) -> Result<Vec<Enrollment>, RepositoryError> {
        Ok(self
            .tables()?
            .enrollments
            .values()
            .filter(|row| row.course == course)
            .cloned()
            .collect())
    }

    fn count_enrollments(&self, course: CourseId) -> Result<usize, RepositoryError> {
        Ok(self
            .tables()?
            .enrollments
            .values()
            .filter(|row| row.course == course)
            .count())
    }

    fn insert_enrollment(&self, enrollment: NewEnrollment) -> Result<Enrollment, RepositoryError> {
        let mut tables = self.tables()?;
        let id = EnrollmentId(tables.allocate());
        let record = Enrollment {
            id,
            student: enrollment.student,
            course: enrollment.course,
            date_enrolled: enrollment.date_enrolled,
            final_grade: None,
        };
        tables.enrollments.insert(id, record.clone());
        Ok(record)
    }

    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables.enrollments.get_mut(&enrollment.id) {
            Some(row) => {
                *row = enrollment;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete_enrollment(&self, id: EnrollmentId) -> Result<bool, RepositoryError> {
        Ok(self.tables()?.enrollments.remove(&id).is_some())
    }

    fn find_waitlist_entry(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<WaitlistEntry>, RepositoryError> {
        Ok(self
            .tables()?
            .waitlist
            .values()
            .find(|row| row.student == student && row.course == course)
            .cloned())
    }

    fn waitlist_for_course(&self, course: CourseId) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        let mut entries: Vec<WaitlistEntry> = self
            .tables()?
            .waitlist
            .values()
            .filter(|row| row.course == course)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| (entry.timestamp, entry.id));
        Ok(entries)
    }

    fn waitlist_for_student(&self, student: UserId) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        Ok(self
            .tables()?
            .waitlist
            .values()
            .filter(|row| row.student == student)
            .cloned()
            .collect())
    }

    fn count_waitlisted_before(
        &self,
        course: CourseId,
        timestamp: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        Ok(self
            .tables()?
            .waitlist
            .values()
            .filter(|row| row.course == course && row.timestamp < timestamp)
            .count())
    }

    fn insert_waitlist_entry(
        &self,
        entry: NewWaitlistEntry,
    ) -> Result<WaitlistEntry, RepositoryError> {
        let mut tables = self.tables()?;
        let id = WaitlistEntryId(tables.allocate());
        let record = WaitlistEntry {
            id,
            student: entry.student,
            course: entry.course,
            timestamp: entry.timestamp,
        };
        tables.waitlist.insert(id, record.clone());
        Ok(record)
    }

    fn delete_waitlist_entry(&self, id: WaitlistEntryId) -> Result<bool, RepositoryError> {
        Ok(self.tables()?.waitlist.remove(&id).is_some())
    }

    fn fetch_override_request(
        &self,
        id: OverrideRequestId,
    ) -> Result<Option<OverrideRequest>, RepositoryError> {
        Ok(self.tables()?.overrides.get(&id).cloned())
    }

    fn find_override_request(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<OverrideRequest>, RepositoryError> {
        Ok(self
            .tables()?
            .overrides
            .values()
            .find(|row| row.student == student && row.course == course)
            .cloned())
    }

    fn override_requests_with_status(
        &self,
        status: OverrideStatus,
    ) -> Result<Vec<OverrideRequest>, RepositoryError> {
        Ok(self
            .tables()?
            .overrides
            .values()
            .filter(|row| row.status == status)
            .cloned()
            .collect())
    }

    fn insert_override_request(
        &self,
        request: NewOverrideRequest,
    ) -> Result<OverrideRequest, RepositoryError> {
        let mut tables = self.tables()?;
        let id = OverrideRequestId(tables.allocate());
        let record = OverrideRequest {
            id,
            student: request.student,
            course: request.course,
            reason: request.reason,
            status: OverrideStatus::Pending,
        };
        tables.overrides.insert(id, record.clone());
        Ok(record)
    }

    fn update_override_request(&self, request: OverrideRequest) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables.overrides.get_mut(&request.id) {
            Some(row) => {
                *row = request;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}
