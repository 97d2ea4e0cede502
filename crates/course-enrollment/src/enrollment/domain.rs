use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

record_id!(
    /// Opaque identity of an already-authenticated account.
    UserId,
    "user"
);
record_id!(
    /// Identifier wrapper for catalog courses.
    CourseId,
    "course"
);
record_id!(EnrollmentId, "enrollment");
record_id!(WaitlistEntryId, "waitlist");
record_id!(OverrideRequestId, "override");

/// Account role as tracked by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Instructor,
    Administrator,
    Advisor,
}

impl UserRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Instructor => "instructor",
            Self::Administrator => "administrator",
            Self::Advisor => "advisor",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    /// Login name. Not unique, so lookups by name may return several accounts.
    pub name: String,
    pub role: UserRole,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub full_name: String,
    pub name: String,
    pub role: UserRole,
    #[serde(default)]
    pub email: Option<String>,
}

/// Catalog course together with its capacity and prerequisite edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub code: String,
    pub title: String,
    pub syllabus: String,
    pub meeting_times: String,
    /// Zero means the course is always full.
    pub seat_limit: u32,
    pub instructor: Option<UserId>,
    /// Directed edges: this course requires each listed course.
    pub prerequisites: BTreeSet<CourseId>,
    pub waitlist_enabled: bool,
}

impl Course {
    pub fn requires(&self, other: CourseId) -> bool {
        self.prerequisites.contains(&other)
    }

    pub fn is_instructed_by(&self, user: UserId) -> bool {
        self.instructor == Some(user)
    }
}

/// Insert payload for [`Course`]; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCourse {
    pub code: String,
    pub title: String,
    pub syllabus: String,
    pub meeting_times: String,
    pub seat_limit: u32,
    pub instructor: Option<UserId>,
    pub prerequisites: BTreeSet<CourseId>,
    pub waitlist_enabled: bool,
}

impl NewCourse {
    pub(crate) fn into_course(self, id: CourseId) -> Course {
        Course {
            id,
            code: self.code,
            title: self.title,
            syllabus: self.syllabus,
            meeting_times: self.meeting_times,
            seat_limit: self.seat_limit,
            instructor: self.instructor,
            prerequisites: self.prerequisites,
            waitlist_enabled: self.waitlist_enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student: UserId,
    pub course: CourseId,
    pub date_enrolled: NaiveDate,
    pub final_grade: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEnrollment {
    pub student: UserId,
    pub course: CourseId,
    pub date_enrolled: NaiveDate,
}

/// Queue slot for a full course. Queue order is `timestamp` ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: WaitlistEntryId,
    pub student: UserId,
    pub course: CourseId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWaitlistEntry {
    pub student: UserId,
    pub course: CourseId,
    pub timestamp: DateTime<Utc>,
}

/// Override lifecycle. `Approved` and `Denied` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideStatus {
    Pending,
    Approved,
    Denied,
}

impl OverrideStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OverrideStatus::Pending => "pending",
            OverrideStatus::Approved => "approved",
            OverrideStatus::Denied => "denied",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, OverrideStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub id: OverrideRequestId,
    pub student: UserId,
    pub course: CourseId,
    pub reason: String,
    pub status: OverrideStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOverrideRequest {
    pub student: UserId,
    pub course: CourseId,
    pub reason: String,
}
