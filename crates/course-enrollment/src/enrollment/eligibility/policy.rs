use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::super::domain::CourseId;
use super::rules::{has_open_seat, is_enrolled, unmet_prerequisites};
use super::EligibilitySnapshot;

/// Outcome of checking one student against one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityDecision {
    Allow,
    AlreadyEnrolled,
    MissingPrerequisites(Vec<CourseId>),
    /// Course is full but queues students. `already_queued` means no new entry is needed.
    SeatsFullWaitlist { already_queued: bool },
    SeatsFullNoWaitlist,
}

impl EligibilityDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, EligibilityDecision::Allow)
    }

    pub fn summary(&self) -> String {
        match self {
            EligibilityDecision::Allow => "eligible to enroll".to_string(),
            EligibilityDecision::AlreadyEnrolled => "already enrolled".to_string(),
            EligibilityDecision::MissingPrerequisites(missing) => {
                let ids: Vec<String> = missing.iter().map(ToString::to_string).collect();
                format!("missing or too recent prerequisites: {}", ids.join(", "))
            }
            EligibilityDecision::SeatsFullWaitlist {
                already_queued: false,
            } => "course full, waitlist open".to_string(),
            EligibilityDecision::SeatsFullWaitlist {
                already_queued: true,
            } => "course full, already waitlisted".to_string(),
            EligibilityDecision::SeatsFullNoWaitlist => {
                "course full, waitlist disabled".to_string()
            }
        }
    }
}

pub(crate) fn decide(snapshot: &EligibilitySnapshot<'_>, today: NaiveDate) -> EligibilityDecision {
    let course = snapshot.course;

    if is_enrolled(course, snapshot.student_enrollments) {
        return EligibilityDecision::AlreadyEnrolled;
    }

    let missing = unmet_prerequisites(course, snapshot.student_enrollments, today);
    if !missing.is_empty() {
        return EligibilityDecision::MissingPrerequisites(missing);
    }

    if has_open_seat(course, snapshot.seats_taken) {
        return EligibilityDecision::Allow;
    }

    if course.waitlist_enabled {
        EligibilityDecision::SeatsFullWaitlist {
            already_queued: snapshot.waitlisted,
        }
    } else {
        EligibilityDecision::SeatsFullNoWaitlist
    }
}
