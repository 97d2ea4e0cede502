use chrono::{Duration, NaiveDate};

use super::super::domain::{Course, CourseId, Enrollment};

/// Days an enrollment must have aged before it counts as a completed prerequisite.
pub const PREREQUISITE_MATURITY_DAYS: i64 = 119;

/// Latest `date_enrolled` that still counts as completed on `today`.
pub fn maturity_cutoff(today: NaiveDate) -> NaiveDate {
    today - Duration::days(PREREQUISITE_MATURITY_DAYS)
}

/// Inclusive at the cutoff: enrolled exactly 119 days ago is mature.
pub fn is_mature(date_enrolled: NaiveDate, today: NaiveDate) -> bool {
    date_enrolled <= maturity_cutoff(today)
}

pub(crate) fn is_enrolled(course: &Course, enrollments: &[Enrollment]) -> bool {
    enrollments.iter().any(|row| row.course == course.id)
}

/// Prerequisites of `course` with no mature enrollment, in id order.
pub(crate) fn unmet_prerequisites(
    course: &Course,
    enrollments: &[Enrollment],
    today: NaiveDate,
) -> Vec<CourseId> {
    course
        .prerequisites
        .iter()
        .copied()
        .filter(|prerequisite| {
            !enrollments
                .iter()
                .any(|row| row.course == *prerequisite && is_mature(row.date_enrolled, today))
        })
        .collect()
}

pub(crate) fn has_open_seat(course: &Course, seats_taken: usize) -> bool {
    seats_taken < course.seat_limit as usize
}
