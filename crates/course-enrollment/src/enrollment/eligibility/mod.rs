mod policy;
mod rules;

pub use policy::EligibilityDecision;
pub use rules::{is_mature, maturity_cutoff, PREREQUISITE_MATURITY_DAYS};
pub(crate) use rules::unmet_prerequisites;

use chrono::NaiveDate;

use super::domain::{Course, Enrollment};
use policy::decide;

/// Store-derived facts about one (student, course) pair.
///
/// The transaction manager gathers this before calling the evaluator so the
/// decision itself performs no I/O.
#[derive(Debug, Clone, Copy)]
pub struct EligibilitySnapshot<'a> {
    pub course: &'a Course,
    /// Every enrollment the student holds, across all courses.
    pub student_enrollments: &'a [Enrollment],
    /// Enrollment rows currently counted against `course.seat_limit`.
    pub seats_taken: usize,
    /// Whether the student already holds a waitlist entry for `course`.
    pub waitlisted: bool,
}

/// Stateless evaluator that applies the enrollment rules to a snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct EligibilityEvaluator;

impl EligibilityEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        snapshot: &EligibilitySnapshot<'_>,
        today: NaiveDate,
    ) -> EligibilityDecision {
        decide(snapshot, today)
    }
}
