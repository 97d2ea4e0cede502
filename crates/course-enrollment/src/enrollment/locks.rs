use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::domain::CourseId;

/// One mutex per course so check-then-insert against a course's seats runs as a unit.
///
/// Enroll, drop, promotion, and override approval all take the course's slot
/// before touching its enrollment or waitlist rows.
#[derive(Default)]
pub(crate) struct CourseLocks {
    slots: Mutex<HashMap<CourseId, Arc<Mutex<()>>>>,
}

impl CourseLocks {
    pub(crate) fn slot(&self, course: CourseId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(course).or_default().clone()
    }
}

/// The guarded value is `()`, so a poisoned slot carries no torn state.
pub(crate) fn hold(slot: &Mutex<()>) -> MutexGuard<'_, ()> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
