use super::common::*;
use crate::enrollment::domain::{NewWaitlistEntry, UserRole};
use crate::enrollment::repository::RecordStore;
use crate::enrollment::{
    DropOutcome, EnrollOutcome, EnrollmentEdit, EnrollmentServiceError, MissingRecord, NoOpReason,
    RejectionReason,
};
use std::sync::Arc;

#[test]
fn enroll_creates_enrollment_dated_today() {
    let (engine, store) = build_engine();
    let ada = add_student(&store, "Ada");
    let course = add_course(&store, "CS101", 2, true, &[]);

    let outcome = engine
        .enrollments()
        .enroll(ada.id, course.id, at_minute(0))
        .expect("enroll");

    match outcome {
        EnrollOutcome::Enrolled { enrollment } => {
            assert_eq!(enrollment.student, ada.id);
            assert_eq!(enrollment.date_enrolled, today());
            assert_eq!(enrollment.final_grade, None);
        }
        other => panic!("expected enrollment, got {other:?}"),
    }
    assert_eq!(store.count_enrollments(course.id).unwrap(), 1);
}

#[test]
fn first_n_students_enroll_and_the_next_is_waitlisted() {
    let (engine, store) = build_engine();
    let seats = 3;
    let course = add_course(&store, "CS101", seats, true, &[]);

    let mut outcomes = Vec::new();
    for index in 0..=seats {
        let student = add_student(&store, &format!("Student{index}"));
        outcomes.push(
            engine
                .enrollments()
                .enroll(student.id, course.id, at_minute(index as i64))
                .expect("enroll"),
        );
    }

    let (last, first) = outcomes.split_last().expect("outcomes");
    assert!(first
        .iter()
        .all(|outcome| matches!(outcome, EnrollOutcome::Enrolled { .. })));
    assert!(matches!(
        last,
        EnrollOutcome::Waitlisted { position: 1, .. }
    ));
    assert_eq!(store.count_enrollments(course.id).unwrap(), seats as usize);
}

#[test]
fn repeated_enroll_is_a_no_op() {
    let (engine, store) = build_engine();
    let ada = add_student(&store, "Ada");
    let bob = add_student(&store, "Bob");
    let course = add_course(&store, "CS101", 1, true, &[]);
    let service = engine.enrollments();

    service.enroll(ada.id, course.id, at_minute(0)).expect("ada");
    service.enroll(bob.id, course.id, at_minute(1)).expect("bob queued");

    assert_eq!(
        service.enroll(ada.id, course.id, at_minute(2)).unwrap(),
        EnrollOutcome::NoOp {
            reason: NoOpReason::AlreadyEnrolled
        }
    );
    assert_eq!(
        service.enroll(bob.id, course.id, at_minute(3)).unwrap(),
        EnrollOutcome::NoOp {
            reason: NoOpReason::AlreadyWaitlisted
        }
    );
    assert_eq!(waitlist_students(&store, &course), vec![bob.id]);
}

#[test]
fn full_course_without_waitlist_rejects_and_stores_nothing() {
    let (engine, store) = build_engine();
    let ada = add_student(&store, "Ada");
    let bob = add_student(&store, "Bob");
    let course = add_course(&store, "CS101", 1, false, &[]);

    engine
        .enrollments()
        .enroll(ada.id, course.id, at_minute(0))
        .expect("ada");
    let outcome = engine
        .enrollments()
        .enroll(bob.id, course.id, at_minute(1))
        .expect("bob");

    assert_eq!(
        outcome,
        EnrollOutcome::Rejected {
            reason: RejectionReason::CourseFull
        }
    );
    assert!(waitlist_students(&store, &course).is_empty());
}

#[test]
fn immature_prerequisite_rejects_enrollment() {
    let (engine, store) = build_engine();
    let ada = add_student(&store, "Ada");
    let intro = add_course(&store, "CS101", 10, true, &[]);
    let advanced = add_course(&store, "CS201", 10, true, &[intro.id]);
    enrolled_on(&store, &ada, &intro, days_ago(30));

    let outcome = engine
        .enrollments()
        .enroll(ada.id, advanced.id, at_minute(0))
        .expect("enroll");

    assert_eq!(
        outcome,
        EnrollOutcome::Rejected {
            reason: RejectionReason::MissingPrerequisites {
                missing: vec![intro.id]
            }
        }
    );
    assert!(store.find_enrollment(ada.id, advanced.id).unwrap().is_none());
}

#[test]
fn drop_promotes_the_earliest_waitlisted_student() {
    let (engine, store) = build_engine();
    let course = add_course(&store, "CS101", 1, true, &[]);
    let holder = add_student(&store, "Holder");
    let first = add_student(&store, "First");
    let second = add_student(&store, "Second");
    let service = engine.enrollments();

    service.enroll(holder.id, course.id, at_minute(0)).unwrap();
    service.enroll(second.id, course.id, at_minute(20)).unwrap();
    store
        .insert_waitlist_entry(NewWaitlistEntry {
            student: first.id,
            course: course.id,
            timestamp: at_minute(10),
        })
        .unwrap();
    assert_eq!(waitlist_students(&store, &course).len(), 2);

    let outcome = service
        .drop_course(holder.id, course.id, at_minute(30))
        .expect("drop");

    match outcome {
        DropOutcome::Dropped {
            enrollment,
            promoted: Some(promoted),
        } => {
            assert_eq!(enrollment.student, holder.id);
            assert_eq!(promoted.student, first.id);
            assert_eq!(promoted.date_enrolled, today());
        }
        other => panic!("expected promotion, got {other:?}"),
    }
    assert_eq!(waitlist_students(&store, &course), vec![second.id]);
    assert_eq!(store.count_enrollments(course.id).unwrap(), 1);
}

#[test]
fn dropping_twice_is_idempotent() {
    let (engine, store) = build_engine();
    let course = add_course(&store, "CS101", 1, true, &[]);
    let ada = add_student(&store, "Ada");
    let bob = add_student(&store, "Bob");
    let cy = add_student(&store, "Cy");
    let service = engine.enrollments();

    service.enroll(ada.id, course.id, at_minute(0)).unwrap();
    service.enroll(bob.id, course.id, at_minute(1)).unwrap();
    service.enroll(cy.id, course.id, at_minute(2)).unwrap();

    let first = service.drop_course(ada.id, course.id, at_minute(3)).unwrap();
    assert!(matches!(first, DropOutcome::Dropped { .. }));

    for minute in [4, 5] {
        assert_eq!(
            service.drop_course(ada.id, course.id, at_minute(minute)).unwrap(),
            DropOutcome::NotEnrolled
        );
    }
    assert_eq!(waitlist_students(&store, &course), vec![cy.id]);
    assert_eq!(store.count_enrollments(course.id).unwrap(), 1);
}

#[test]
fn drop_with_empty_waitlist_frees_the_seat() {
    let (engine, store) = build_engine();
    let course = add_course(&store, "CS101", 1, true, &[]);
    let ada = add_student(&store, "Ada");
    let bob = add_student(&store, "Bob");
    let service = engine.enrollments();

    service.enroll(ada.id, course.id, at_minute(0)).unwrap();
    let outcome = service.drop_course(ada.id, course.id, at_minute(1)).unwrap();
    assert!(matches!(outcome, DropOutcome::Dropped { promoted: None, .. }));

    assert!(matches!(
        service.enroll(bob.id, course.id, at_minute(2)).unwrap(),
        EnrollOutcome::Enrolled { .. }
    ));
}

#[test]
fn promotion_skips_students_who_are_already_enrolled() {
    let (engine, store) = build_engine();
    let course = add_course(&store, "CS101", 2, true, &[]);
    let ada = add_student(&store, "Ada");
    let stale = add_student(&store, "Stale");
    let next = add_student(&store, "Next");

    engine.enrollments().enroll(ada.id, course.id, at_minute(0)).unwrap();
    enrolled_on(&store, &stale, &course, today());
    for (student, minute) in [(&stale, 1), (&next, 2)] {
        store
            .insert_waitlist_entry(NewWaitlistEntry {
                student: student.id,
                course: course.id,
                timestamp: at_minute(minute),
            })
            .unwrap();
    }

    let outcome = engine
        .enrollments()
        .drop_course(ada.id, course.id, at_minute(3))
        .unwrap();

    match outcome {
        DropOutcome::Dropped {
            promoted: Some(promoted),
            ..
        } => assert_eq!(promoted.student, next.id),
        other => panic!("expected promotion, got {other:?}"),
    }
    assert!(waitlist_students(&store, &course).is_empty());
    assert_eq!(store.enrollments_for_student(stale.id).unwrap().len(), 1);
}

#[test]
fn positions_shift_when_an_earlier_entry_leaves() {
    let (engine, store) = build_engine();
    let course = add_course(&store, "CS101", 1, true, &[]);
    let holder = add_student(&store, "Holder");
    let queued: Vec<_> = ["A", "B", "C"]
        .iter()
        .map(|name| add_student(&store, name))
        .collect();
    let service = engine.enrollments();

    service.enroll(holder.id, course.id, at_minute(0)).unwrap();
    for (offset, student) in queued.iter().enumerate() {
        service
            .enroll(student.id, course.id, at_minute(offset as i64 + 1))
            .unwrap();
    }
    assert_eq!(service.position(queued[2].id, course.id).unwrap(), 3);

    service.drop_course(holder.id, course.id, at_minute(10)).unwrap();

    assert_eq!(service.position(queued[1].id, course.id).unwrap(), 1);
    assert_eq!(service.position(queued[2].id, course.id).unwrap(), 2);
}

#[test]
fn position_without_entry_is_not_found() {
    let (engine, store) = build_engine();
    let course = add_course(&store, "CS101", 1, true, &[]);
    let ada = add_student(&store, "Ada");

    match engine.enrollments().position(ada.id, course.id) {
        Err(EnrollmentServiceError::NotFound(MissingRecord::WaitlistEntry { student, .. })) => {
            assert_eq!(student, ada.id)
        }
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn zero_seat_course_queues_every_student() {
    let (engine, store) = build_engine();
    let course = add_course(&store, "HIST202", 0, true, &[]);
    let a = add_student(&store, "A");
    let b = add_student(&store, "B");
    let service = engine.enrollments();

    assert!(matches!(
        service.enroll(a.id, course.id, at_minute(1)).unwrap(),
        EnrollOutcome::Waitlisted { position: 1, .. }
    ));
    assert!(matches!(
        service.enroll(b.id, course.id, at_minute(2)).unwrap(),
        EnrollOutcome::Waitlisted { position: 2, .. }
    ));
    assert_eq!(service.position(b.id, course.id).unwrap(), 2);
    assert_eq!(store.count_enrollments(course.id).unwrap(), 0);
    assert_eq!(waitlist_students(&store, &course), vec![a.id, b.id]);
}

#[test]
fn waitlist_status_lists_every_queue_with_positions() {
    let (engine, store) = build_engine();
    let history = add_course(&store, "HIST202", 0, true, &[]);
    let art = add_course(&store, "ART110", 0, true, &[]);
    let ada = add_student(&store, "Ada");
    let bob = add_student(&store, "Bob");
    let service = engine.enrollments();

    service.enroll(bob.id, art.id, at_minute(0)).unwrap();
    service.enroll(ada.id, history.id, at_minute(1)).unwrap();
    service.enroll(ada.id, art.id, at_minute(2)).unwrap();

    let standings = service.waitlist_status(ada.id).expect("status");
    let summary: Vec<(String, usize)> = standings
        .into_iter()
        .map(|standing| (standing.course_code, standing.position))
        .collect();
    assert_eq!(
        summary,
        vec![("HIST202".to_string(), 1), ("ART110".to_string(), 2)]
    );
}

#[test]
fn history_splits_at_the_maturity_cutoff() {
    let (engine, store) = build_engine();
    let ada = add_student(&store, "Ada");
    let old = add_course(&store, "CS101", 5, true, &[]);
    let boundary = add_course(&store, "CS102", 5, true, &[]);
    let recent = add_course(&store, "CS201", 5, true, &[]);
    enrolled_on(&store, &ada, &old, days_ago(120));
    enrolled_on(&store, &ada, &boundary, days_ago(119));
    enrolled_on(&store, &ada, &recent, days_ago(3));

    let history = engine.enrollments().history(ada.id, today()).expect("history");

    let past: Vec<_> = history.past.iter().map(|row| row.course).collect();
    let current: Vec<_> = history.current.iter().map(|row| row.course).collect();
    assert_eq!(past, vec![old.id]);
    assert_eq!(current, vec![boundary.id, recent.id]);
}

#[test]
fn remove_enrollment_promotes_like_a_drop() {
    let (engine, store) = build_engine();
    let course = add_course(&store, "CS101", 1, true, &[]);
    let ada = add_student(&store, "Ada");
    let bob = add_student(&store, "Bob");
    let service = engine.enrollments();

    let EnrollOutcome::Enrolled { enrollment } =
        service.enroll(ada.id, course.id, at_minute(0)).unwrap()
    else {
        panic!("ada should enroll");
    };
    service.enroll(bob.id, course.id, at_minute(1)).unwrap();

    let outcome = service
        .remove_enrollment(enrollment.id, at_minute(2))
        .expect("remove");
    assert!(matches!(
        outcome,
        DropOutcome::Dropped { promoted: Some(ref promoted), .. } if promoted.student == bob.id
    ));

    let roster: Vec<_> = service
        .roster(course.id)
        .unwrap()
        .into_iter()
        .map(|row| row.student)
        .collect();
    assert_eq!(roster, vec![bob.id]);
    assert!(matches!(
        service.remove_enrollment(enrollment.id, at_minute(3)),
        Err(EnrollmentServiceError::NotFound(MissingRecord::Enrollment(_)))
    ));
}

#[test]
fn edit_enrollment_sets_and_clears_grades() {
    let (engine, store) = build_engine();
    let course = add_course(&store, "CS101", 1, true, &[]);
    let ada = add_student(&store, "Ada");
    let enrollment = enrolled_on(&store, &ada, &course, today());
    let service = engine.enrollments();

    let graded = service
        .edit_enrollment(
            enrollment.id,
            EnrollmentEdit {
                final_grade: Some(" A- ".to_string()),
                date_enrolled: Some(days_ago(10)),
            },
        )
        .expect("grade");
    assert_eq!(graded.final_grade.as_deref(), Some("A-"));
    assert_eq!(graded.date_enrolled, days_ago(10));

    let cleared = service
        .edit_enrollment(
            enrollment.id,
            EnrollmentEdit {
                final_grade: Some(String::new()),
                date_enrolled: None,
            },
        )
        .expect("clear");
    assert_eq!(cleared.final_grade, None);
    assert_eq!(cleared.date_enrolled, days_ago(10));
}

#[test]
fn only_students_may_enroll() {
    let (engine, store) = build_engine();
    let course = add_course(&store, "CS101", 1, true, &[]);
    let advisor = add_user(&store, "Advisor", UserRole::Advisor);

    match engine.enrollments().enroll(advisor.id, course.id, at_minute(0)) {
        Err(EnrollmentServiceError::RoleMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, UserRole::Student);
            assert_eq!(actual, UserRole::Advisor);
        }
        other => panic!("expected role mismatch, got {other:?}"),
    }
}

#[test]
fn unknown_course_is_not_found() {
    let (engine, store) = build_engine();
    let ada = add_student(&store, "Ada");
    let missing = crate::enrollment::CourseId(4040);

    let error = engine
        .enrollments()
        .enroll(ada.id, missing, at_minute(0))
        .unwrap_err();
    assert!(matches!(
        error,
        EnrollmentServiceError::NotFound(MissingRecord::Course(id)) if id == missing
    ));
    assert_eq!(error.to_string(), "course-4040 not found");
}

#[test]
fn concurrent_enrollments_never_oversubscribe() {
    let (engine, store) = build_engine();
    let engine = Arc::new(engine);
    let course = add_course(&store, "CS101", 3, true, &[]);
    let students: Vec<_> = (0..12)
        .map(|index| add_student(&store, &format!("S{index}")))
        .collect();

    std::thread::scope(|scope| {
        for (index, student) in students.iter().enumerate() {
            let engine = engine.clone();
            let course = course.id;
            let student = student.id;
            scope.spawn(move || {
                engine
                    .enrollments()
                    .enroll(student, course, at_minute(index as i64))
                    .expect("enroll");
            });
        }
    });

    assert_eq!(store.count_enrollments(course.id).unwrap(), 3);
    assert_eq!(waitlist_students(&store, &course).len(), 9);
}

#[test]
fn enroll_waiting_on_the_course_sees_a_committed_seat_change() {
    let (engine, store) = build_engine();
    let ada = add_student(&store, "Ada");
    let course = add_course(&store, "CS101", 1, true, &[]);
    let locks = engine.enrollments().locks();
    let slot = locks.slot(course.id);

    let outcome = std::thread::scope(|scope| {
        let guard = crate::enrollment::locks::hold(&slot);
        let enrolling = scope.spawn(|| {
            engine
                .enrollments()
                .enroll(ada.id, course.id, at_minute(0))
        });
        std::thread::sleep(std::time::Duration::from_millis(50));

        let mut closed = course.clone();
        closed.seat_limit = 0;
        store.update_course(closed).expect("update course");
        drop(guard);

        enrolling.join().expect("enroll thread").expect("enroll")
    });

    assert!(
        matches!(outcome, EnrollOutcome::Waitlisted { position: 1, .. }),
        "got {outcome:?}"
    );
    assert_eq!(store.count_enrollments(course.id).unwrap(), 0);
}

#[test]
fn failed_promotion_keeps_the_waitlist_entry() {
    let (engine, store) = scripted_engine(1);
    let ada = add_student(store.inner(), "Ada");
    let bob = add_student(store.inner(), "Bob");
    let course = add_course(store.inner(), "CS101", 1, true, &[]);
    engine.enrollments().enroll(ada.id, course.id, at_minute(0)).unwrap();
    engine.enrollments().enroll(bob.id, course.id, at_minute(1)).unwrap();

    store.fail_enrollment_inserts(true);
    let result = engine.enrollments().drop_course(ada.id, course.id, at_minute(2));

    assert!(matches!(result, Err(EnrollmentServiceError::Repository(_))));
    assert_eq!(waitlist_students(store.inner(), &course), vec![bob.id]);
}

#[test]
fn direct_enrollment_clears_the_students_waitlist_entry() {
    let (engine, store) = build_engine();
    let ada = add_student(&store, "Ada");
    let bob = add_student(&store, "Bob");
    let cal = add_student(&store, "Cal");
    let course = add_course(&store, "CS101", 1, true, &[]);
    engine.enrollments().enroll(ada.id, course.id, at_minute(0)).unwrap();
    engine.enrollments().enroll(bob.id, course.id, at_minute(1)).unwrap();
    engine.enrollments().enroll(cal.id, course.id, at_minute(2)).unwrap();
    assert_eq!(engine.enrollments().position(cal.id, course.id).unwrap(), 2);

    let mut widened = course.clone();
    widened.seat_limit = 2;
    store.update_course(widened).expect("update course");

    let outcome = engine
        .enrollments()
        .enroll(bob.id, course.id, at_minute(3))
        .unwrap();
    assert!(matches!(outcome, EnrollOutcome::Enrolled { .. }));
    assert!(store.find_waitlist_entry(bob.id, course.id).unwrap().is_none());
    assert_eq!(engine.enrollments().position(cal.id, course.id).unwrap(), 1);

    match engine
        .enrollments()
        .drop_course(ada.id, course.id, at_minute(4))
        .unwrap()
    {
        DropOutcome::Dropped {
            promoted: Some(promoted),
            ..
        } => assert_eq!(promoted.student, cal.id),
        other => panic!("expected cal promoted, got {other:?}"),
    }
}
