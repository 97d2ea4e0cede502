use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Args;
use course_enrollment::enrollment::{
    CatalogImporter, Course, DropOutcome, EnrollmentEngine, EnrollmentServiceError,
    ImportSummary, InMemoryRecordStore, NewUser, OverrideSubmission, RecordStore,
    StoreInstructorDirectory, User, UserRole, PREREQUISITE_MATURITY_DAYS,
};
use course_enrollment::error::AppError;
use std::path::PathBuf;
use std::sync::Arc;

type DemoEngine =
    EnrollmentEngine<InMemoryRecordStore, StoreInstructorDirectory<InMemoryRecordStore>>;

const DEMO_CATALOG: &str = "\
code,title,seat_limit,waitlist_enabled,prerequisites,instructor,meeting_times
HIST101,World History,2,true,,Dr. Jones,MWF 09:00
HIST202,Modern History,0,true,HIST101,Dr. Jones,TTh 11:00
HIST301,Historiography,5,false,HIST101;HIST202,Dr. Okafor,W 15:00
";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the walk-through treats as today (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Catalog CSV to load instead of the built-in one. Must define HIST101 and HIST202.
    #[arg(long)]
    pub(crate) catalog_csv: Option<PathBuf>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { today, catalog_csv } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let term_start = today - Duration::days(PREREQUISITE_MATURITY_DAYS);

    let store = Arc::new(InMemoryRecordStore::new());
    let engine: DemoEngine = EnrollmentEngine::with_store(store.clone());

    println!("Course enrollment demo (today {today}, term started {term_start})");
    let summary = match catalog_csv {
        Some(path) => CatalogImporter::from_path(path, engine.catalog())?,
        None => CatalogImporter::from_reader(DEMO_CATALOG.as_bytes(), engine.catalog())?,
    };
    render_catalog(&engine, &summary)?;

    let intro = required_course(&engine, "HIST101")?;
    let modern = required_course(&engine, "HIST202")?;
    let ada = add_user(&store, "Ada Lovelace", UserRole::Student)?;
    let ben = add_user(&store, "Ben Okri", UserRole::Student)?;
    let cal = add_user(&store, "Cal Newport", UserRole::Student)?;
    let registrar = add_user(&store, "Registrar", UserRole::Administrator)?;

    println!("\n{} (term start)", intro.code);
    let opening = at(term_start, 0);
    for (offset, student) in [&ada, &ben].into_iter().enumerate() {
        let outcome = engine
            .enrollments()
            .enroll(student.id, intro.id, opening + Duration::minutes(offset as i64))?;
        println!("- {}: {}", student.full_name, outcome.summary());
    }

    println!(
        "\n{} ({} days later, {} seat(s))",
        modern.code, PREREQUISITE_MATURITY_DAYS, modern.seat_limit
    );
    let now = at(today, 0);
    for (offset, student) in [&ada, &ben].into_iter().enumerate() {
        let outcome = engine
            .enrollments()
            .enroll(student.id, modern.id, now + Duration::minutes(offset as i64))?;
        println!("- {}: {}", student.full_name, outcome.summary());
    }

    println!("\nOverride for {} in {}", ada.full_name, modern.code);
    let request = match engine
        .overrides()
        .request(ada.id, modern.id, "thesis depends on this seminar")?
    {
        OverrideSubmission::Created { request }
        | OverrideSubmission::AlreadyRequested { request } => request,
    };
    let reviewer = match modern.instructor {
        Some(instructor) => instructor,
        None => registrar.id,
    };
    println!(
        "- pending for reviewer {reviewer}: {}",
        engine.overrides().pending(reviewer)?.len()
    );
    let resolution = engine.overrides().approve(request.id, reviewer, today)?;
    println!("- {}", resolution.summary());
    println!(
        "- {} now waitlisted at position {}",
        ben.full_name,
        engine.enrollments().position(ben.id, modern.id)?
    );

    println!("\nDrop and promotion in {}", intro.code);
    let outcome = engine
        .enrollments()
        .enroll(cal.id, intro.id, at(today, 10))?;
    println!("- {}: {}", cal.full_name, outcome.summary());
    match engine.enrollments().drop_course(ada.id, intro.id, at(today, 20))? {
        DropOutcome::Dropped { promoted, .. } => {
            println!("- {} dropped {}", ada.full_name, intro.code);
            if let Some(promoted) = promoted {
                println!(
                    "- promoted {} from the waitlist on {}",
                    promoted.student, promoted.date_enrolled
                );
            }
        }
        DropOutcome::NotEnrolled => println!("- {} was not enrolled", ada.full_name),
    }

    let history = engine.enrollments().history(ada.id, today)?;
    println!(
        "\n{}: {} current enrollment(s), {} past",
        ada.full_name,
        history.current.len(),
        history.past.len()
    );

    Ok(())
}

fn render_catalog(engine: &DemoEngine, summary: &ImportSummary) -> Result<(), AppError> {
    println!("Catalog: {} course(s) imported", summary.created.len());
    for course in engine.catalog().courses()? {
        println!(
            "- {} {} | {} seat(s) | waitlist {} | {}",
            course.code,
            course.title,
            course.seat_limit,
            if course.waitlist_enabled { "on" } else { "off" },
            course.meeting_times
        );
    }
    Ok(())
}

fn required_course(engine: &DemoEngine, code: &str) -> Result<Course, AppError> {
    let course = engine.catalog().course_by_code(code)?;
    course.ok_or_else(|| {
        AppError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("demo catalog is missing {code}"),
        ))
    })
}

fn add_user(
    store: &InMemoryRecordStore,
    full_name: &str,
    role: UserRole,
) -> Result<User, AppError> {
    let user = store
        .insert_user(NewUser {
            full_name: full_name.to_string(),
            name: full_name.to_lowercase().replace(' ', "."),
            role,
            email: None,
        })
        .map_err(EnrollmentServiceError::from)?;
    Ok(user)
}

fn at(day: NaiveDate, minutes: i64) -> DateTime<Utc> {
    let midnight = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
    midnight + Duration::hours(9) + Duration::minutes(minutes)
}
