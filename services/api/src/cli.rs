use crate::demo::{run_demo, DemoArgs};
use crate::infra::build_engine;
use crate::server;
use clap::{Args, Parser, Subcommand};
use course_enrollment::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Course Enrollment Engine",
    about = "Run the course enrollment service or walk through it from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Validate a catalog CSV and print what an import would create
    Import(ImportArgs),
    /// Run an end-to-end CLI demo of enrollment, waitlists, and overrides
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Seed the catalog from this CSV instead of APP_CATALOG_CSV
    #[arg(long)]
    pub(crate) catalog_csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// Catalog CSV with code, title, and seat_limit columns
    pub(crate) path: PathBuf,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Import(args) => run_import(args),
        Command::Demo(args) => run_demo(args),
    }
}

fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let (engine, summary) = build_engine(Some(args.path.as_path()))?;
    let summary = summary.unwrap_or_default();

    println!("Catalog import: {}", args.path.display());
    println!("- {} course(s) created", summary.created.len());
    for course in engine.catalog().courses()? {
        let prerequisites = course.prerequisites.len();
        println!(
            "  - {} {} | {} seat(s) | waitlist {} | {} prerequisite(s)",
            course.code,
            course.title,
            course.seat_limit,
            if course.waitlist_enabled { "on" } else { "off" },
            prerequisites
        );
    }
    if !summary.skipped.is_empty() {
        println!("- skipped existing codes: {}", summary.skipped.join(", "));
    }
    Ok(())
}
