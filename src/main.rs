mod batch;
mod classify;
mod db;
mod export;
mod models;
mod parser;
mod portal;
mod roll;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use batch::{BatchParams, BatchResult};
use portal::{PageSource, Portal};
use settings::Settings;

const SUMMARY_FILE: &str = "bulk_results.csv";
const FULL_FILE: &str = "full_results.csv";

#[derive(Parser)]
#[command(name = "gradewise", about = "Bulk grade-wise results fetcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch results for a range of roll numbers and store them as the latest batch
    Fetch {
        /// Circular (exam notification) number, e.g. "25"
        #[arg(long)]
        circular: String,
        /// College code, e.g. "001"
        #[arg(long)]
        college: String,
        /// Branch code, e.g. "CM"
        #[arg(long)]
        branch: String,
        /// Semester code as the portal expects it
        #[arg(long)]
        semester: String,
        /// First roll serial (inclusive)
        #[arg(long)]
        from: u32,
        /// Last roll serial (inclusive)
        #[arg(long)]
        to: u32,
        /// Parallel requests (default: from settings)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
        /// Also write the summary and full CSV exports
        #[arg(long)]
        export: bool,
    },
    /// Show one student's full result
    Student {
        roll: String,
        semester: String,
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Write CSV exports of the latest (or a given) batch
    Export {
        #[arg(long, default_value = SUMMARY_FILE)]
        summary: PathBuf,
        #[arg(long, default_value = FULL_FILE)]
        full: PathBuf,
        /// Batch id (default: latest)
        #[arg(long)]
        batch: Option<i64>,
    },
    /// List stored batches, newest first
    Batches {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;

    let result = match cli.command {
        Commands::Fetch {
            circular,
            college,
            branch,
            semester,
            from,
            to,
            concurrency,
            export: also_export,
        } => {
            roll::check_range(from, to)?;
            if let Some(n) = concurrency {
                settings.concurrency = n;
                settings.validate()?;
            }
            let params = BatchParams {
                circular_no: circular,
                college_code: college,
                branch_code: branch,
                semester,
                roll_from: from,
                roll_to: to,
            };
            if params.roll_from > params.roll_to {
                println!("Empty roll range ({} > {}); nothing to fetch.", from, to);
                return Ok(());
            }

            let portal = Arc::new(Portal::new(&settings)?);
            let batch = batch::run_batch(portal, params, &settings).await?;

            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let id = db::save_batch(&conn, &batch)?;
            info!(batch_id = id, "Saved batch");

            print_batch(&batch);
            println!("\nStored as batch #{}.", id);
            if also_export {
                write_exports(&batch, Path::new(SUMMARY_FILE), Path::new(FULL_FILE))?;
            }
            Ok(())
        }
        Commands::Student {
            roll,
            semester,
            json,
        } => {
            let portal = Portal::new(&settings)?;
            let html = portal
                .fetch(&roll, &semester)
                .await
                .with_context(|| format!("Failed to fetch {}", roll))?;
            let extraction = parser::extract_detail(&roll, &html, &settings.columns);

            if json {
                println!("{}", serde_json::to_string_pretty(&extraction)?);
            } else {
                print_student(&extraction);
            }
            Ok(())
        }
        Commands::Export {
            summary,
            full,
            batch: batch_id,
        } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let stored = match batch_id {
                Some(id) => db::load_batch(&conn, id)?,
                None => db::load_latest(&conn)?,
            };
            let Some(stored) = stored else {
                match batch_id {
                    Some(id) => println!("No batch #{}.", id),
                    None => println!("No completed batch yet. Run 'fetch' first."),
                }
                return Ok(());
            };
            println!("Exporting batch #{} ({} students)", stored.id, stored.batch.entries.len());
            write_exports(&stored.batch, &summary, &full)
        }
        Commands::Batches { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::list_batches(&conn, limit)?;
            if rows.is_empty() {
                println!("No batches stored.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<20} | {:<8} | {:>9} | {:>5} | {:>4} | {:>4} | {:>4} | {:>4} | {:>4} | {:>4} | {:<20}",
                "#", "Prefix", "Sem", "Range", "Rolls", "Pass", "F1", "F2", "F3", "F4+", "Err", "Created"
            );
            println!("{}", "-".repeat(118));
            for r in &rows {
                let p = &r.params;
                let prefix = format!("{}{}-{}", p.circular_no, p.college_code, p.branch_code);
                let b = &r.buckets;
                println!(
                    "{:>4} | {:<20} | {:<8} | {:>9} | {:>5} | {:>4} | {:>4} | {:>4} | {:>4} | {:>4} | {:>4} | {:<20}",
                    r.id,
                    truncate(&prefix, 20),
                    truncate(&p.semester, 8),
                    format!("{:03}-{:03}", p.roll_from, p.roll_to),
                    r.entries,
                    b.pass_all,
                    b.fail_1,
                    b.fail_2,
                    b.fail_3,
                    b.fail_4_plus,
                    r.errors,
                    r.created_at
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_batch(batch: &BatchResult) {
    println!(
        "{:<16} | {:<28} | {:>11} | {:<10} | {:>6}",
        "Roll No", "Name", "Grand Total", "Result", "Failed"
    );
    println!("{}", "-".repeat(84));
    for e in &batch.entries {
        let row = export::summary_row(e);
        println!(
            "{:<16} | {:<28} | {:>11} | {:<10} | {:>6}",
            row[0],
            truncate(&row[1], 28),
            row[2],
            truncate(&row[3], 10),
            row[4]
        );
    }

    let b = &batch.buckets;
    println!("\n--- Semester {} ---", batch.params.semester);
    println!("With result:    {}", b.total());
    println!("Passed all:     {}", b.pass_all);
    println!("Failed 1:       {}", b.fail_1);
    println!("Failed 2:       {}", b.fail_2);
    println!("Failed 3:       {}", b.fail_3);
    println!("Failed 4+:      {}", b.fail_4_plus);
    println!(
        "No result:      {}",
        batch.entries.len() - b.total() as usize - batch.failed.len()
    );

    if !batch.failed.is_empty() {
        println!("\n--- Fetch errors ({}) ---", batch.failed.len());
        for f in &batch.failed {
            println!("  [{}] {}: {}", f.index, f.roll, f.error);
        }
    }
}

fn print_student(extraction: &parser::Extraction) {
    let student = &extraction.student;
    if student.attribute_count() == 0 {
        println!("No result for {}.", student.pin());
        return;
    }
    for (key, value) in student.fields() {
        println!("{:<16} {}", key, value);
    }
    match &student.photo {
        Some(src) => println!("{:<16} embedded ({} bytes)", "Photo", src.len()),
        None => println!("{:<16} -", "Photo"),
    }

    if extraction.subjects.is_empty() {
        println!("\nNo subjects found.");
        return;
    }
    println!(
        "\n{:<10} | {:>8} | {:>8} | {:>6} | {:<5} | {:<6}",
        "Paper", "External", "Internal", "Total", "Grade", "Status"
    );
    println!("{}", "-".repeat(58));
    for s in &extraction.subjects {
        println!(
            "{:<10} | {:>8} | {:>8} | {:>6} | {:<5} | {:<6}",
            truncate(&s.code, 10),
            s.external,
            s.internal,
            s.total,
            s.grade,
            s.status
        );
    }
    let entry = classify::classify(student, &extraction.subjects);
    println!(
        "\n{} subjects, {} failed ({})",
        extraction.subjects.len(),
        entry.fail_count.unwrap_or_default(),
        entry.result
    );
}

fn write_exports(batch: &BatchResult, summary: &Path, full: &Path) -> anyhow::Result<()> {
    export::write_summary_file(summary, &batch.entries)?;
    export::write_full_file(full, &batch.full_rows)?;
    let subject_rows = batch.full_rows.iter().filter(|r| !r.is_separator()).count();
    println!(
        "Wrote {} ({} students) and {} ({} subject rows)",
        summary.display(),
        batch.entries.len(),
        full.display(),
        subject_rows
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
