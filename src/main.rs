// Cinedup CLI binary

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cinedup::confidence::ConfidenceScore;
use cinedup::db::{get_db_path, get_reports_path, init_catalog_folders, open_db};
use cinedup::db::schema::{self, RecordFilter};
use cinedup::jobs::runner::{run_dedupe, run_score, RunOptions};
use cinedup::jobs::RunSummary;

#[derive(Parser)]
#[command(name = "cinedup")]
#[command(about = "Cinedup - duplicate detection and confidence scoring for a movie catalog", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new catalog
    Init {
        /// Catalog root path
        path: PathBuf,
    },

    /// Find duplicate pairs and merge them (dry run unless --execute)
    Dedupe {
        /// Catalog root (defaults to current directory)
        #[arg(short, long)]
        catalog: Option<PathBuf>,
        /// Apply merges instead of only reporting them
        #[arg(long)]
        execute: bool,
        /// Restrict to one entity type (movie or person)
        #[arg(long)]
        entity_type: Option<String>,
        /// Only consider records with at least this many dependent rows
        #[arg(long)]
        min_count: Option<i64>,
        /// Restrict to these record ids
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
        /// Curated rejection list (JSON)
        #[arg(long)]
        rejections: Option<PathBuf>,
        /// Resume the previous checkpointed run
        #[arg(long)]
        resume: bool,
        /// Start at this unit key, skipping everything before it
        #[arg(long)]
        resume_from: Option<String>,
        /// Stop after this many units
        #[arg(long)]
        batch_size: Option<usize>,
        /// Sleep between units, in milliseconds
        #[arg(long, default_value = "0")]
        batch_delay_ms: u64,
        /// Where the checkpoint and report land (defaults to .cinedup/reports)
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Recompute confidence annotations (dry run unless --execute)
    Score {
        /// Catalog root (defaults to current directory)
        #[arg(short, long)]
        catalog: Option<PathBuf>,
        /// Persist the annotations instead of only reporting them
        #[arg(long)]
        execute: bool,
        /// Restrict to one entity type (movie or person)
        #[arg(long)]
        entity_type: Option<String>,
        /// Only consider records with at least this many dependent rows
        #[arg(long)]
        min_count: Option<i64>,
        /// Restrict to these record ids
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
        /// Resume the previous checkpointed run
        #[arg(long)]
        resume: bool,
        /// Start at this unit key, skipping everything before it
        #[arg(long)]
        resume_from: Option<String>,
        /// Stop after this many units
        #[arg(long)]
        batch_size: Option<usize>,
        /// Sleep between units, in milliseconds
        #[arg(long, default_value = "0")]
        batch_delay_ms: u64,
        /// Where the checkpoint and report land (defaults to .cinedup/reports)
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Show one record with its confidence breakdown
    Show {
        /// Record ID
        #[arg(required_unless_present = "title")]
        id: Option<i64>,
        /// Look up by exact title instead of id
        #[arg(long, conflicts_with = "id")]
        title: Option<String>,
        /// Release year for the title lookup
        #[arg(long, requires = "title")]
        year: Option<i64>,
        /// Entity type for the title lookup (movie or person)
        #[arg(long, default_value = "movie", requires = "title")]
        entity_type: String,
        /// Catalog root (defaults to current directory)
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },

    /// Catalog overview: record counts and verification distribution
    Status {
        /// Catalog root (defaults to current directory)
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => cmd_init(path),
        Commands::Dedupe {
            catalog,
            execute,
            entity_type,
            min_count,
            ids,
            rejections,
            resume,
            resume_from,
            batch_size,
            batch_delay_ms,
            report_dir,
        } => {
            let root = resolve_catalog_root(catalog)?;
            let opts = RunOptions {
                execute,
                entity_type,
                min_count,
                ids,
                resume,
                resume_from,
                batch_size,
                batch_delay_ms,
                report_dir: report_dir.unwrap_or_else(|| get_reports_path(&root)),
                rejections_path: rejections,
                ..RunOptions::default()
            };
            let conn = open_db(&get_db_path(&root))?;
            let summary = run_dedupe(&conn, &opts)?;
            print_summary(&summary, &opts.report_dir);
            Ok(())
        }
        Commands::Score {
            catalog,
            execute,
            entity_type,
            min_count,
            ids,
            resume,
            resume_from,
            batch_size,
            batch_delay_ms,
            report_dir,
        } => {
            let root = resolve_catalog_root(catalog)?;
            let opts = RunOptions {
                execute,
                entity_type,
                min_count,
                ids,
                resume,
                resume_from,
                batch_size,
                batch_delay_ms,
                report_dir: report_dir.unwrap_or_else(|| get_reports_path(&root)),
                ..RunOptions::default()
            };
            let conn = open_db(&get_db_path(&root))?;
            let summary = run_score(&conn, &opts, None)?;
            print_summary(&summary, &opts.report_dir);
            Ok(())
        }
        Commands::Show { id, title, year, entity_type, catalog } => {
            cmd_show(id, title, year, &entity_type, catalog)
        }
        Commands::Status { catalog } => cmd_status(catalog),
    }
}

fn cmd_init(path: PathBuf) -> Result<()> {
    let catalog_root = path.canonicalize().unwrap_or(path.clone());

    let db_path = get_db_path(&catalog_root);
    if db_path.exists() {
        anyhow::bail!("Catalog already exists at {}", catalog_root.display());
    }

    init_catalog_folders(&catalog_root)?;
    open_db(&db_path)?;

    println!("Initialized catalog at {}", catalog_root.display());
    println!("Structure created:");
    println!("  .cinedup/catalog.db  - Database");
    println!("  .cinedup/reports/    - Run reports and checkpoints");

    Ok(())
}

fn cmd_show(
    id: Option<i64>,
    title: Option<String>,
    year: Option<i64>,
    entity_type: &str,
    catalog: Option<PathBuf>,
) -> Result<()> {
    let catalog_root = resolve_catalog_root(catalog)?;
    let conn = open_db(&get_db_path(&catalog_root))?;

    let record = match (id, title) {
        (Some(id), _) => schema::get_record(&conn, id)?
            .ok_or_else(|| anyhow::anyhow!("Record {} not found", id))?,
        (None, Some(title)) => {
            schema::get_record_by_natural_key(&conn, entity_type, &title, year)?.ok_or_else(
                || {
                    anyhow::anyhow!(
                        "No {} titled '{}'{} found",
                        entity_type,
                        title,
                        year.map(|y| format!(" ({})", y)).unwrap_or_default()
                    )
                },
            )?
        }
        (None, None) => anyhow::bail!("Provide a record id or --title"),
    };
    let id = record.id;

    println!("Record #{} ({})", record.id, record.entity_type);
    println!();
    println!("Title:       {}", record.title);
    if let Some(year) = record.release_year {
        println!("Year:        {}", year);
    }
    if let Some(ref director) = record.director {
        println!("Director:    {}", director);
    }
    if let Some(ref cast) = record.cast_names {
        println!("Cast:        {}", cast);
    }
    if let Some(ref genres) = record.genres {
        println!("Genres:      {}", genres);
    }
    if let Some(runtime) = record.runtime_minutes {
        println!("Runtime:     {} min", runtime);
    }
    if let Some(rating) = record.rating {
        println!("Rating:      {:.1}", rating);
    }
    if let Some(ref synopsis) = record.synopsis {
        println!("Synopsis:    {}", ellipsize(synopsis, 120));
    }
    if !record.is_published {
        println!("Published:   no (soft-deleted or pending)");
    }
    println!("Updated:     {}", record.updated_at);

    let sources = schema::list_field_sources(&conn, id)?;
    if !sources.is_empty() {
        println!();
        println!("Provenance ({} ledger entries):", sources.len());
        for src in &sources {
            let verified = src
                .verified_at
                .as_deref()
                .map(|v| format!(" verified {}", v.split(' ').next().unwrap_or(v)))
                .unwrap_or_default();
            println!(
                "  {:<16} {} ({}, reliability {:.2}){}",
                src.field_name, src.source_id, src.source_kind, src.declared_reliability, verified
            );
        }
    }

    if let Some(overall) = record.confidence_overall {
        println!();
        println!(
            "Confidence:  {:.2} [{}]{}",
            overall,
            record.verification_status.as_deref().unwrap_or("unverified"),
            if record.needs_review { " NEEDS REVIEW" } else { "" }
        );
        if let Some(ref detail) = record.confidence_detail {
            if let Ok(score) = serde_json::from_str::<ConfidenceScore>(detail) {
                for (field, value) in &score.by_field {
                    println!("  {:<16} {:.2}", field, value);
                }
                if !score.by_category.is_empty() {
                    println!("  By category:");
                    for (category, value) in &score.by_category {
                        println!("    {:<14} {:.2}", category, value);
                    }
                }
            }
        }
    } else {
        println!();
        println!("Confidence:  not yet scored. Run 'cinedup score --execute'.");
    }

    Ok(())
}

fn cmd_status(catalog: Option<PathBuf>) -> Result<()> {
    let catalog_root = resolve_catalog_root(catalog)?;
    let conn = open_db(&get_db_path(&catalog_root))?;

    let filter = RecordFilter { include_unpublished: true, ..RecordFilter::default() };
    let records = schema::list_records(&conn, &filter)?;

    println!("Catalog: {}", catalog_root.display());
    println!();

    for entity_type in cinedup::constants::ENTITY_TYPES {
        let of_type: Vec<_> =
            records.iter().filter(|r| r.entity_type == entity_type).collect();
        if of_type.is_empty() {
            continue;
        }

        let published = of_type.iter().filter(|r| r.is_published).count();
        let scored = of_type.iter().filter(|r| r.confidence_overall.is_some()).count();
        let needs_review = of_type.iter().filter(|r| r.needs_review).count();

        println!(
            "{:<8} {:>6} records ({} published, {} scored, {} need review)",
            entity_type,
            of_type.len(),
            published,
            scored,
            needs_review
        );

        let mut by_status: std::collections::BTreeMap<&str, usize> =
            std::collections::BTreeMap::new();
        for record in &of_type {
            let status = record.verification_status.as_deref().unwrap_or("unscored");
            *by_status.entry(status).or_insert(0) += 1;
        }
        for (status, count) in &by_status {
            println!("  {:<18} {:>6}", status, count);
        }
        println!();
    }

    if records.is_empty() {
        println!("No records found.");
    }

    let checkpoint_path =
        get_reports_path(&catalog_root).join(cinedup::constants::CHECKPOINT_FILENAME);
    if checkpoint_path.exists() {
        let checkpoint = cinedup::jobs::RunCheckpoint::load(&checkpoint_path)?;
        let summary = RunSummary::from_checkpoint(&checkpoint);
        println!("Last run: {} ({})", summary.job_kind, checkpoint.started_at);
        print_summary(&summary, &get_reports_path(&catalog_root));
    } else {
        println!("No runs recorded yet.");
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, report_dir: &std::path::Path) {
    println!();
    if summary.dry_run {
        println!("Dry run complete (no changes were made):");
    } else {
        println!("Run complete:");
    }
    println!("  Total units:  {}", summary.total);
    println!("  Processed:    {}", summary.processed);
    println!("  Succeeded:    {}", summary.succeeded);
    println!("  Failed:       {}", summary.failed);
    println!("  Skipped:      {}", summary.skipped);

    if !summary.by_outcome.is_empty() {
        println!();
        println!("By outcome:");
        for (outcome, count) in &summary.by_outcome {
            println!("  {:<24} {:>6}", outcome, count);
        }
    }

    if !summary.top_failures.is_empty() {
        println!();
        println!("Top failures:");
        for failure in &summary.top_failures {
            println!("  {:>4}x  {}", failure.count, failure.reason);
        }
    }

    println!();
    println!("Report written to {}", report_dir.display());
}

/// Shorten display text counting chars, not bytes. Catalog text is largely
/// Telugu, so byte slicing would land mid-character.
fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", head)
}

fn resolve_catalog_root(catalog: Option<PathBuf>) -> Result<PathBuf> {
    let path = catalog
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let path = path.canonicalize().unwrap_or(path);

    let db_path = get_db_path(&path);
    if !db_path.exists() {
        anyhow::bail!(
            "No catalog found at {}. Use 'cinedup init <path>' to create one.",
            path.display()
        );
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ellipsize_keeps_short_text() {
        assert_eq!(ellipsize("Devi", 120), "Devi");
    }

    #[test]
    fn test_ellipsize_handles_multibyte_text() {
        // 120 bytes of Telugu is far fewer than 120 chars; a byte-indexed
        // slice would land mid-character and panic
        let synopsis = "ఒక పాము దేవత తన భక్తురాలిని కాపాడే కథ. ".repeat(6);
        assert!(synopsis.len() > 120);
        let short = ellipsize(&synopsis, 120);
        assert!(short.ends_with("..."));
        assert!(short.chars().count() <= 120);

        let exactly_at_limit: String = synopsis.chars().take(120).collect();
        assert_eq!(ellipsize(&exactly_at_limit, 120), exactly_at_limit);
    }
}
