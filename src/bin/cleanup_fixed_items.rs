use std::error::Error;
use std::sync::{Arc, Mutex};

use clap::Parser;
use rusqlite::Connection;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fintrack_rs::{
    cleanup::{CleanupOptions, CleanupReport, cleanup_user, user_ids},
    initialize_db,
    transaction::{SQLiteTransactionStore, TracedStore, TransactionKind},
};

/// Repairs recurring incomes and expenses in a fintrack_rs database.
///
/// Duplicate templates are merged into the oldest one, legacy rows are linked
/// to their template and surplus occurrences are reported.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// Report what would change without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Delete occurrences booked more than once for the same template and month.
    #[arg(long)]
    delete_duplicates: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    setup_logging();

    let args = Args::parse();
    let options = CleanupOptions {
        dry_run: args.dry_run,
        delete_duplicates: args.delete_duplicates,
    };

    let connection = Connection::open(&args.db_path)?;
    initialize_db(&connection)?;
    let users = user_ids(&connection)?;

    let store = TracedStore::new(SQLiteTransactionStore::new(Arc::new(Mutex::new(
        connection,
    ))));

    if options.dry_run {
        println!("Dry run, nothing will be written.");
    }

    let mut total = CleanupReport::default();

    for user_id in users {
        for kind in TransactionKind::ALL {
            let report = cleanup_user(&store, user_id, kind, options)?;

            if !report.is_empty() {
                println!("User {user_id}, {kind}:");
                print_report(&report);
            }

            total.merge(report);
        }
    }

    println!(
        "Done: {} duplicate templates, {} occurrences deleted with them, {} rows linked, {} surplus rows ({} deleted).",
        total.merged_templates.len(),
        total.deleted_occurrences,
        total.linked_rows.len(),
        total.surplus_rows.len(),
        total.deleted_surplus_rows,
    );

    Ok(())
}

fn print_report(report: &CleanupReport) {
    for merge in &report.merged_templates {
        println!(
            "  template {} duplicates template {}",
            merge.removed_id, merge.kept_id
        );
    }

    for link in &report.linked_rows {
        println!("  row {} linked to template {}", link.row_id, link.template_id);
    }

    for surplus in &report.surplus_rows {
        println!(
            "  row {} repeats the {} occurrence of template {}",
            surplus.row_id, surplus.period, surplus.template_id
        );
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
