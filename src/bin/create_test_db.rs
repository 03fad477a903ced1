use std::error::Error;
use std::path::Path;
use std::process::exit;
use std::sync::{Arc, Mutex};

use clap::Parser;
use rusqlite::Connection;
use time::macros::date;

use fintrack_rs::{
    CacheConfig, CategoryName, OccurrenceCache, create_category, initialize_db,
    transaction::{
        NewOccurrence, NewTemplate, NewTransaction, RecurrenceType, SQLiteTransactionStore,
        TransactionKind, TransactionStore, create_one_off_or_promote, create_template,
    },
};

/// A utility for creating a test database for the REST API server of fintrack_rs.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,

    /// The user that owns the demo data.
    #[arg(long, default_value_t = 1)]
    user_id: i64,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    let user_id = args.user_id;

    println!("Creating categories...");
    let housing = create_category(user_id, CategoryName::new("Housing")?, &conn)?;
    let salary_category = create_category(user_id, CategoryName::new("Salary")?, &conn)?;
    let groceries = create_category(user_id, CategoryName::new("Groceries")?, &conn)?;

    let store = SQLiteTransactionStore::new(Arc::new(Mutex::new(conn)));
    let cache = OccurrenceCache::new(CacheConfig::default());
    let today = date!(2024 - 01 - 01);

    println!("Creating recurring incomes and expenses...");
    let salary = create_template(
        &store,
        &cache,
        user_id,
        TransactionKind::Income,
        NewTemplate {
            description: Some("Salary".to_owned()),
            value: 5000.0,
            category_id: Some(salary_category.id),
            recurrence_type: RecurrenceType::Monthly,
            start_date: Some(date!(2024 - 01 - 05)),
            end_date: None,
        },
        today,
    )?;
    let rent = create_template(
        &store,
        &cache,
        user_id,
        TransactionKind::Expense,
        NewTemplate {
            description: Some("Rent".to_owned()),
            value: 1500.0,
            category_id: Some(housing.id),
            recurrence_type: RecurrenceType::Monthly,
            start_date: Some(date!(2024 - 01 - 31)),
            end_date: None,
        },
        today,
    )?;
    create_template(
        &store,
        &cache,
        user_id,
        TransactionKind::Expense,
        NewTemplate {
            description: Some("Insurance".to_owned()),
            value: 600.0,
            category_id: None,
            recurrence_type: RecurrenceType::Yearly,
            start_date: Some(date!(2024 - 03 - 15)),
            end_date: Some(date!(2026 - 03 - 15)),
        },
        today,
    )?;

    println!("Booking occurrences...");
    for (kind, template, date) in [
        (TransactionKind::Income, &salary, date!(2024 - 01 - 05)),
        (TransactionKind::Income, &salary, date!(2024 - 02 - 05)),
        (TransactionKind::Expense, &rent, date!(2024 - 01 - 31)),
    ] {
        create_one_off_or_promote(
            &store,
            &cache,
            user_id,
            kind,
            NewOccurrence {
                description: template.description.clone(),
                value: template.value,
                date,
                category_id: template.category_id,
                linked_template_id: Some(template.id),
            },
        )?;
    }

    create_one_off_or_promote(
        &store,
        &cache,
        user_id,
        TransactionKind::Expense,
        NewOccurrence {
            description: Some("Supermarket".to_owned()),
            value: 212.35,
            date: date!(2024 - 02 - 10),
            category_id: Some(groceries.id),
            linked_template_id: None,
        },
    )?;

    // February's rent was booked before occurrences were linked to their template.
    println!("Creating a legacy unlinked occurrence...");
    store.create_transaction(
        NewTransaction::one_off(TransactionKind::Expense, user_id, 1500.0, date!(2024 - 02 - 29))
            .description(Some("Rent".to_owned()))
            .category_id(Some(housing.id)),
    )?;

    println!("Success!");

    Ok(())
}
