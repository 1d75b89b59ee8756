use clap::Parser;
use membership_payment_migration::converter::{Converter, DEFAULT_PAGE_SIZE};
use membership_payment_migration::handler::{
    InsertingPaymentHandler, NullPaymentHandler, PaymentHandler,
};
use membership_payment_migration::progress::TermProgressReporter;
use membership_payment_migration::storage;
use std::process::ExitCode;

const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Parser, Debug)]
#[command(
    name = "membership-payment-migration",
    version,
    about = "Extracts payment data from legacy membership applications into standalone payment records"
)]
struct Cli {
    /// Path to the SQLite database holding the legacy table
    #[arg(long)]
    db: String,

    /// First id to migrate (exclusive); defaults to the last already-migrated id
    #[arg(long)]
    start_id: Option<i64>,

    /// Last id to migrate (inclusive); defaults to the current maximum id
    #[arg(long)]
    end_id: Option<i64>,

    /// Rows fetched per cursor page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: i64,

    /// Payments buffered per transactional flush
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Convert rows without writing payments or back-references
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("migration aborted: {}", error);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, String> {
    let pool = storage::create_pool(&cli.db).await?;
    storage::init_schema(&pool).await?;

    let start_id = match cli.start_id {
        Some(value) => value,
        None => storage::last_migrated_id(&pool).await?,
    };
    let end_id = match cli.end_id {
        Some(value) => value,
        None => storage::source_max_id(&pool).await?,
    };

    let mut handler: Box<dyn PaymentHandler> = if cli.dry_run {
        Box::new(NullPaymentHandler::new())
    } else {
        Box::new(InsertingPaymentHandler::new(pool.clone(), cli.batch_size))
    };
    let total = end_id.saturating_sub(start_id).max(0) as u64;
    let mut progress = TermProgressReporter::new(total);

    let converter = Converter::new(pool.clone(), cli.page_size);
    let result = converter
        .convert(handler.as_mut(), &mut progress, start_id, Some(end_id))
        .await?;

    print!("{}", result.render_summary());
    let missing = storage::missing_payment_reference_count(&pool).await?;
    println!("rows still lacking a payment reference: {}", missing);

    let failed = result.error_total() > 0 || (!cli.dry_run && missing > 0);
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
