use crate::api::infra::build_pipeline;
use crate::api::server;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::intake::store::sort_summaries;
use crate::intake::{LoanSummary, SortDirection, SortField, SortOrder};
use crate::telemetry;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "IronVault",
    about = "Score loan applicants from forms and CSV uploads and record the decisions",
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
    /// Score and store every applicant in a CSV file
    Import(ImportArgs),
    /// Print stored applicants in the requested order
    List(ListArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// CSV file with a header row naming the applicant fields
    #[arg(long)]
    pub(crate) file: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct ListArgs {
    /// Column to sort by (risk_score or approval_status)
    #[arg(long, default_value = "risk_score")]
    pub(crate) sort_field: SortField,
    /// Sort direction (asc or desc)
    #[arg(long, default_value = "desc")]
    pub(crate) direction: SortDirection,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Import(args) => run_import(args).await,
        Command::List(args) => run_list(args).await,
    }
}

async fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let pipeline = build_pipeline(&config)?;

    let document = std::fs::read_to_string(&args.file)?;
    let persisted = pipeline.submit_csv(&document).await?;
    info!(file = %args.file.display(), persisted = persisted.len(), "csv import finished");

    let mut summaries: Vec<LoanSummary> = persisted.iter().map(|record| record.summary()).collect();
    sort_summaries(&mut summaries, SortOrder::default());
    println!("Imported {} applicants from {}", summaries.len(), args.file.display());
    render_summaries(&summaries);
    Ok(())
}

async fn run_list(args: ListArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let pipeline = build_pipeline(&config)?;

    let order = SortOrder::new(args.sort_field, args.direction);
    let summaries = pipeline.list(order).await?;
    println!(
        "{} applicants ordered by {} {}",
        summaries.len(),
        order.field.column(),
        order.direction.keyword()
    );
    render_summaries(&summaries);
    Ok(())
}

fn render_summaries(summaries: &[LoanSummary]) {
    if summaries.is_empty() {
        println!("(no records)");
        return;
    }

    println!(
        "{:<38} {:>12} {:>6} {:>12} {:>8}  status",
        "id", "loan", "credit", "income", "risk"
    );
    for summary in summaries {
        println!(
            "{:<38} {:>12.2} {:>6} {:>12.2} {:>8.2}  {}",
            summary.id,
            summary.loan_amount,
            summary.credit_score,
            summary.income,
            summary.risk_score,
            summary.approval_status
        );
    }
}
