use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::info;

use sales_etl::config::{Config, Credentials, ObjectStoreConfig, Preset};
use sales_etl::logging;
use sales_etl::pipeline::report::TracingReporter;
use sales_etl::pipeline::{run_phase, Pipeline, PipelinePlan, RunReport};
use sales_etl::Phase;

#[derive(Parser)]
#[command(name = "sales_etl")]
#[command(about = "Extract the raw sales CSV, clean it, and load it")]
#[command(version)]
struct Cli {
    /// Directory for the rolling JSON log
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once
    Run(RunArgs),
    /// Resolve and print the pipeline without running it
    Check(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Built-in configuration, used when --config is not given
    #[arg(long, value_enum, default_value_t = Preset::Local)]
    preset: Preset,
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the source bucket
    #[arg(long)]
    bucket: Option<String>,
    /// Override the source object key
    #[arg(long)]
    key: Option<String>,
    /// Read and write objects under this directory instead of S3
    #[arg(long)]
    store_root: Option<PathBuf>,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn resolve_config(args: &RunArgs) -> sales_etl::Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::preset(args.preset),
    };
    let mut config = config.with_source_object(args.bucket.clone(), args.key.clone());
    if let Some(root) = &args.store_root {
        config.object_store = ObjectStoreConfig::Local { root: root.clone() };
    }
    config.validate()?;
    Ok(config)
}

fn print_plan(plan: &PipelinePlan, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }
    println!("🔎 Source: {}", plan.source);
    println!("   Required columns: {}", plan.required_columns.join(", "));
    println!("🧹 Cleaning:");
    for (i, step) in plan.steps.iter().enumerate() {
        println!("   {}. {}", i + 1, step);
    }
    println!("💾 Sinks:");
    for sink in &plan.sinks {
        println!("   - {}", sink);
    }
    Ok(())
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("\n📊 Run {}:", report.run_id);
    println!("   Source: {}", report.source);
    println!("   Rows extracted: {}", report.rows_extracted);
    println!("   Rows loaded: {}", report.rows_loaded);
    println!("   Columns: {}", report.columns.join(", "));
    for sink in &report.sinks {
        println!("   Loaded into: {}", sink);
    }
    println!("   Elapsed: {} ms", report.elapsed_ms);
    Ok(())
}

fn run(args: &RunArgs) -> anyhow::Result<()> {
    // Failures in every phase are reported where they happen
    let configured = run_phase(Phase::Configuration, &TracingReporter, || {
        let config = resolve_config(args)?;
        let credentials = Credentials::from_env(&config)?;
        Pipeline::from_config(&config, &credentials)
    });
    let Ok(pipeline) = configured else {
        return Ok(());
    };

    info!("Starting ETL pipeline");
    if let Ok(report) = pipeline.run(&TracingReporter) {
        print_report(&report, args.json)?;
    }
    Ok(())
}

fn check(args: &RunArgs) -> anyhow::Result<()> {
    let config = resolve_config(args)?;
    print_plan(&PipelinePlan::from_config(&config), args.json)
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let _guard = logging::init_logging(Path::new(&cli.log_dir));

    match &cli.command {
        Commands::Run(args) => run(args),
        Commands::Check(args) => check(args),
    }
}
