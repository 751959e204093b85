//! mssql-tempdb CLI - provision throwaway SQL Server test databases.

use clap::{Args, Parser, Subcommand};
use mssql_tempdb::{Config, CopyPlan, HarnessError, Operation, PlanReport, TempDb};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mssql-tempdb")]
#[command(about = "Provision throwaway SQL Server databases for integration tests")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "tempdb.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

/// Objects named on the command line.
#[derive(Args, Debug, Default)]
struct ObjectArgs {
    /// Table name (`name` or `schema.name`); repeatable
    #[arg(long = "table")]
    tables: Vec<String>,

    /// View name; repeatable
    #[arg(long = "view")]
    views: Vec<String>,

    /// Stored procedure name; repeatable
    #[arg(long = "procedure")]
    procedures: Vec<String>,

    /// User-defined function name; repeatable
    #[arg(long = "function")]
    functions: Vec<String>,
}

impl ObjectArgs {
    fn into_plan(self) -> CopyPlan {
        CopyPlan {
            tables: self.tables,
            views: self.views,
            procedures: self.procedures,
            functions: self.functions,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate the target database
    Create,

    /// Drop the target database if it exists
    Delete,

    /// Copy objects, their dependencies and sample data into the target
    Copy {
        #[command(flatten)]
        objects: ObjectArgs,
    },

    /// Drop objects and everything that depends on them from the target
    Remove {
        #[command(flatten)]
        objects: ObjectArgs,
    },

    /// Create the target and copy the plan from the configuration file
    Run {
        /// Reuse an existing target database instead of recreating it
        #[arg(long)]
        no_create: bool,
    },

    /// Enable CLR integration on a server
    EnableClr {
        /// ADO connection string [default: the target server's master database]
        #[arg(long)]
        connection_string: Option<String>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, HarnessError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Create => {
            let mut db = TempDb::from_config(&config).await?;
            db.create().await?;
            println!("Created database {}", db.settings().target.database_name);
        }

        Commands::Delete => {
            let mut db = TempDb::from_config(&config).await?;
            db.delete().await?;
            println!("Deleted database {}", db.settings().target.database_name);
        }

        Commands::Copy { objects } => {
            let plan = require_objects(objects)?;
            let mut db = TempDb::from_config(&config).await?;
            let report = db.execute_plan(Operation::Copy, &plan).await?;
            print_report(&report, cli.output_json)?;
        }

        Commands::Remove { objects } => {
            let plan = require_objects(objects)?;
            let mut db = TempDb::from_config(&config).await?;
            let report = db.execute_plan(Operation::Delete, &plan).await?;
            print_report(&report, cli.output_json)?;
        }

        Commands::Run { no_create } => {
            let mut db = TempDb::from_config(&config).await?;
            if !no_create {
                db.create().await?;
            }
            let report = db.execute_plan(Operation::Copy, &config.plan).await?;
            print_report(&report, cli.output_json)?;
        }

        Commands::EnableClr { connection_string } => {
            let connection_string = match connection_string {
                Some(s) => s,
                None => {
                    let settings = config.resolve()?;
                    settings.target.connection_string("master")
                }
            };
            mssql_tempdb::enable_clr(&connection_string).await?;
            println!("CLR integration enabled");
        }

        Commands::HealthCheck => {
            let mut db = TempDb::from_config(&config).await?;
            db.ping().await?;

            let settings = db.settings();
            if cli.output_json {
                let result = serde_json::json!({
                    "healthy": true,
                    "source": settings.source.identity(&settings.source.database_name),
                    "target": settings.target.identity("master"),
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!("  Source ({}): OK", settings.source.database_name);
                println!("  Target server ({}): OK", settings.target.server_instance);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn require_objects(objects: ObjectArgs) -> Result<CopyPlan, HarnessError> {
    let plan = objects.into_plan();
    if plan.is_empty() {
        return Err(HarnessError::Config(
            "name at least one --table, --view, --procedure or --function".to_string(),
        ));
    }
    Ok(plan)
}

fn print_report(report: &PlanReport, as_json: bool) -> Result<(), HarnessError> {
    if as_json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    println!("\n{} completed!", capitalize(&report.operation.to_string()));
    println!("  Succeeded: {}", report.succeeded.len());
    for object in &report.succeeded {
        println!("    {}", object);
    }
    if !report.copied_tables.is_empty() {
        println!("  Tables with data: {}", report.copied_tables.len());
    }
    if !report.failed.is_empty() {
        println!("  Failed: {}", report.failed.len());
        for failed in &report.failed {
            println!("    {}: {}", failed.object, failed.error);
        }
    }
    Ok(())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
