//! sqlrow: expand and run SQL row templates from the command line.
//!
//! Records come from the configuration file (`sqlrow.toml`).
//!
//! # Usage
//!
//! ```bash
//! # Show the expanded statement and its bind order
//! sqlrow expand User "update users set {} where {}"
//!
//! # Show the columns of a record
//! sqlrow columns User
//!
//! # Run a statement
//! sqlrow exec User "insert into users ({}) values ({})" --set name=ann --set email=a@b.c
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use tracing_subscriber::EnvFilter;

use sqlrow::config::Config;
use sqlrow::prelude::*;
use sqlrow::scanner::{Scanner, TokenKind};

#[derive(Parser)]
#[command(name = "sqlrow")]
#[command(version)]
#[command(about = "Expand SQL templates against row records", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlrow expand User 'select {alias u} from users u where {pk,alias u}'
    sqlrow --dialect postgres expand User 'update users set {} where {}'
    sqlrow exec User 'delete from users where {}' --set id=7")]
struct Cli {
    /// Configuration file (default: ./sqlrow.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQL dialect, overriding the configuration
    #[arg(short, long, global = true)]
    dialect: Option<Dialect>,

    /// Naming convention, overriding the configuration
    #[arg(long, global = true)]
    convention: Option<Convention>,

    /// Database connection URL
    #[arg(long, env = "SQLROW_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a template and explain its binds
    Expand {
        /// Record name from the configuration
        record: String,
        /// SQL template
        template: String,
    },
    /// List the columns of a record
    Columns {
        record: String,
    },
    /// Show the tokens of a template
    Tokens {
        template: String,
    },
    /// Expand a template and execute it
    Exec {
        record: String,
        template: String,
        /// Column value, as column=value
        #[arg(short, long = "set")]
        set: Vec<String>,
        /// Value for a `?` or `$N` already in the template
        #[arg(short, long = "arg")]
        arg: Vec<String>,
        /// Don't execute, just show the statement and values
        #[arg(long)]
        dry_run: bool,
        /// Output format for result rows
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Show the supported dialects
    Dialects,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    if !verbose && std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let filter = if verbose {
        EnvFilter::new("sqlrow=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Configuration with command-line overrides applied.
struct Settings {
    config: Config,
    dialect: Dialect,
    convention: Convention,
    database_url: Option<String>,
}

impl Settings {
    fn load(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
        let database_url = cli.database_url.clone().or_else(|| config.database_url.clone());
        Ok(Self {
            dialect: cli
                .dialect
                .unwrap_or_else(|| config.dialect_for(database_url.as_deref())),
            convention: cli.convention.unwrap_or_else(|| config.convention()),
            database_url,
            config,
        })
    }

    fn model(&self, record: &str) -> Result<ColumnModel> {
        let shape = self.config.record_shape(record).with_context(|| {
            let known: Vec<&str> = self.config.record_names().collect();
            if known.is_empty() {
                "no records configured".to_string()
            } else {
                format!("configured records: {}", known.join(", "))
            }
        })?;
        Ok(ColumnModel::build(shape)?)
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Expand { record, template } => {
            let settings = Settings::load(cli)?;
            explain(&settings, record, template)
        }
        Commands::Columns { record } => {
            let settings = Settings::load(cli)?;
            show_columns(&settings, record)
        }
        Commands::Tokens { template } => {
            show_tokens(template);
            Ok(())
        }
        Commands::Exec {
            record,
            template,
            set,
            arg,
            dry_run,
            format,
        } => {
            let settings = Settings::load(cli)?;
            exec(&settings, record, template, set, arg, *dry_run, format).await
        }
        Commands::Dialects => {
            show_dialects();
            Ok(())
        }
    }
}

fn explain(settings: &Settings, record: &str, template: &str) -> Result<()> {
    let model = settings.model(record)?;
    let expansion = expand(template, &model, settings.convention, settings.dialect)?;

    println!("{} {}", "Template:".dimmed(), template.yellow());
    println!(
        "{} {} / {}",
        "Dialect:".dimmed(),
        settings.dialect.to_string().cyan(),
        settings.convention.to_string().cyan()
    );
    println!();
    println!("{}", "Expanded SQL:".green().bold());
    println!("  {}", expansion.sql.white());

    if !expansion.binds.is_empty() {
        println!();
        println!("{}", "Binds:".cyan());
        for (i, bind) in expansion.binds.iter().enumerate() {
            let source = match bind {
                Bind::Column(c) => model.columns()[*c].column_name(settings.convention),
                Bind::Argument(n) => format!("argument {}", n + 1),
            };
            println!("  {} = {}", settings.dialect.placeholder(i + 1), source.yellow());
        }
    }
    Ok(())
}

fn show_columns(settings: &Settings, record: &str) -> Result<()> {
    let model = settings.model(record)?;

    println!(
        "{:28} {:24} {}",
        "Column".white().bold(),
        "Field".white().bold(),
        "Flags".white().bold()
    );
    println!("{}", "─".repeat(70).dimmed());

    for column in model.columns() {
        let mut flags = Vec::new();
        if column.tag.primary_key {
            flags.push("pk");
        }
        if column.tag.auto_increment {
            flags.push("auto");
        }
        if column.tag.version {
            flags.push("version");
        }
        if column.tag.json {
            flags.push("json");
        }
        if column.tag.natural_key {
            flags.push("natural");
        }
        if column.tag.empty_null || column.nullable {
            flags.push("null");
        }
        println!(
            "{:28} {:24} {}",
            column.column_name(settings.convention).cyan(),
            column.path.to_string(),
            flags.join(",").dimmed()
        );
    }
    Ok(())
}

fn show_tokens(template: &str) {
    let scanner = Scanner::new(template).with_keywords(sqlrow::expand::TEMPLATE_KEYWORDS);
    for token in scanner {
        let kind = format!("{:<18}", token.kind.to_string());
        let kind = match token.kind {
            TokenKind::Whitespace => continue,
            TokenKind::Keyword => kind.magenta(),
            TokenKind::Illegal => kind.red().bold(),
            TokenKind::Placeholder => kind.yellow(),
            _ => kind.normal(),
        };
        println!("{:>5}  {} {:?}", token.offset, kind, token.text);
    }
}

/// Values for a configured record, keyed by column name.
struct ColumnValues {
    values: HashMap<String, Value>,
}

impl ColumnValues {
    fn parse(pairs: &[String]) -> Result<Self> {
        let mut values = HashMap::new();
        for pair in pairs {
            let Some((column, value)) = pair.split_once('=') else {
                bail!("expected column=value, got '{}'", pair);
            };
            values.insert(column.trim().to_string(), Value::infer(value));
        }
        Ok(Self { values })
    }
}

async fn exec(
    settings: &Settings,
    record: &str,
    template: &str,
    set: &[String],
    arg: &[String],
    dry_run: bool,
    format: &OutputFormat,
) -> Result<()> {
    let model = settings.model(record)?;
    let expansion = expand(template, &model, settings.convention, settings.dialect)?;
    let columns = ColumnValues::parse(set)?;
    let arguments: Vec<Value> = arg.iter().map(|a| Value::infer(a)).collect();
    let values = expansion
        .values(&model, settings.convention, &columns.values, &arguments)
        .context("use --set column=value for every bound column")?;

    let Some(url) = settings.database_url.as_deref().filter(|_| !dry_run) else {
        println!("{}", "Expanded SQL:".green().bold());
        println!("{}", expansion.sql.white());
        if !values.is_empty() {
            println!();
            println!("{}", "Values:".cyan());
            for (i, value) in values.iter().enumerate() {
                println!("  {} = {}", settings.dialect.placeholder(i + 1), value.to_string().yellow());
            }
        }
        if settings.database_url.is_none() && !dry_run {
            println!();
            println!(
                "{}",
                "⚠ No database URL. Use --database-url or set SQLROW_DATABASE_URL".yellow()
            );
        }
        return Ok(());
    };

    let schema = Schema::new(settings.dialect, settings.convention);
    let db = Db::with_schema(url, schema.into())
        .await
        .with_context(|| format!("connecting to {}", url))?;

    let is_query = template.trim_start().to_ascii_lowercase().starts_with("select");
    if is_query {
        let rows = db.fetch_maps(&expansion.sql, &values).await?;
        format_output(&rows, format);
    } else {
        let affected = db.execute(&expansion.sql, &values).await?;
        println!("{} {} rows affected", "✓".green(), affected);
    }
    Ok(())
}

fn format_output(results: &[HashMap<String, serde_json::Value>], format: &OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            let mut columns: Vec<&String> = results[0].keys().collect();
            columns.sort();

            let mut widths: HashMap<&String, usize> = columns.iter().map(|c| (*c, c.len())).collect();
            for row in results {
                for (col, val) in row {
                    let len = val_to_string(val).len();
                    if let Some(w) = widths.get_mut(col) {
                        *w = (*w).max(len);
                    }
                }
            }

            let header: Vec<String> = columns
                .iter()
                .map(|c| format!("{:width$}", c, width = widths[*c]))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = columns.iter().map(|c| "─".repeat(widths[*c])).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let val = row.get(*c).map(val_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = widths[*c])
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", results.len().to_string().cyan());
        }
    }
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

fn show_dialects() {
    println!(
        "{:10} {:10} {}",
        "Dialect".white().bold(),
        "Quote".white().bold(),
        "Placeholders".white().bold()
    );
    println!("{}", "─".repeat(40).dimmed());

    for dialect in Dialect::all() {
        let placeholders: Vec<String> = (1..=3).map(|n| dialect.placeholder(n)).collect();
        println!(
            "{:10} {:10} {}",
            dialect.name().cyan().bold(),
            dialect.quote("col"),
            placeholders.join(", ").dimmed()
        );
    }
}
