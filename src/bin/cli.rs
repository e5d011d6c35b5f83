//! Binary entry point for the wasqlite command-line tool.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;
#[path = "cli/ui.rs"]
mod ui;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use base64::Engine as _;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde_json::{json, Value as Json};
use tracing_subscriber::{fmt, EnvFilter};
use wasqlite::{BackendKind, Database, OpenOptions, Sqlite, Value};

use config::CliConfig;
use ui::{format_duration, Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "wasqlite",
    version,
    about = "Run SQL against a sandboxed WebAssembly build of SQLite",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "WASQLITE_CONFIG",
        value_name = "FILE",
        help = "Engine config file (TOML)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for query results"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = Theme::Auto,
        help = "Color theme for text output"
    )]
    theme: Theme,

    #[arg(long, global = true, value_enum, help = "Override the default storage backend")]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Run SQL and print the rows it returns")]
    Exec {
        #[arg(value_name = "WASM")]
        wasm: PathBuf,
        #[arg(value_name = "DB")]
        db: String,
        #[arg(value_name = "SQL")]
        sql: String,
    },

    #[command(about = "Write a serialized snapshot of a database")]
    Dump {
        #[arg(value_name = "WASM")]
        wasm: PathBuf,
        #[arg(value_name = "DB")]
        db: String,
        #[arg(value_name = "OUT")]
        out: PathBuf,
    },

    #[command(about = "Print the engine's library version")]
    Version {
        #[arg(value_name = "WASM")]
        wasm: PathBuf,
    },

    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum BackendArg {
    Memory,
    Local,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Memory => BackendKind::Memory,
            BackendArg::Local => BackendKind::Local,
        }
    }
}

/// Rows of one statement that produced columns.
struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[tokio::main]
async fn main() {
    install_tracing_subscriber();
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn install_tracing_subscriber() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wasqlite=info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    });
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let ui = Ui::new(cli.theme, cli.format != OutputFormat::Text);

    if let Command::Completions { shell } = cli.command {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "wasqlite", &mut io::stdout());
        return Ok(());
    }

    let mut config = CliConfig::load(cli.config.clone())?;
    if let Some(backend) = cli.backend {
        config.set_backend(backend.into());
    }
    if let Some(path) = config.path() {
        tracing::debug!(path = %path.display(), "loaded CLI config");
    }

    match cli.command {
        Command::Exec { wasm, db, sql } => {
            let sqlite = instantiate(&ui, &wasm, &config).await?;
            let mut conn = sqlite
                .open(&db, OpenOptions::new())
                .with_context(|| format!("opening {db}"))?;
            let sets = run_sql(&conn, &sql)?;
            conn.close()?;
            emit(&ui, cli.format, &sets)?;
        }
        Command::Dump { wasm, db, out } => {
            let sqlite = instantiate(&ui, &wasm, &config).await?;
            let mut conn = sqlite
                .open(&db, OpenOptions::new().read_only())
                .with_context(|| format!("opening {db}"))?;
            let snapshot = conn.serialize()?.unwrap_or_default();
            conn.close()?;
            std::fs::write(&out, &snapshot)
                .with_context(|| format!("writing {}", out.display()))?;
            ui.success(&format!("wrote {} bytes to {}", snapshot.len(), out.display()));
        }
        Command::Version { wasm } => {
            let sqlite = instantiate(&ui, &wasm, &config).await?;
            println!("{}", sqlite.version()?);
        }
        Command::Completions { .. } => {}
    }

    Ok(())
}

async fn instantiate(ui: &Ui, wasm: &Path, config: &CliConfig) -> Result<Sqlite> {
    let task = ui.task(format!("compiling {}", wasm.display()));
    let module = Sqlite::load_module_async(wasm, config.engine())
        .await
        .with_context(|| format!("loading {}", wasm.display()))?;
    let elapsed = task.finish();
    ui.info(&format!("compiled {} in {}", wasm.display(), format_duration(elapsed)));
    Ok(Sqlite::instantiate(&module, config.engine())?)
}

/// Runs each statement in turn, keeping the rows of those that have
/// result columns.
fn run_sql(db: &Database, sql: &str) -> Result<Vec<ResultSet>> {
    let mut sets = Vec::new();
    let mut remaining = sql.to_owned();
    while !remaining.trim().is_empty() {
        let Some(mut stmt) = db.prepare(&remaining)? else {
            break;
        };
        let count = stmt.column_count()?;
        let columns = (0..count)
            .map(|i| stmt.column_name(i))
            .collect::<wasqlite::Result<Vec<_>>>()?;
        let rows = stmt.query(&[])?.collect::<wasqlite::Result<Vec<_>>>()?;
        let tail = stmt.tail().unwrap_or_default().to_owned();
        stmt.finalize()?;
        if !columns.is_empty() {
            sets.push(ResultSet { columns, rows });
        }
        remaining = tail;
    }
    Ok(sets)
}

fn emit(ui: &Ui, format: OutputFormat, sets: &[ResultSet]) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for (i, set) in sets.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                let rows: Vec<Vec<String>> = set
                    .rows
                    .iter()
                    .map(|row| row.iter().map(text_cell).collect())
                    .collect();
                ui.table(&set.columns, &rows);
            }
        }
        OutputFormat::Json => {
            let payload: Vec<Json> = sets
                .iter()
                .map(|set| {
                    let rows: Vec<Json> = set
                        .rows
                        .iter()
                        .map(|row| Json::Array(row.iter().map(json_cell).collect()))
                        .collect();
                    json!({ "columns": set.columns, "rows": rows })
                })
                .collect();
            let mut out = io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, &payload)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(io::stdout());
            for set in sets {
                writer.write_record(&set.columns)?;
                for row in &set.rows {
                    writer.write_record(row.iter().map(text_cell))?;
                }
            }
            writer.flush()?;
        }
    }
    Ok(())
}

fn text_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Blob(bytes) => hex::encode(bytes),
        other => other.to_string(),
    }
}

fn json_cell(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Integer(v) => json!(v),
        Value::Float(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
        Value::Text(v) => Json::String(v.clone()),
        Value::Blob(v) => Json::String(base64::engine::general_purpose::STANDARD.encode(v)),
    }
}
