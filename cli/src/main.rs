//! triplegate CLI: command-line access to any triplegate model
//!
//! Opens a local backend (`--backend memory|sqlite|sparql`) or connects to
//! a running `triplegate-server` (`--host`/`--port`).

use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use triplegate::protocol::{ClientModel, DEFAULT_PORT};
use triplegate::serialization::{parse_reader, serialize, RdfSerialization};
use triplegate::{BackendRegistry, BackendSettings, Model, Node, QueryLanguage, Statement};

#[derive(Parser)]
#[command(name = "triplegate", version, about = "triplegate RDF access CLI")]
struct Cli {
    /// Local backend to open when no --host is given
    #[arg(long, default_value = "memory", global = true, env = "TRIPLEGATE_BACKEND")]
    backend: String,

    /// Database file for the sqlite backend
    #[arg(long, global = true, env = "TRIPLEGATE_PATH")]
    path: Option<PathBuf>,

    /// Endpoint URL for the sparql backend
    #[arg(long, global = true, env = "TRIPLEGATE_ENDPOINT")]
    endpoint: Option<String>,

    /// Connect to a triplegate server instead of opening a backend
    #[arg(long, global = true, env = "TRIPLEGATE_HOST")]
    host: Option<String>,

    #[arg(long, default_value_t = DEFAULT_PORT, global = true)]
    port: u16,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List statements matching a pattern of N3 terms; omitted parts match anything
    List {
        #[arg(long, short)]
        subject: Option<String>,
        #[arg(long, short)]
        predicate: Option<String>,
        #[arg(long, short)]
        object: Option<String>,
        #[arg(long, short)]
        context: Option<String>,
    },
    /// List the named contexts
    Contexts,
    /// Run a query
    Query {
        query: String,
        /// sparql, sql, or a backend-specific language such as text
        #[arg(long, default_value = "sparql")]
        language: String,
    },
    /// Add one statement given as N3 terms
    Add {
        subject: String,
        predicate: String,
        object: String,
        #[arg(long, short)]
        context: Option<String>,
    },
    /// Remove every statement matching a pattern of N3 terms
    Remove {
        #[arg(long, short)]
        subject: Option<String>,
        #[arg(long, short)]
        predicate: Option<String>,
        #[arg(long, short)]
        object: Option<String>,
        #[arg(long, short)]
        context: Option<String>,
    },
    /// Count the statements
    Count,
    /// Load a document; the format follows the file extension unless given
    Import {
        file: PathBuf,
        #[arg(long)]
        rdf_format: Option<RdfSerialization>,
        #[arg(long)]
        base: Option<String>,
    },
    /// Write every statement as a document to a file or stdout
    Export {
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "nquads")]
        rdf_format: RdfSerialization,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn open_model(cli: &Cli) -> CliResult<Arc<dyn Model>> {
    if let Some(host) = &cli.host {
        let model = ClientModel::connect(&format!("{}:{}", host, cli.port))?;
        return Ok(Arc::new(model));
    }
    let settings = BackendSettings {
        storage_path: cli.path.clone(),
        endpoint_url: cli.endpoint.clone(),
        ..BackendSettings::default()
    };
    Ok(BackendRegistry::with_defaults().create_model(&cli.backend, &settings)?)
}

fn term(text: &Option<String>) -> CliResult<Node> {
    match text {
        Some(text) => Ok(Node::from_n3(text)?),
        None => Ok(Node::Empty),
    }
}

fn pattern(
    subject: &Option<String>,
    predicate: &Option<String>,
    object: &Option<String>,
    context: &Option<String>,
) -> CliResult<Statement> {
    Ok(Statement::new_quad(
        term(subject)?,
        term(predicate)?,
        term(object)?,
        term(context)?,
    ))
}

fn run(cli: Cli) -> CliResult<()> {
    let model = open_model(&cli)?;

    match &cli.command {
        Commands::List {
            subject,
            predicate,
            object,
            context,
        } => {
            let mut it = model.list_statements(&pattern(subject, predicate, object, context)?)?;
            let statements = it.all_statements();
            let error = it.last_error();
            it.close();
            if let Some(e) = error {
                return Err(e.into());
            }
            print_statements(&statements, &cli.format);
        }
        Commands::Contexts => {
            let mut it = model.list_contexts()?;
            let contexts = it.all_nodes();
            it.close();
            let rows: Vec<Vec<String>> = contexts.iter().map(|c| vec![c.to_n3()]).collect();
            print_rows(&["context".to_string()], &rows, &cli.format);
        }
        Commands::Query { query, language } => {
            let language: QueryLanguage = language.parse()?;
            run_query(model.as_ref(), query, &language, &cli.format)?;
        }
        Commands::Add {
            subject,
            predicate,
            object,
            context,
        } => {
            let statement = pattern(
                &Some(subject.clone()),
                &Some(predicate.clone()),
                &Some(object.clone()),
                context,
            )?;
            model.add_statement(&statement)?;
            println!("added {}", statement);
        }
        Commands::Remove {
            subject,
            predicate,
            object,
            context,
        } => {
            model.remove_all_statements(&pattern(subject, predicate, object, context)?)?;
            println!("removed");
        }
        Commands::Count => {
            let count = model.statement_count()?;
            match cli.format {
                OutputFormat::Json => println!("{}", json!({ "count": count })),
                OutputFormat::Table => println!("{} statement(s)", count),
            }
        }
        Commands::Import { file, rdf_format, base } => {
            let format = rdf_format
                .or_else(|| RdfSerialization::from_path(file))
                .ok_or_else(|| format!("cannot tell the format of {}; pass --rdf-format", file.display()))?;
            let reader = BufReader::new(File::open(file)?);
            let mut it = parse_reader(reader, format, base.as_deref())?;
            let mut count = 0usize;
            while it.next() {
                model.add_statement(&it.current())?;
                count += 1;
            }
            let error = it.last_error();
            it.close();
            if let Some(e) = error {
                return Err(e.into());
            }
            println!("imported {} statement(s) from {}", count, file.display());
        }
        Commands::Export { output, rdf_format } => {
            let mut it = model.list_statements(&Statement::any())?;
            let count = match output {
                Some(path) => serialize(&mut it, BufWriter::new(File::create(path)?), *rdf_format)?,
                None => {
                    let stdout = io::stdout();
                    let count = serialize(&mut it, stdout.lock(), *rdf_format)?;
                    stdout.lock().flush()?;
                    count
                }
            };
            it.close();
            eprintln!("exported {} statement(s)", count);
        }
    }

    Ok(())
}

fn run_query(model: &dyn Model, query: &str, language: &QueryLanguage, format: &OutputFormat) -> CliResult<()> {
    let mut result = model.execute_query(query, language)?;

    if result.is_bool() {
        let value = result.bool_value();
        result.close();
        match format {
            OutputFormat::Json => println!("{}", json!({ "boolean": value })),
            OutputFormat::Table => println!("{}", value),
        }
        return Ok(());
    }

    if result.is_graph() {
        let statements = result.all_statements();
        let error = result.last_error();
        result.close();
        if let Some(e) = error {
            return Err(e.into());
        }
        print_statements(&statements, format);
        return Ok(());
    }

    let names = result.binding_names();
    let mut rows = Vec::new();
    while result.next() {
        rows.push(names.iter().map(|name| result.binding(name).to_n3()).collect::<Vec<_>>());
    }
    let error = result.last_error();
    result.close();
    if let Some(e) = error {
        return Err(e.into());
    }
    print_rows(&names, &rows, format);
    Ok(())
}

fn print_statements(statements: &[Statement], format: &OutputFormat) {
    let header = ["subject", "predicate", "object", "context"].map(String::from);
    let rows: Vec<Vec<String>> = statements
        .iter()
        .map(|st| {
            vec![
                st.subject.to_n3(),
                st.predicate.to_n3(),
                st.object.to_n3(),
                st.context.to_n3(),
            ]
        })
        .collect();
    print_rows(&header, &rows, format);
}

fn print_rows(header: &[String], rows: &[Vec<String>], format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            let records: Vec<Value> = rows
                .iter()
                .map(|row| {
                    let record: serde_json::Map<String, Value> = header
                        .iter()
                        .zip(row)
                        .filter(|(_, cell)| !cell.is_empty())
                        .map(|(name, cell)| (name.clone(), Value::String(cell.clone())))
                        .collect();
                    Value::Object(record)
                })
                .collect();
            println!("{}", json!({ "columns": header, "rows": records }));
        }
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("(no results)");
                return;
            }

            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(header);
            for row in rows {
                table.add_row(row);
            }

            println!("{}", table);
            println!("{} row(s)", rows.len());
        }
    }
}
