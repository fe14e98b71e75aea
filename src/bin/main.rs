//! Vista CLI - Compile data-view queries offline
//!
//! Usage:
//!   vista compile --view <view.json> --query <query.json> [--indices <a,b>]
//!   vista validate --view <view.json>
//!
//! Examples:
//!   vista compile --view demos/access_logs.json --query demos/errors.json
//!   vista compile --view demos/merged.json --query demos/page.json --indices ds-logs-2024.01.01
//!   vista validate --view demos/merged.json

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vista::condition::BasicConditionCompiler;
use vista::config::Settings;
use vista::dsl::build_dsl;
use vista::model::{DataView, QueryType, ViewQuery};
use vista::routing::{base_type_routes, route_indices, static_routes, IndexRoutes};
use vista::sql::compose_request_sql;
use vista::validation::validate_view;
use vista::ViewResult;

#[derive(Parser)]
#[command(name = "vista")]
#[command(about = "Vista - Compile data-view queries to search DSL or federated SQL")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to VISTA_CONFIG, ./vista.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query against a view and print the backend request
    Compile {
        /// Path to the view definition (JSON)
        #[arg(long)]
        view: PathBuf,

        /// Path to the query (JSON)
        #[arg(long)]
        query: PathBuf,

        /// Physical indices to route, for index-based views
        #[arg(long, value_delimiter = ',')]
        indices: Vec<String>,
    },

    /// Validate a view definition without compiling a query
    Validate {
        /// Path to the view definition (JSON)
        #[arg(long)]
        view: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compile {
            view,
            query,
            indices,
        } => cmd_compile(&settings, &view, &query, &indices),
        Commands::Validate { view } => cmd_validate(&settings, &view),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ExitCode> {
    let source = fs::read_to_string(path).map_err(|e| {
        eprintln!("Error reading file '{}': {}", path.display(), e);
        ExitCode::FAILURE
    })?;
    serde_json::from_str(&source).map_err(|e| {
        eprintln!("Error parsing '{}': {}", path.display(), e);
        ExitCode::FAILURE
    })
}

fn cmd_compile(settings: &Settings, view_path: &Path, query_path: &Path, indices: &[String]) -> ExitCode {
    let mut view: DataView = match read_json(view_path) {
        Ok(v) => v,
        Err(code) => return code,
    };
    let query: ViewQuery = match read_json(query_path) {
        Ok(q) => q,
        Err(code) => return code,
    };

    match compile(settings, &mut view, &query, indices) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error [{:?}]: {}", e.class(), e);
            ExitCode::FAILURE
        }
    }
}

fn compile(
    settings: &Settings,
    view: &mut DataView,
    query: &ViewQuery,
    indices: &[String],
) -> ViewResult<String> {
    let compiler = BasicConditionCompiler;
    validate_view(view, &settings.query)?;
    let pagination = query.pagination(view.query_type)?;

    if view.query_type == QueryType::Sql {
        let request = compose_request_sql(view, query, &pagination, &compiler, &settings.query)?;
        let mut out = request.sql;
        if let Some(count) = request.count_sql {
            out.push_str("\n-- count\n");
            out.push_str(&count);
        }
        return Ok(out);
    }

    let routes = if view.query_type == QueryType::IndexBase && !indices.is_empty() {
        let by_node = route_indices(indices, &base_type_routes(view))?;
        IndexRoutes {
            indices: indices.to_vec(),
            by_node,
        }
    } else {
        static_routes(view)
    };
    let compiled = build_dsl(view, query, &pagination, &routes.by_node, &compiler, &settings.query)?;
    serde_json::to_string_pretty(&compiled.query)
        .map_err(|e| vista::ViewError::compile(format!("failed to render DSL: {}", e)))
}

fn cmd_validate(settings: &Settings, view_path: &Path) -> ExitCode {
    let mut view: DataView = match read_json(view_path) {
        Ok(v) => v,
        Err(code) => return code,
    };

    match validate_view(&mut view, &settings.query) {
        Ok(()) => {
            println!(
                "OK: {} is valid ({} fields, {} scope nodes)",
                view_path.display(),
                view.fields.len(),
                view.data_scope.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Validation error: {}", e);
            ExitCode::FAILURE
        }
    }
}
