//! wfquery CLI: query a workflow provenance store from the command line.
//!
//! Usage:
//!   wfquery import <dump.json> [--db path]
//!   wfquery nodes [--resource nodes] [--id ID] [--page N] ... [--db path]
//!   wfquery tree <id> [--in-limit N] [--out-limit N]

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use wfquery::{
    default_db_path, ContentArgs, ContentSelector, Dump, Filter, FilterSet, NodeRequest, OpenStore,
    Resource, RestApi, ResultType, ServiceConfig, SqliteStore,
};

#[derive(Parser)]
#[command(
    name = "wfquery",
    version,
    about = "Query translation and provenance views over a workflow graph store"
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to a YAML service configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load users, nodes, links and comments from a JSON dump
    Import {
        /// Dump file
        path: PathBuf,
    },
    /// List nodes of a resource, or one node's content
    Nodes {
        #[arg(long, default_value = "nodes")]
        resource: Resource,
        /// Primary key or UUID prefix
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        perpage: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        /// `field=value`, `field!=value`, `field>value`, `field=like=pattern`, ...
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        full_type: Option<String>,
        /// `field` or `-field` for descending order
        #[arg(long = "order")]
        orders: Vec<String>,
        /// Fields to return; `**` returns whole records
        #[arg(long = "project")]
        projections: Vec<String>,
        #[arg(long, default_value = "default")]
        result: ResultType,
        #[arg(long, default_value = "default")]
        content: ContentSelector,
        /// Repository path for repo and retrieved views
        #[arg(long)]
        path: Option<String>,
        /// Download format
        #[arg(long)]
        format: Option<String>,
        #[arg(long, num_args = 1..)]
        include: Option<Vec<String>>,
        #[arg(long, num_args = 1..)]
        exclude: Option<Vec<String>>,
    },
    /// Incoming and outgoing links of one node
    Tree {
        id: String,
        #[arg(long)]
        in_limit: Option<usize>,
        #[arg(long)]
        out_limit: Option<usize>,
    },
    /// Namespace tree of the full types in the store
    FullTypes,
    /// Node types of a resource grouped by their first segment
    Types {
        #[arg(long, default_value = "nodes")]
        resource: Resource,
    },
    /// Node creation statistics
    Statistics {
        /// Restrict to one user id
        #[arg(long)]
        user: Option<i64>,
    },
    /// Export formats per subtype
    DownloadFormats,
    /// Projectable node fields
    Schema,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<ServiceConfig, String> {
    match path {
        Some(path) => ServiceConfig::load(&path)
            .map_err(|e| format!("Failed to load config '{}': {}", path.display(), e)),
        None => Ok(ServiceConfig::default()),
    }
}

fn open_api(db: Option<PathBuf>, config: ServiceConfig) -> Result<RestApi, String> {
    let db_path = db
        .or_else(|| config.db_path.clone())
        .unwrap_or_else(default_db_path);
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir).ok();
    }
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    RestApi::new(Arc::new(store), config).map_err(|e| e.to_string())
}

/// Parse one `--filter` argument
fn parse_filter(spec: &str) -> Result<(String, Filter), String> {
    const OPERATORS: [&str; 7] = ["=like=", "!=", ">=", "<=", "=", ">", "<"];
    let (at, op) = OPERATORS
        .iter()
        .filter_map(|op| spec.find(op).map(|at| (at, *op)))
        .min_by_key(|(at, op)| (*at, std::cmp::Reverse(op.len())))
        .ok_or_else(|| format!("filter '{}' has no operator", spec))?;
    let field = spec[..at].trim();
    if field.is_empty() {
        return Err(format!("filter '{}' has no field", spec));
    }
    let raw = spec[at + op.len()..].trim();
    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let filter = match op {
        "=like=" => Filter::Like(raw.to_string()),
        "!=" => Filter::Ne(value),
        ">=" => Filter::Ge(value),
        "<=" => Filter::Le(value),
        ">" => Filter::Gt(value),
        "<" => Filter::Lt(value),
        _ => Filter::Eq(value),
    };
    Ok((field.to_string(), filter))
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn report<T: Serialize, E: std::fmt::Display>(result: Result<T, E>) -> i32 {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_import(api: &RestApi, path: &PathBuf) -> i32 {
    let dump = match Dump::read(path) {
        Ok(dump) => dump,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", path.display(), e);
            return 1;
        }
    };
    match dump.load_into(api.store()) {
        Ok(summary) => {
            println!(
                "Imported {} users, {} nodes, {} links, {} comments",
                summary.users, summary.nodes, summary.links, summary.comments
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let api = match load_config(cli.config).and_then(|config| open_api(cli.db, config)) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Import { path } => cmd_import(&api, &path),
        Commands::Nodes {
            resource,
            id,
            page,
            perpage,
            limit,
            offset,
            filters,
            full_type,
            orders,
            projections,
            result,
            content,
            path,
            format,
            include,
            exclude,
        } => {
            let mut filter_set = FilterSet::new();
            let mut bad = None;
            for spec in &filters {
                match parse_filter(spec) {
                    Ok((field, filter)) => filter_set.push(field, filter),
                    Err(e) => bad = Some(e),
                }
            }
            match bad {
                Some(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
                None => {
                    let request = NodeRequest {
                        resource,
                        id,
                        page,
                        perpage,
                        limit,
                        offset,
                        filters: filter_set,
                        full_type,
                        orders,
                        projections,
                        result,
                        content,
                        content_args: ContentArgs {
                            include,
                            exclude,
                            path,
                            format,
                        },
                    };
                    report(api.get_nodes(&request))
                }
            }
        }
        Commands::Tree { id, in_limit, out_limit } => report(api.get_tree(&id, in_limit, out_limit)),
        Commands::FullTypes => report(api.full_types()),
        Commands::Types { resource } => report(api.types(resource)),
        Commands::Statistics { user } => report(api.statistics(user)),
        Commands::DownloadFormats => print_json(&api.download_formats()),
        Commands::Schema => print_json(&api.schema()),
    };
    std::process::exit(code);
}
