//! siftq: filter JSON records with sift queries.

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod predicates;

use commands::{OutputFormat, QueryArgs};

#[derive(Parser)]
#[command(name = "siftq")]
#[command(about = "Filter JSON records with a small boolean query language")]
#[command(version)]
struct Cli {
    /// Config file (default: $SIFT_CONFIG or the user config directory)
    #[arg(long = "config", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter a JSON array of records and print the matches
    #[command(visible_alias = "f")]
    Filter {
        #[command(flatten)]
        query: QueryFlags,

        /// Output format: json or pretty
        #[arg(long = "format", default_value = "json")]
        format: String,
    },

    /// Show the normalized query and its group tree
    Explain {
        #[command(flatten)]
        query: QueryFlags,
    },

    /// List registered predicates
    Predicates,
}

#[derive(Args)]
struct QueryFlags {
    /// Query text (e.g. "type equals ? and age gt 2")
    query: String,

    /// JSON file holding an array of records (reads stdin if not provided)
    file: Option<String>,

    /// Value for the next `?` marker (parsed as JSON, else a string)
    #[arg(short = 'b', long = "bind")]
    bind: Vec<String>,

    /// Named binding for `:KEY`, or a reserved option key
    #[arg(short = 'n', long = "named", value_name = "KEY=VALUE")]
    named: Vec<String>,

    /// Return only the first match
    #[arg(long = "first")]
    first: bool,

    /// Project matched records onto a field (repeat for several)
    #[arg(long = "pluck", value_name = "FIELD")]
    pluck: Vec<String>,

    /// Value returned when nothing matches (parsed as JSON)
    #[arg(long = "default", value_name = "JSON")]
    default: Option<String>,

    /// Report evaluation time on stderr
    #[arg(long = "debug")]
    debug: bool,
}

impl QueryFlags {
    fn into_args(self, config: Option<String>) -> QueryArgs {
        QueryArgs {
            query: self.query,
            file: self.file,
            bind: self.bind,
            named: self.named,
            first: self.first,
            pluck: self.pluck,
            default: self.default,
            debug: self.debug,
            config,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SIFT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Filter { query, format } => OutputFormat::parse(&format)
            .and_then(|format| commands::filter(&query.into_args(cli.config), format)),
        Commands::Explain { query } => commands::explain(&query.into_args(cli.config)),
        Commands::Predicates => commands::predicates(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
