use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod utils;

#[derive(Parser)]
#[command(name = "quarry-cmd")]
#[command(about = "A command-line tool for running queries over shard fixtures")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query over one shard and print the evaluated documents
    Query {
        /// Shard fixture (JSON) holding the field metadata and documents
        #[arg(short, long)]
        shard: String,

        /// Query expression (JSON)
        #[arg(short, long)]
        expression: String,

        /// Query options (JSON)
        #[arg(short, long)]
        options: Option<String>,

        /// Print only the documents that satisfy the expression
        #[arg(short, long)]
        matching_only: bool,

        /// Print the iterator tree instead of running the query
        #[arg(short, long)]
        plan: bool,

        /// Spill ivarator partitions to a temporary directory instead of memory
        #[arg(long)]
        spill_to_disk: bool,
    },
    /// Expand the regular expressions of a query against the global index
    Expand {
        /// Shard fixture (JSON) the global index is built from
        #[arg(short, long)]
        shard: String,

        /// Query expression (JSON)
        #[arg(short, long)]
        expression: String,

        /// Query options (JSON)
        #[arg(short, long)]
        options: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            shard,
            expression,
            options,
            matching_only,
            plan,
            spill_to_disk,
        } => commands::query::run(commands::query::QueryArgs {
            shard,
            expression,
            options,
            matching_only,
            plan,
            spill_to_disk,
        }),
        Commands::Expand {
            shard,
            expression,
            options,
        } => commands::expand::run(shard, expression, options),
    }
}
