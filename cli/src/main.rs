mod handlers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tsugite_cli",
    about = "Inspect safetensors checkpoint directories"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every tensor in the checkpoint with its shape and data type
    List {
        /// Checkpoint directory
        path: PathBuf,
        /// Only show keys containing this substring
        #[arg(long)]
        filter: Option<String>,
    },
    /// Aggregate statistics: files, tensors, bytes per data type
    Summary {
        /// Checkpoint directory
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::List {
            path,
            filter,
        } => handlers::list::run(&path, filter.as_deref()),
        Command::Summary {
            path,
        } => handlers::summary::run(&path),
    };
    if let Err(error) = result {
        eprintln!(
            "{} {}",
            console::style("error:").red().bold(),
            error
        );
        std::process::exit(1);
    }
}
