//! Command-line front end over `zinc-storage` (spec.md §6: "CLI (exposed
//! by the host application over the core): commands to create/delete
//! notebooks and pages, render a note to markdown or HTML, and dump the
//! notebook/page tree as indented text or JSON.").
//!
//! Grounded in `examples/original_source/src/ui/cli/{list_tree,mutations,note}.cpp`:
//! "notebook" there is a `Workspace` here and "note" is a `Page`; the
//! command surface and exit-code contract (0 success, 1 reported error)
//! are carried over unchanged.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use zinc_cli::commands;
use zinc_storage::Store;

#[derive(Parser)]
#[command(name = "zinc", about = "zinc-sync notebook/page command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workspace (notebook).
    CreateWorkspace {
        #[arg(long)]
        name: String,
    },
    /// Delete a workspace and, optionally, its pages.
    DeleteWorkspace {
        #[arg(long)]
        id: String,
        #[arg(long)]
        delete_pages: bool,
    },
    /// Create a page (note) in a workspace, optionally under a parent page.
    CreatePage {
        #[arg(long)]
        title: String,
        #[arg(long)]
        workspace: Option<String>,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Delete a page.
    DeletePage {
        #[arg(long)]
        id: String,
    },
    /// Render a page's blocks to markdown or HTML.
    Note {
        #[arg(long)]
        id: String,
        #[arg(long)]
        html: bool,
    },
    /// Dump the workspace/page tree as indented text or JSON.
    ListTree {
        #[arg(long)]
        workspace: Option<String>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        include_ids: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();

    let store = match Store::open(zinc_storage::config::db_path()).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("error: {}", err.message);
            return ExitCode::FAILURE;
        }
    };

    tracing::debug!(command = ?std::env::args().nth(1), "dispatching zinc-cli command");

    let result = match cli.command {
        Commands::CreateWorkspace { name } => commands::workspace::create(&store, name).await,
        Commands::DeleteWorkspace { id, delete_pages } => {
            commands::workspace::delete(&store, id, delete_pages).await
        }
        Commands::CreatePage {
            title,
            workspace,
            parent,
        } => commands::page::create(&store, title, workspace, parent).await,
        Commands::DeletePage { id } => commands::page::delete(&store, id).await,
        Commands::Note { id, html } => commands::note::render(&store, id, html).await,
        Commands::ListTree {
            workspace,
            json,
            include_ids,
        } => commands::tree::list(&store, workspace, json, include_ids).await,
    };

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {}", err.message);
            ExitCode::FAILURE
        }
    }
}
