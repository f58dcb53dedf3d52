//! # figtree demo application
//!
//! A sample CLI that resolves a directory of YAML fragments and prints what
//! [figtree](https://docs.rs/figtree) computes. This is **not** a real app;
//! it exists to demonstrate and manually verify the library.
//!
//! ## Running
//!
//! Point it at any directory of fragments (try a root `config.yaml` with a
//! `defaults` list plus a few `group/option.yaml` files):
//!
//! ```sh
//! cargo run --example figtree_demo -- --dir ./my-config show
//! ```
//!
//! ## Features demonstrated
//!
//! | Feature     | How to exercise it                                              |
//! |-------------|-----------------------------------------------------------------|
//! | Composition | `figtree_demo -- --dir ./my-config show`                        |
//! | Overrides   | `... --overrides 'db.port=5432 +app.motto=hi ~app.debug' show`  |
//! | Provenance  | `... show --origins`                                            |
//! | Merge plan  | `... plan`                                                      |
//! | Staleness   | break a referenced fragment, then `show` again                  |
//! | Snapshots   | `... snap capture baseline`, `snap list`, `snap restore 1`      |
//! | Logging     | `RUST_LOG=figtree=trace ... show`                               |

mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use figtree::Session;

// ---------------------------------------------------------------------------
// CLI definitions
// ---------------------------------------------------------------------------

/// figtree demo: resolve layered YAML fragments and inspect the result.
#[derive(Parser, Debug)]
#[command(name = "figtree-demo")]
struct Cli {
    /// Directory holding the YAML fragments.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Root fragment, relative to --dir. Auto-detected when omitted.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Override tokens applied after composition.
    #[arg(long, default_value = "")]
    overrides: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve and print the merged tree.
    Show {
        /// Annotate every leaf with the layer that produced it.
        #[arg(long)]
        origins: bool,
    },
    /// Print the merge plan without resolving further.
    Plan,
    /// Manage snapshots of the fragment set.
    Snap {
        #[command(subcommand)]
        action: SnapAction,
    },
}

#[derive(Subcommand, Debug)]
enum SnapAction {
    /// Capture the current fragments under a tag.
    Capture {
        #[arg(default_value = "manual")]
        tag: String,
    },
    /// List captured snapshots.
    List,
    /// Swap a snapshot back in (a pre-restore backup is taken first).
    Restore { id: u64 },
    /// Delete a snapshot by id.
    Delete { id: u64 },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let mut session = match Session::open(&cli.dir) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("Failed to load fragments:\n{err}");
            return ExitCode::FAILURE;
        }
    };
    if cli.root.is_some() {
        session.set_root(cli.root.clone());
    }
    session.set_override_line(cli.overrides.clone());

    match cli.command {
        Commands::Show { origins } => {
            let result = session.resolve_now();
            render::print_diagnostics(&result);
            if origins {
                render::print_with_origins(&result);
            } else {
                render::print_tree(&result);
            }
            if result.fresh {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Plan => {
            let result = session.resolve_now();
            render::print_diagnostics(&result);
            render::print_plan(&result);
            ExitCode::SUCCESS
        }
        Commands::Snap { action } => run_snap(&mut session, action),
    }
}

fn run_snap(session: &mut Session, action: SnapAction) -> ExitCode {
    let outcome = match action {
        SnapAction::Capture { tag } => session.capture_snapshot(&tag).map(|meta| {
            println!("captured #{} ({})", meta.id, meta.tag);
        }),
        SnapAction::List => session.list_snapshots().map(|snapshots| {
            if snapshots.is_empty() {
                println!("no snapshots");
            }
            for meta in snapshots {
                println!(
                    "#{:<4} {:<24} {}  {} files",
                    meta.id,
                    meta.tag,
                    meta.created_at.format("%Y-%m-%d %H:%M:%S"),
                    meta.files.len()
                );
            }
        }),
        SnapAction::Restore { id } => session.restore_snapshot(id).map(|outcome| {
            println!(
                "restored #{} (current state backed up as #{})",
                outcome.restored.id, outcome.backup.id
            );
        }),
        SnapAction::Delete { id } => session.delete_snapshot(id).map(|()| {
            println!("deleted #{id}");
        }),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Snapshot error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}
