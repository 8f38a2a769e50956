#![forbid(unsafe_code)]

mod cmd;
mod output;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use drawer_core::config::{self, DrawerConfig};
use drawer_core::Session;
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "drw: durable canvases for a browser drawing app",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Config file to use instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep the canvas store under this directory.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.json)
    }

    fn load_config(&self) -> anyhow::Result<DrawerConfig> {
        let mut config = config::load_config(self.config.as_deref())?;
        if let Some(dir) = &self.data_dir {
            config.store.path = Some(config::default_store_path(dir));
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Canvases",
        about = "Create a canvas",
        after_help = "EXAMPLES:\n    # Create an unorganized canvas\n    drw new \"Sketches\"\n\n    # Create a canvas inside a project\n    drw new \"Roadmap\" --project work"
    )]
    New(cmd::canvas::NewArgs),

    #[command(
        next_help_heading = "Canvases",
        about = "List canvases",
        after_help = "EXAMPLES:\n    # Most recently edited first\n    drw list\n\n    # Only canvases outside any project\n    drw list --unorganized"
    )]
    List(cmd::canvas::ListArgs),

    #[command(
        next_help_heading = "Canvases",
        about = "Show one canvas",
        after_help = "EXAMPLES:\n    # Use a unique id prefix or the exact name\n    drw show 3f2a"
    )]
    Show(cmd::canvas::ShowArgs),

    #[command(next_help_heading = "Canvases", about = "Rename a canvas")]
    Rename(cmd::canvas::RenameArgs),

    #[command(next_help_heading = "Canvases", about = "Delete a canvas")]
    Rm(cmd::canvas::RmArgs),

    #[command(
        next_help_heading = "Canvases",
        about = "Move a canvas into a project, or out of all projects",
        after_help = "EXAMPLES:\n    # Move into a project\n    drw mv roadmap --project work\n\n    # Make unorganized\n    drw mv roadmap --none"
    )]
    Mv(cmd::canvas::MvArgs),

    #[command(next_help_heading = "Canvases", about = "Duplicate a canvas")]
    Dup(cmd::canvas::DupArgs),

    #[command(
        next_help_heading = "Transfer",
        about = "Export a canvas as an .excalidraw file",
        after_help = "EXAMPLES:\n    # Write to a file\n    drw export roadmap -o roadmap.excalidraw\n\n    # Write to stdout\n    drw export roadmap"
    )]
    Export(cmd::canvas::ExportArgs),

    #[command(next_help_heading = "Transfer", about = "Import an .excalidraw file as a new canvas")]
    Import(cmd::canvas::ImportArgs),

    #[command(next_help_heading = "Projects", about = "Manage projects")]
    Project {
        #[command(subcommand)]
        command: cmd::project::ProjectCommand,
    },

    #[command(
        next_help_heading = "Sync",
        about = "Load a canvas into the host and make it the working canvas",
        after_help = "EXAMPLES:\n    drw open roadmap --host-dir ~/.local/share/excalidraw"
    )]
    Open(cmd::open::OpenArgs),

    #[command(
        next_help_heading = "Sync",
        about = "Keep the working canvas in sync with host edits",
        after_help = "EXAMPLES:\n    # Watch until Ctrl-C\n    drw watch --host-dir ~/.local/share/excalidraw\n\n    # Open a canvas first, then watch\n    drw watch --host-dir ./host --canvas roadmap"
    )]
    Watch(cmd::watch::WatchArgs),

    #[command(next_help_heading = "Sync", about = "Show store, host, and sync status")]
    Status(cmd::status::StatusArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    drw completions bash > ~/.local/share/bash-completion/completions/drw"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("DRAWER_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "drawer_core=debug,drw=debug,info"
        } else {
            "drawer_core=info,drw=info,warn"
        })
    });

    let format = env::var("DRAWER_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args.shell, &mut command);
    }

    let output = cli.output_mode();
    let config = cli.load_config()?;
    let session = Session::open(config).await?;
    if let Some(reason) = session.degraded_reason() {
        info!(reason, "running without a durable store");
    }

    match cli.command {
        Commands::New(args) => cmd::canvas::run_new(&session, &args, output).await,
        Commands::List(args) => cmd::canvas::run_list(&session, &args, output),
        Commands::Show(args) => cmd::canvas::run_show(&session, &args, output),
        Commands::Rename(args) => cmd::canvas::run_rename(&session, &args, output).await,
        Commands::Rm(args) => cmd::canvas::run_rm(&session, &args, output).await,
        Commands::Mv(args) => cmd::canvas::run_mv(&session, &args, output).await,
        Commands::Dup(args) => cmd::canvas::run_dup(&session, &args, output).await,
        Commands::Export(args) => cmd::canvas::run_export(&session, &args, output).await,
        Commands::Import(args) => cmd::canvas::run_import(&session, &args, output).await,
        Commands::Project { command } => cmd::project::run_project(&session, command, output).await,
        Commands::Open(args) => cmd::open::run_open(&session, &args, output).await,
        Commands::Watch(args) => cmd::watch::run_watch(&session, &args, output).await,
        Commands::Status(args) => cmd::status::run_status(&session, &args, output).await,
        Commands::Completions(_) => Ok(()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    debug!(command = ?cli.command, "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(run(cli))
}
