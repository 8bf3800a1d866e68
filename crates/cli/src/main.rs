mod commands;
mod config;
mod render;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use reqtrack_core::{DirectoryKind, Identity, WorkflowGraph};
use reqtrack_executor::{Desk, DeskConfig};
use reqtrack_storage::JsonFileStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Overrides, Settings};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Which requisitions an export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ScopeArg {
    All,
    Closed,
    Range,
}

/// A favourites list of the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum KindArg {
    Unit,
    Applicant,
    Project,
    Vendor,
}

impl From<KindArg> for DirectoryKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Unit => DirectoryKind::Unit,
            KindArg::Applicant => DirectoryKind::Applicant,
            KindArg::Project => DirectoryKind::Project,
            KindArg::Vendor => DirectoryKind::Vendor,
        }
    }
}

/// Procurement requisition desk.
#[derive(Parser)]
#[command(name = "reqtrack", version, about = "Procurement requisition desk")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to the JSON store file
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Acting identity: an email, `guest`, or any other account name
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Path to a reqtrack.toml configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Header fields and line items of a requisition.
#[derive(Args, Debug, Clone)]
pub(crate) struct DraftArgs {
    /// Requesting unit
    #[arg(long)]
    pub unit: String,
    /// Applicant name
    #[arg(long, default_value = "")]
    pub applicant: String,
    /// Funding project
    #[arg(long)]
    pub subsidy: Option<String>,
    /// Vendor
    #[arg(long)]
    pub vendor: Option<String>,
    /// Application date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,
    /// Free-form remark
    #[arg(long, default_value = "")]
    pub remark: String,
    /// Mark as urgent
    #[arg(long)]
    pub urgent: bool,
    /// Line item as SUBJECT:QUANTITY:UNIT_PRICE[:MEASURE], repeatable
    #[arg(long = "item", required = true)]
    pub items: Vec<String>,
    /// Add unit, applicant, project and vendor to the directory if new
    #[arg(long)]
    pub remember: bool,
}

/// Filters shared by `list`.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct QueryArgs {
    /// Only states of this phase
    #[arg(long)]
    pub phase: Option<u8>,
    /// Only urgent requisitions
    #[arg(long)]
    pub urgent: bool,
    /// Exact vendor
    #[arg(long)]
    pub vendor: Option<String>,
    /// Case-insensitive text search
    #[arg(long)]
    pub search: Option<String>,
    /// Creation month (YYYY-MM)
    #[arg(long)]
    pub month: Option<String>,
    /// Earliest application date (YYYY-MM-DD)
    #[arg(long, requires = "to")]
    pub from: Option<String>,
    /// Latest application date (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    pub to: Option<String>,
}

/// Requisitions a batch applies to: explicit references, a whole phase, or both.
#[derive(Args, Debug, Clone)]
pub(crate) struct Selection {
    /// Ids or serials
    pub references: Vec<String>,
    /// Add every requisition currently in this phase
    #[arg(long)]
    pub phase: Option<u8>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the workflow states
    Workflow,

    /// Open a new requisition
    Create {
        #[command(flatten)]
        draft: DraftArgs,
    },

    /// Replace the header fields and items of a requisition
    Edit {
        /// Id or serial
        reference: String,
        #[command(flatten)]
        draft: DraftArgs,
    },

    /// Show one requisition with its audit trail
    Show {
        /// Id or serial
        reference: String,
    },

    /// List requisitions, newest first
    List {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Move a requisition to the next state
    Advance {
        /// Id or serial
        reference: String,
        #[arg(long)]
        note: Option<String>,
        /// Name of the person picking up the goods
        #[arg(long)]
        pickup_name: Option<String>,
    },

    /// Move a requisition back one state
    Revert {
        /// Id or serial
        reference: String,
        #[arg(long)]
        reason: String,
    },

    /// Set or clear the urgent flag
    Urgent {
        /// Id or serial
        reference: String,
        /// Clear the flag instead of setting it
        #[arg(long)]
        off: bool,
    },

    /// Apply one action to many requisitions at once
    Batch {
        #[command(subcommand)]
        command: BatchCommands,
    },

    /// Restore a JSON backup over the store
    Import {
        /// Path to the backup file
        file: PathBuf,
        /// Fail if any imported id already exists
        #[arg(long)]
        strict: bool,
    },

    /// Write requisitions as a JSON backup
    Export {
        #[arg(long, value_enum, default_value = "all")]
        scope: ScopeArg,
        /// First serial date for --scope range (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last serial date for --scope range (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Destination file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Delete a requisition
    Delete {
        /// Id or serial
        reference: String,
    },

    /// List closed requisitions grouped by creation month
    Archive,

    /// Delete every closed requisition created in one month
    PurgeClosed {
        /// Month (YYYY-MM)
        month: String,
    },

    /// List or extend the favourites directory
    Directory {
        #[command(subcommand)]
        command: DirectoryCommands,
    },

    /// Show the system activity log, newest first
    Activity {
        /// Only this kind (e.g. status_change, import)
        #[arg(long)]
        kind: Option<String>,
        /// Only this operator
        #[arg(long)]
        operator: Option<String>,
        /// At most this many entries
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub(crate) enum BatchCommands {
    /// Advance every eligible requisition
    Advance {
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        note: Option<String>,
    },
    /// Revert every eligible requisition
    Revert {
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        reason: String,
    },
    /// Record pickup for requisitions waiting on it
    Receive {
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        pickup_name: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Close requisitions directly, bypassing intermediate states
    Complete {
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum DirectoryCommands {
    /// Print the remembered values
    List {
        /// Only this list
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// Remember values without creating a requisition
    Add {
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(required = true)]
        values: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let overrides = Overrides {
        config: cli.config.clone(),
        store: cli.store.clone(),
        actor: cli.actor.clone(),
    };
    let settings = match config::load(&overrides) {
        Ok(s) => s,
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    init_tracing(&settings);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(
                &format!("failed to create tokio runtime: {}", e),
                cli.output,
                cli.quiet,
            );
            process::exit(1);
        }
    };
    if let Err(msg) = rt.block_on(run(cli.command, &settings, cli.output, cli.quiet)) {
        report_error(&msg, cli.output, cli.quiet);
        process::exit(1);
    }
}

/// `RUST_LOG` wins over the configured filter. Logs go to stderr.
fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config::DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn open_desk(settings: &Settings) -> Result<Desk<JsonFileStore>, String> {
    let store = JsonFileStore::open(&settings.store)
        .await
        .map_err(|e| e.to_string())?;
    Ok(Desk::new(store, WorkflowGraph::standard())
        .with_identity(Identity::from_actor(&settings.actor))
        .with_config(DeskConfig {
            max_attempts: settings.max_attempts,
        }))
}

async fn run(
    command: Commands,
    settings: &Settings,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    if let Commands::Workflow = command {
        commands::workflow::cmd_workflow(&WorkflowGraph::standard(), output);
        return Ok(());
    }

    let desk = open_desk(settings).await?;
    match command {
        Commands::Workflow => Ok(()),
        Commands::Create { draft } => commands::requisition::cmd_create(&desk, draft, output, quiet).await,
        Commands::Edit { reference, draft } => {
            commands::requisition::cmd_edit(&desk, &reference, draft, output, quiet).await
        }
        Commands::Show { reference } => {
            commands::requisition::cmd_show(&desk, &reference, output).await
        }
        Commands::List { query } => commands::requisition::cmd_list(&desk, query, output).await,
        Commands::Advance {
            reference,
            note,
            pickup_name,
        } => {
            commands::requisition::cmd_advance(
                &desk,
                &reference,
                note.as_deref(),
                pickup_name.as_deref(),
                output,
                quiet,
            )
            .await
        }
        Commands::Revert { reference, reason } => {
            commands::requisition::cmd_revert(&desk, &reference, &reason, output, quiet).await
        }
        Commands::Urgent { reference, off } => {
            commands::requisition::cmd_urgent(&desk, &reference, !off, output, quiet).await
        }
        Commands::Delete { reference } => {
            commands::requisition::cmd_delete(&desk, &reference, output, quiet).await
        }
        Commands::Batch { command } => commands::batch::cmd_batch(&desk, command, output, quiet).await,
        Commands::Import { file, strict } => {
            commands::backup::cmd_import(&desk, &file, strict, output, quiet).await
        }
        Commands::Export {
            scope,
            from,
            to,
            out,
        } => {
            commands::backup::cmd_export(
                &desk,
                scope,
                from.as_deref(),
                to.as_deref(),
                out.as_deref(),
                output,
                quiet,
            )
            .await
        }
        Commands::Archive => commands::archive::cmd_archive(&desk, output).await,
        Commands::PurgeClosed { month } => {
            commands::archive::cmd_purge_closed(&desk, &month, output, quiet).await
        }
        Commands::Directory { command } => {
            commands::directory::cmd_directory(&desk, command, output, quiet).await
        }
        Commands::Activity {
            kind,
            operator,
            limit,
        } => commands::activity::cmd_activity(&desk, kind.as_deref(), operator, limit, output).await,
    }
}

/// Report an error message to stderr in the selected output format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
