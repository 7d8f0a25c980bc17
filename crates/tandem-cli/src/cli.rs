use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use tandem_core::models::SyncDirection;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Bidirectional document sync between two remote endpoints")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to a YAML configuration file (default: environment)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the state database
    Init,
    /// Test connectivity to both endpoints
    Test,
    /// Run synchronization
    Sync {
        /// Specific doctype to sync
        #[arg(long)]
        doctype: Option<String>,
        /// Specific document name to sync (requires --doctype)
        #[arg(long, requires = "doctype")]
        docname: Option<String>,
        /// Sync direction
        #[arg(long, value_enum, default_value_t = DirectionArg::Auto)]
        direction: DirectionArg,
        /// Max documents per doctype
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List unresolved conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the webhook intake server and queue worker
    Webhook,
    /// Print endpoint-side webhook configuration instructions
    SetupWebhook,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum DirectionArg {
    /// Let the resolver decide from content hashes
    Auto,
    CloudToLocal,
    LocalToCloud,
}

impl DirectionArg {
    /// The hint handed to the executor; `Auto` means none.
    #[must_use]
    pub const fn hint(self) -> Option<SyncDirection> {
        match self {
            Self::Auto => None,
            Self::CloudToLocal => Some(SyncDirection::CloudToLocal),
            Self::LocalToCloud => Some(SyncDirection::LocalToCloud),
        }
    }
}
