use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use playmaker_core::projection::{AttendanceMark, Side};

#[derive(Parser)]
#[command(name = "playmaker")]
#[command(about = "Watch and update Playmaker live resources from the terminal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name holding API and push endpoints
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch a resource and print its current view
    Show {
        /// Resource handle, e.g. match_score:42
        handle: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow a resource live until interrupted
    Watch {
        /// Resource handle, e.g. coach_workload:7
        handle: String,
        /// Push scope carrying the resource's events, e.g. tournament:3
        #[arg(long, value_name = "SCOPE")]
        scope: String,
    },
    /// Add points to one side of a match
    Score {
        /// Match id
        match_id: String,
        /// Side that scored
        #[arg(long, value_enum)]
        side: SideArg,
        /// Points to add (negative to correct a mistake)
        #[arg(long, default_value = "1", allow_negative_numbers = true)]
        points: i64,
    },
    /// Mark a player's attendance for a session
    Attend {
        /// Session id
        session_id: String,
        /// Player id
        player_id: String,
        /// Attendance mark
        #[arg(long, value_enum)]
        mark: MarkArg,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SideArg {
    Home,
    Away,
}

impl From<SideArg> for Side {
    fn from(value: SideArg) -> Self {
        match value {
            SideArg::Home => Self::Home,
            SideArg::Away => Self::Away,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum MarkArg {
    Present,
    Late,
    Absent,
    Excused,
}

impl From<MarkArg> for AttendanceMark {
    fn from(value: MarkArg) -> Self {
        match value {
            MarkArg::Present => Self::Present,
            MarkArg::Late => Self::Late,
            MarkArg::Absent => Self::Absent,
            MarkArg::Excused => Self::Excused,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update a profile
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// REST API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Push websocket URL
        #[arg(long, value_name = "URL")]
        push_url: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the effective configuration
    Show {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
