//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Augury - memory-augmented tarot, counsellor, and bagua chat
#[derive(Parser, Debug)]
#[command(name = "augury")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Seed the importance reference corpus from a JSON file
    SeedSamples {
        /// File holding `[{"text": ..., "label": 1..10}]`
        file: PathBuf,
    },

    /// Interactive chat session
    Chat(ChatArgs),

    /// Session management (finalize, sweep)
    Session(SessionCommand),

    /// Long-term memory inspection (search, reflections, plan, prompt)
    Memory(MemoryCommand),

    /// Show version information
    Version,
}

/// Chat product selected on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Tarot,
    Counsellor,
    Bagua,
}

impl From<KindArg> for augury_core::ChatKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Tarot => Self::Tarot,
            KindArg::Counsellor => Self::Counsellor,
            KindArg::Bagua => Self::Bagua,
        }
    }
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// User ID
    #[arg(short, long, env = "AUGURY_USER_ID")]
    pub user: String,

    /// Session ID (a new one is generated when omitted)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Chat kind
    #[arg(short, long, value_enum, default_value = "counsellor")]
    pub kind: KindArg,

    /// Reply language: en, zh, or zh_TW
    #[arg(short, long, default_value = "en")]
    pub language: String,

    /// Keep this conversation out of long-term retrieval and synthesis
    #[arg(long)]
    pub private: bool,

    /// Bagua direction (bagua only)
    #[arg(long)]
    pub direction: Option<String>,

    /// Tarot spread: three_card, celtic_cross, or custom (tarot only)
    #[arg(long, default_value = "three_card")]
    pub spread: String,
}

#[derive(Args, Debug)]
pub struct SessionCommand {
    #[command(subcommand)]
    pub action: SessionAction,
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// End a session and synthesize its reflection and plan
    Finalize {
        /// User ID
        user: String,

        /// Session ID
        session: String,
    },

    /// Finalize every session idle past the inactivity window
    Sweep,
}

#[derive(Args, Debug)]
pub struct MemoryCommand {
    #[command(subcommand)]
    pub action: MemoryAction,
}

#[derive(Subcommand, Debug)]
pub enum MemoryAction {
    /// Rank stored messages or reflections against a query
    Search {
        /// User ID
        user: String,

        /// Query text
        text: String,

        /// Restrict to one chat kind
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,

        /// Search reflections instead of messages
        #[arg(long)]
        reflections: bool,

        /// Include private messages
        #[arg(long)]
        private: bool,

        /// Maximum results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// List recent reflections
    Reflections {
        /// User ID
        user: String,

        /// Restrict to one chat kind
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,

        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the active plan and plan history
    Plan {
        /// User ID
        user: String,

        /// Number of past plans to list
        #[arg(long, default_value = "0")]
        history: usize,
    },

    /// Set the custom prompt prepended to a user's turns
    Prompt {
        /// User ID
        user: String,

        /// Chat kind
        #[arg(value_enum)]
        kind: KindArg,

        /// Prompt text
        text: String,
    },

    /// Show storage statistics
    Stats {
        /// User ID
        user: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chat() {
        let cli = Cli::try_parse_from([
            "augury", "--json", "chat", "--user", "7", "--kind", "tarot", "--private",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.user, "7");
                assert_eq!(args.kind, KindArg::Tarot);
                assert!(args.private);
                assert!(args.session.is_none());
                assert_eq!(args.language, "en");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "augury", "memory", "search", "7", "lost my job", "--reflections", "-l", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Memory(MemoryCommand {
                action:
                    MemoryAction::Search {
                        user,
                        text,
                        reflections,
                        limit,
                        ..
                    },
            }) => {
                assert_eq!(user, "7");
                assert_eq!(text, "lost my job");
                assert!(reflections);
                assert_eq!(limit, 3);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
