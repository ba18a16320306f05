use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "memgov",
    about = "Memory governance store: audited status changes for agent memory",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding MEMORY.yml, status/ and locks/
    #[arg(long, global = true)]
    pub memory_root: Option<PathBuf>,

    /// Directory receiving the MEMORY.md projection
    #[arg(long, global = true)]
    pub workspace_root: Option<PathBuf>,

    /// TOML configuration file; flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or normalize the bucket files and derived artifacts
    Init,
    /// Show per-status item counts
    Status,
    /// List memory items
    List(ListArgs),
    /// Move an item to another status
    SetStatus(SetStatusArgs),
    /// Resolve a conflict by merging two items into one value
    Merge(MergeArgs),
    /// List unresolved conflicts among active and pending items
    Conflicts,
    /// Audit the canonical memory file
    Audit(AuditArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only items with this status (active, pending, deprecated)
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Args, Debug)]
pub struct SetStatusArgs {
    pub id: String,
    /// Target status (active, pending, deprecated)
    pub status: String,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    pub left: String,
    pub right: String,
    /// Merged value; `true`/`false` and numbers keep their YAML type
    pub value: String,
    /// Item that survives the merge (default: LEFT)
    #[arg(long)]
    pub keep: Option<String>,
    /// Store VALUE as text even if it looks like a number or boolean
    #[arg(long)]
    pub text: bool,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Also write the report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_set_status_with_globals() {
        let cli = Cli::try_parse_from([
            "memgov",
            "set-status",
            "MEM-2024-01-001",
            "active",
            "--memory-root",
            "/tmp/memory",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.memory_root, Some(PathBuf::from("/tmp/memory")));
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::SetStatus(args) => {
                assert_eq!(args.id, "MEM-2024-01-001");
                assert_eq!(args.status, "active");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_merge_keep() {
        let cli = Cli::try_parse_from([
            "memgov",
            "merge",
            "MEM-2024-01-001",
            "MEM-2024-01-002",
            "rolling",
            "--keep",
            "MEM-2024-01-002",
        ])
        .unwrap();
        match cli.command {
            Command::Merge(args) => {
                assert_eq!(args.value, "rolling");
                assert_eq!(args.keep.as_deref(), Some("MEM-2024-01-002"));
                assert!(!args.text);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_merge_text_flag() {
        let cli = Cli::try_parse_from([
            "memgov",
            "merge",
            "MEM-2024-01-001",
            "MEM-2024-01-002",
            "30",
            "--text",
        ])
        .unwrap();
        match cli.command {
            Command::Merge(args) => {
                assert!(args.text);
                assert_eq!(args.value, "30");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(Cli::try_parse_from(["memgov", "status", "--format", "xml"]).is_err());
    }
}
