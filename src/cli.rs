use clap::{Parser, Subcommand};
use confmark::config::RemoteConfig;
use std::path::PathBuf;

fn parse_remote(s: &str) -> Result<RemoteConfig, String> {
    RemoteConfig::parse(s).map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
#[command(name = "confmark")]
#[command(about = "Conference bookmarks and stars, synced across devices", long_about = None)]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Bookmark a session on this device
    confmark bookmark s42 --title \"Opening keynote\"

    # Sign in and merge device picks into a shared store
    confmark --user alice --remote sqlite:~/prefs.db sync

    # Same, against an S3 bucket
    confmark --user alice --remote s3://my-bucket/conference list

    # Machine-readable output
    confmark --json status")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Signed-in user id (omit to stay on device data only)
    #[arg(long, global = true, env = "CONFMARK_USER")]
    pub user: Option<String>,

    /// Email recorded on the user profile
    #[arg(long, global = true, env = "CONFMARK_EMAIL")]
    pub email: Option<String>,

    /// Device preference file
    #[arg(long, global = true, env = "CONFMARK_LOCAL")]
    pub local: Option<PathBuf>,

    /// Remote store: none, sqlite:<path> or s3://bucket[/prefix]
    #[arg(long, global = true, env = "CONFMARK_REMOTE", value_parser = parse_remote)]
    pub remote: Option<RemoteConfig>,

    /// Config file (default: ~/.config/confmark/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output newline-delimited JSON events
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only show errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show bookmarked and starred sessions
    List,

    /// Bookmark a session
    Bookmark {
        session_id: String,
        /// Session title stored alongside the id
        #[arg(long)]
        title: Option<String>,
    },

    /// Remove a bookmark
    Unbookmark { session_id: String },

    /// Star a session
    Star {
        session_id: String,
        /// Session title stored alongside the id
        #[arg(long)]
        title: Option<String>,
    },

    /// Remove a star
    Unstar { session_id: String },

    /// Show whether a session is bookmarked or starred
    Check { session_id: String },

    /// Reconcile device and remote preferences
    Sync,

    /// Show identity, remote and counts
    Status,

    /// Wipe device preferences (remote data and first-sync markers stay)
    Clear,
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet || self.json {
            return tracing::Level::ERROR;
        }

        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bookmark_with_title() {
        let cli = Cli::try_parse_from(["confmark", "bookmark", "s42", "--title", "Keynote"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Bookmark {
                session_id: "s42".to_string(),
                title: Some("Keynote".to_string()),
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "confmark",
            "list",
            "--user",
            "alice",
            "--remote",
            "sqlite:/tmp/r.db",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert_eq!(
            cli.remote,
            Some(RemoteConfig::Sqlite {
                path: "/tmp/r.db".to_string()
            })
        );
        assert!(cli.json);
    }

    #[test]
    fn test_bad_remote_rejected() {
        assert!(Cli::try_parse_from(["confmark", "--remote", "ftp://x", "list"]).is_err());
    }

    #[test]
    fn test_log_level() {
        let cli = Cli::try_parse_from(["confmark", "list"]).unwrap();
        assert_eq!(cli.log_level(), tracing::Level::WARN);

        let cli = Cli::try_parse_from(["confmark", "-vv", "list"]).unwrap();
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);

        let cli = Cli::try_parse_from(["confmark", "-v", "--json", "list"]).unwrap();
        assert_eq!(cli.log_level(), tracing::Level::ERROR);
    }
}
