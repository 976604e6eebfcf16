use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dset",
    about = "dset: versioned datasets backed by a content-addressed file cache",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Dataset configuration file
    #[arg(short, long, global = true, default_value = "dset.toml")]
    pub config: PathBuf,

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

#[derive(Subcommand)]
pub enum Command {
    /// Create a dataset and write its configuration file
    Init(InitArgs),
    /// Show files created, modified or deleted since the last save
    Status(StatusArgs),
    /// Record every local change as a new revision
    Save(SaveArgs),
    /// List manifest entries in order
    Ls(LsArgs),
    /// Show one manifest entry
    Info(InfoArgs),
    /// Create an empty directory
    Mkdir(MkdirArgs),
    /// Move or rename a file or directory
    Mv(MvArgs),
    /// Delete files or directories
    Rm(RmArgs),
    /// Upload queued objects to the remote
    Push(PushArgs),
    /// Download missing objects from the remote
    Pull(PullArgs),
    /// Show revision history
    Log(LogArgs),
    /// Show the activity feed
    Activity(LogArgs),
    /// Print the effective configuration with tokens masked
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct InitArgs {
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub namespace: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    /// Mirror objects into this directory instead of the hosted object store
    #[arg(long)]
    pub local_remote: Option<PathBuf>,
}

#[derive(Args)]
pub struct StatusArgs {}

#[derive(Args)]
pub struct SaveArgs {
    #[arg(short, long)]
    pub message: Option<String>,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(long, default_value = "100")]
    pub first: i64,
    /// Start after this position
    #[arg(long)]
    pub after: Option<i64>,
}

#[derive(Args)]
pub struct InfoArgs {
    pub key: String,
}

#[derive(Args)]
pub struct MkdirArgs {
    pub path: String,
}

#[derive(Args)]
pub struct MvArgs {
    pub src: String,
    pub dest: String,
}

#[derive(Args)]
pub struct RmArgs {
    #[arg(required = true)]
    pub keys: Vec<String>,
}

#[derive(Args)]
pub struct PushArgs {}

#[derive(Args)]
pub struct PullArgs {
    /// Only these keys; directories include everything below them
    pub keys: Vec<String>,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ConfigArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["dset", "init", "--name", "images"]).unwrap();
        if let Command::Init(args) = cli.command {
            assert_eq!(args.name, Some("images".into()));
            assert!(args.local_remote.is_none());
        } else {
            panic!("wrong command");
        }
        assert_eq!(cli.config, PathBuf::from("dset.toml"));
    }

    #[test]
    fn parse_save_message() {
        let cli = Cli::try_parse_from(["dset", "save", "-m", "new images"]).unwrap();
        if let Command::Save(args) = cli.command {
            assert_eq!(args.message, Some("new images".into()));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_ls_pagination() {
        let cli = Cli::try_parse_from(["dset", "ls", "--first", "5", "--after", "9"]).unwrap();
        if let Command::Ls(args) = cli.command {
            assert_eq!(args.first, 5);
            assert_eq!(args.after, Some(9));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_mv() {
        let cli = Cli::try_parse_from(["dset", "mv", "a.txt", "dir/"]).unwrap();
        if let Command::Mv(args) = cli.command {
            assert_eq!(args.src, "a.txt");
            assert_eq!(args.dest, "dir/");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn rm_requires_keys() {
        assert!(Cli::try_parse_from(["dset", "rm"]).is_err());
        let cli = Cli::try_parse_from(["dset", "rm", "a", "b/"]).unwrap();
        if let Command::Rm(args) = cli.command {
            assert_eq!(args.keys, vec!["a", "b/"]);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_pull_keys() {
        let cli = Cli::try_parse_from(["dset", "pull"]).unwrap();
        if let Command::Pull(args) = cli.command {
            assert!(args.keys.is_empty());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_log_limit() {
        let cli = Cli::try_parse_from(["dset", "log", "-n", "5"]).unwrap();
        if let Command::Log(args) = cli.command {
            assert_eq!(args.limit, 5);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli =
            Cli::try_parse_from(["dset", "status", "--verbose", "--format", "json", "-c", "x.toml"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
    }
}
