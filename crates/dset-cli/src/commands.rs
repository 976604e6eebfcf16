use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use dset_sdk::{
    BackendConfig, BackendRegistry, Dataset, DatasetConfig, FileInfo, StatusResult,
    TransferResult,
};
use serde::Serialize;
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let config_path = cli.config;
    match cli.command {
        Command::Init(args) => cmd_init(&config_path, args, format),
        Command::Config(_) => cmd_config(&config_path, format),
        Command::Status(_) => cmd_status(&mut open(&config_path)?, format),
        Command::Save(args) => cmd_save(&mut open(&config_path)?, args, format).await,
        Command::Ls(args) => cmd_ls(&mut open(&config_path)?, args, format),
        Command::Info(args) => cmd_info(&mut open(&config_path)?, args, format),
        Command::Mkdir(args) => cmd_mkdir(&mut open(&config_path)?, args, format).await,
        Command::Mv(args) => cmd_mv(&mut open(&config_path)?, args, format).await,
        Command::Rm(args) => cmd_rm(&mut open(&config_path)?, args, format).await,
        Command::Push(_) => cmd_push(&open(&config_path)?, format).await,
        Command::Pull(args) => cmd_pull(&mut open(&config_path)?, args, format).await,
        Command::Log(args) => cmd_log(&open(&config_path)?, args, format),
        Command::Activity(args) => cmd_activity(&open(&config_path)?, args, format),
    }
}

fn open(config_path: &Path) -> anyhow::Result<Dataset> {
    let config = DatasetConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    debug!(root = %config.dataset_root.display(), "opening dataset");
    Ok(Dataset::open(config, &BackendRegistry::default())?)
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(),
    }
    Ok(())
}

fn print_status(status: &StatusResult) {
    if status.is_empty() {
        println!("No changes.");
        return;
    }
    for key in &status.created {
        println!("  {} {}", "created: ".green(), key);
    }
    for key in &status.modified {
        println!("  {} {}", "modified:".yellow(), key);
    }
    for key in &status.deleted {
        println!("  {} {}", "deleted: ".red(), key);
    }
}

fn print_file(info: &FileInfo) {
    let location = if info.is_dir {
        "dir".cyan()
    } else if info.is_local {
        "local".green()
    } else {
        "remote".dimmed()
    };
    println!("{:>12}  {:<6}  {}", info.size_bytes, location, info.key);
}

fn print_transfer<T>(result: &TransferResult<T>) {
    if result.has_failures() {
        println!("{} {}", "!".red().bold(), result.message);
    } else {
        println!("{} {}", "✓".green().bold(), result.message);
    }
}

fn cmd_init(config_path: &Path, args: InitArgs, format: OutputFormat) -> anyhow::Result<()> {
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }
    let mut config = DatasetConfig::default();
    if let Some(username) = args.username {
        config.namespace = username.clone();
        config.username = username;
    }
    if let Some(namespace) = args.namespace {
        config.namespace = namespace;
    }
    if let Some(name) = args.name {
        config.dataset_name = name;
    }
    if let Some(root) = args.local_remote {
        config.backend = BackendConfig::LocalFilesystem { root };
    }
    config.validate()?;
    config.save(config_path)?;

    let config = DatasetConfig::load(config_path)?;
    let dataset = Dataset::create(config, &BackendRegistry::default())?;
    let revision = dataset.manifest().dataset_revision();
    emit(format, revision, || {
        println!(
            "{} Initialized dataset {} in {}",
            "✓".green().bold(),
            dataset.config().dataset_name.bold(),
            dataset.config().dataset_root.display()
        );
        println!("  Revision: {}", revision.short().yellow());
        println!("  Files: {}", dataset.manifest().current_revision_dir().display());
    })
}

fn cmd_status(dataset: &mut Dataset, format: OutputFormat) -> anyhow::Result<()> {
    let status = dataset.status()?;
    let revision = dataset.manifest().dataset_revision().short().to_string();
    emit(format, &status, || {
        println!("At revision {}", revision.yellow().bold());
        print_status(&status);
    })
}

async fn cmd_save(dataset: &mut Dataset, args: SaveArgs, format: OutputFormat) -> anyhow::Result<()> {
    let status = dataset.save(args.message.as_deref()).await?;
    let revision = dataset.manifest().dataset_revision().short().to_string();
    emit(format, &status, || {
        if status.is_empty() {
            println!("Nothing to save.");
        } else {
            println!("{} Saved revision {}", "✓".green().bold(), revision.yellow());
            print_status(&status);
        }
    })
}

#[derive(Serialize)]
struct ListedFile {
    index: usize,
    #[serde(flatten)]
    info: FileInfo,
}

fn cmd_ls(dataset: &mut Dataset, args: LsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let page: Vec<ListedFile> = dataset
        .manifest_mut()
        .list(args.first, args.after)?
        .into_iter()
        .map(|(index, info)| ListedFile { index, info })
        .collect();
    emit(format, &page, || {
        if page.is_empty() {
            println!("No files.");
        }
        for entry in &page {
            print!("{:>5}  ", entry.index.to_string().dimmed());
            print_file(&entry.info);
        }
    })
}

fn cmd_info(dataset: &mut Dataset, args: InfoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let info = dataset.manifest_mut().get(&args.key)?;
    emit(format, &info, || print_file(&info))
}

async fn cmd_mkdir(dataset: &mut Dataset, args: MkdirArgs, format: OutputFormat) -> anyhow::Result<()> {
    let info = dataset.manifest_mut().create_directory(&args.path).await?;
    emit(format, &info, || {
        println!("{} Created {}", "✓".green().bold(), info.key.bold());
    })
}

async fn cmd_mv(dataset: &mut Dataset, args: MvArgs, format: OutputFormat) -> anyhow::Result<()> {
    let moved = dataset.manifest_mut().move_key(&args.src, &args.dest).await?;
    emit(format, &moved, || {
        println!("{} Moved {} -> {}", "✓".green().bold(), args.src.bold(), args.dest.bold());
        for info in &moved {
            print_file(info);
        }
    })
}

async fn cmd_rm(dataset: &mut Dataset, args: RmArgs, format: OutputFormat) -> anyhow::Result<()> {
    let status = dataset.manifest_mut().delete(&args.keys).await?;
    emit(format, &status, || print_status(&status))
}

async fn cmd_push(dataset: &Dataset, format: OutputFormat) -> anyhow::Result<()> {
    let result = dataset.push().await?;
    emit(format, &result, || {
        print_transfer(&result);
        for object in &result.failure {
            println!("  {} {}", "failed:".red(), object.dataset_path);
        }
    })?;
    if result.has_failures() {
        bail!("{} objects remain queued for upload", result.failure.len());
    }
    Ok(())
}

async fn cmd_pull(dataset: &mut Dataset, args: PullArgs, format: OutputFormat) -> anyhow::Result<()> {
    let keys = (!args.keys.is_empty()).then_some(args.keys.as_slice());
    let result = dataset.pull(keys).await?;
    emit(format, &result, || {
        print_transfer(&result);
        for object in &result.failure {
            println!("  {} {}", "failed:".red(), object.dataset_path);
        }
    })?;
    if result.has_failures() {
        bail!("{} objects could not be downloaded", result.failure.len());
    }
    Ok(())
}

fn cmd_log(dataset: &Dataset, args: LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let entries = dataset.log(Some(args.limit))?;
    emit(format, &entries, || {
        for entry in &entries {
            println!(
                "{}  {}",
                entry.revision.short().yellow().bold(),
                entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
            );
            for line in entry.message.lines() {
                println!("    {line}");
            }
        }
    })
}

fn cmd_activity(dataset: &Dataset, args: LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let records = dataset.activity(Some(args.limit))?;
    emit(format, &records, || {
        for record in &records {
            let commit = record
                .linked_commit
                .as_ref()
                .map(|r| r.short().to_string())
                .unwrap_or_else(|| "-".into());
            println!(
                "{}  {}  {}",
                record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                commit.yellow(),
                record.message
            );
        }
    })
}

fn cmd_config(config_path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let config = DatasetConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?
        .redacted();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => print!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}
