use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use exif_renamer_core::{
    app_paths, load_config, save_config, validate_template, AppConfig, ExifRenamer, ProcessResult,
    RenameError,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "exif-renamer-cli")]
#[command(about = "EXIFの撮影日時をもとに写真をテンプレートでリネームします")]
struct Cli {
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Exif {
        path: PathBuf,
    },
    Process {
        path: PathBuf,
        #[command(flatten)]
        options: RenameArgs,
    },
    Rename {
        path: PathBuf,
        #[command(flatten)]
        options: RenameArgs,
    },
    RenameDir {
        dir: PathBuf,
        #[arg(long, default_value_t = false)]
        recursive: bool,
        #[command(flatten)]
        options: RenameArgs,
    },
    Watch {
        dir: PathBuf,
        #[command(flatten)]
        options: RenameArgs,
    },
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Args)]
struct RenameArgs {
    #[arg(long)]
    template: Option<String>,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    #[arg(long, default_value_t = false)]
    overwrite: bool,
    #[arg(long, default_value_t = false)]
    require_exif: bool,
    #[arg(long, default_value_t = false)]
    no_fallback_ctime: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Exif { path } => cmd_exif(path),
        Commands::Process { path, options } => cmd_process(path, options, false),
        Commands::Rename { path, options } => cmd_process(path, options, true),
        Commands::RenameDir {
            dir,
            recursive,
            options,
        } => cmd_rename_dir(dir, recursive, options),
        Commands::Watch { dir, options } => cmd_watch(dir, options),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Init { force } => cmd_config_init(force),
        },
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_renamer(options: &RenameArgs) -> Result<(ExifRenamer, String)> {
    let config = load_config()?;
    let template = options.template.clone().unwrap_or(config.template);
    validate_template(&template).with_context(|| format!("テンプレート: {template}"))?;

    let mut renamer = ExifRenamer::new(config.renamer);
    renamer.config.dryrun |= options.dry_run;
    renamer.config.overwrite |= options.overwrite;
    renamer.config.require_exif |= options.require_exif;
    if options.no_fallback_ctime {
        renamer.config.fallback_ctime = false;
    }
    Ok((renamer, template))
}

fn cmd_exif(path: PathBuf) -> Result<()> {
    let data = ExifRenamer::default().exif(&path)?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn cmd_process(path: PathBuf, options: RenameArgs, apply: bool) -> Result<()> {
    let (renamer, template) = build_renamer(&options)?;
    let result = if apply {
        renamer.rename(&path, template)?
    } else {
        renamer.process(&path, template)?
    };

    match options.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => print_row(&result),
    }
    Ok(())
}

fn cmd_rename_dir(dir: PathBuf, recursive: bool, options: RenameArgs) -> Result<()> {
    let (renamer, template) = build_renamer(&options)?;
    let results = renamer.rename_dir(&dir, template, recursive)?;

    match options.output {
        OutputFormat::Json => {
            let entries: Vec<_> = results.iter().map(entry_json).collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Table => {
            println!("元ファイル -> 新ファイル (状態, 日時)");
            for entry in &results {
                print_entry(entry);
            }
        }
    }

    let failed = results.iter().filter(|r| r.is_err()).count();
    eprintln!("集計: total={} ok={} failed={}", results.len(), results.len() - failed, failed);
    if renamer.config.dryrun {
        eprintln!("dry-runモード: 実ファイルは変更していません。");
    }
    Ok(())
}

fn cmd_watch(dir: PathBuf, options: RenameArgs) -> Result<()> {
    let (renamer, template) = build_renamer(&options)?;
    let output = options.output;

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;

    let handle = renamer.watch(&dir, template, move |entry| match output {
        OutputFormat::Json => println!("{}", entry_json(&entry)),
        OutputFormat::Table => print_entry(&entry),
    })?;
    eprintln!("監視中: {} (Ctrl+Cで終了)", handle.root().display());

    let _ = stop_rx.recv();
    handle.stop();
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("設定ファイル: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init(force: bool) -> Result<()> {
    let paths = app_paths()?;
    if paths.config_path.exists() && !force {
        anyhow::bail!(
            "設定ファイルは既に存在します: {} (上書きするには --force を指定してください)",
            paths.config_path.display()
        );
    }
    let path = save_config(&AppConfig::default())?;
    println!("設定ファイルを作成しました: {}", path.display());
    Ok(())
}

fn entry_json(entry: &Result<ProcessResult, RenameError>) -> serde_json::Value {
    match entry {
        Ok(result) => json!({ "ok": result }),
        Err(err) => json!({ "error": err.to_string() }),
    }
}

fn print_entry(entry: &Result<ProcessResult, RenameError>) {
    match entry {
        Ok(result) => print_row(result),
        Err(err) => println!("失敗: {err}"),
    }
}

fn print_row(result: &ProcessResult) {
    println!(
        "{} -> {} ({:?}, {:?})",
        result.original.info.path.display(),
        result.processed.path.display(),
        result.status,
        result.original.datetime_source
    );
}
