//! Unity Asset Export CLI
//!
//! Batch listing and export of asset packs through the concurrent export
//! pipeline.

mod pack;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pack::PackDecoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use unity_asset_export::{
    ArchiveCompression, ArchiveOptions, AssetManager, DirectoryDestination, ExportProgress,
    ExportProgressFn, ExportStats, FileLoadError, GroupMethod, LoadProgress, LoadProgressFn,
    LoadReport, ManagerConfig, ObjectSummary, SourceFile,
};

#[derive(Parser)]
#[command(name = "unity-asset-export")]
#[command(about = "Export previews and files from Unity asset packs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Number of concurrent export writes (default: CPU count)
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Show progress bars
    #[arg(long, global = true)]
    progress: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List the objects of asset packs
    List {
        /// Pack files or directories containing packs
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Only show objects whose name contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Process directories recursively
        #[arg(short, long)]
        recursive: bool,
    },

    /// Export the objects of asset packs
    Export {
        /// Pack files or directories containing packs
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output directory, or archive file with --archive
        #[arg(short, long)]
        output: PathBuf,

        /// Grouping (flat, container, type, source)
        #[arg(short, long, default_value = "flat")]
        group: GroupMethod,

        /// Unity class types to export (TextAsset, Texture2D, etc.)
        #[arg(long)]
        types: Vec<String>,

        /// Write a single zip archive instead of a directory tree
        #[arg(long)]
        archive: bool,

        /// Store archive entries without compression
        #[arg(long, requires = "archive")]
        store: bool,

        /// Process directories recursively
        #[arg(short, long)]
        recursive: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = ManagerConfig::default();
    if let Some(concurrency) = cli.concurrency {
        config = config.with_export_concurrency(concurrency);
    }

    match cli.command {
        Commands::List {
            input,
            filter,
            recursive,
        } => {
            let manager = AssetManager::builder(Arc::new(PackDecoder))
                .config(config)
                .build();
            list_command(&manager, input, filter, recursive, cli.progress).await
        }
        Commands::Export {
            input,
            output,
            group,
            types,
            archive,
            store,
            recursive,
        } => {
            if store {
                config = config.with_archive(ArchiveOptions {
                    compression: ArchiveCompression::Stored,
                });
            }
            let manager = AssetManager::builder(Arc::new(PackDecoder))
                .config(config)
                .build();
            let options = ExportOptions {
                output,
                group,
                types,
                archive,
                show_progress: cli.progress,
            };
            export_command(&manager, input, recursive, options).await
        }
    }
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Fractions are mapped onto a 0..=100 bar
fn fraction_position(fraction: f32) -> u64 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u64
}

async fn collect_pack_files(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            collect_pack_files_from_dir(input, recursive, &mut files).await?;
        } else {
            warn!("skipping missing input {}", input.display());
        }
    }
    Ok(files)
}

async fn collect_pack_files_from_dir(
    dir: &Path,
    recursive: bool,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        if path.is_file() && is_pack_file(&path) {
            files.push(path);
        } else if path.is_dir() && recursive {
            Box::pin(collect_pack_files_from_dir(&path, recursive, files)).await?;
        }
    }

    Ok(())
}

fn is_pack_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "zip" | "pack"))
}

/// Read every pack; unreadable ones are reported instead of aborting the run
async fn read_packs(paths: &[PathBuf]) -> (Vec<SourceFile>, Vec<FileLoadError>) {
    let mut files = Vec::with_capacity(paths.len());
    let mut errors = Vec::new();
    for path in paths {
        match SourceFile::from_path(path).await {
            Ok(file) => files.push(file),
            Err(e) => {
                warn!("cannot read {}: {}", path.display(), e);
                errors.push(FileLoadError {
                    name: path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
    (files, errors)
}

async fn load_inputs(
    manager: &AssetManager,
    inputs: &[PathBuf],
    recursive: bool,
    show_progress: bool,
) -> Result<LoadReport> {
    println!("📂 Scanning for asset packs...");
    let paths = collect_pack_files(inputs, recursive).await?;
    if paths.is_empty() {
        bail!("no asset packs found in {:?}", inputs);
    }

    let (files, unreadable) = read_packs(&paths).await;
    println!("📄 Found {} asset packs", paths.len());

    let progress = show_progress.then(|| progress_bar(100));
    let on_progress: Option<LoadProgressFn> = progress.clone().map(|pb| {
        Arc::new(move |p: LoadProgress| {
            pb.set_position(fraction_position(p.fraction));
            pb.set_message(p.name);
        }) as LoadProgressFn
    });

    let mut report = manager.load_files(files, on_progress).await;
    report.errors.splice(0..0, unreadable);
    if let Some(pb) = progress {
        pb.finish_with_message("✅ Loading complete");
    }

    for failure in &report.errors {
        eprintln!("❌ {}: {}", failure.name, failure.error);
    }
    println!(
        "✅ Loaded {} objects from {} packs",
        report.infos.len(),
        report.success_count
    );
    Ok(report)
}

async fn list_command(
    manager: &AssetManager,
    input: Vec<PathBuf>,
    filter: Option<String>,
    recursive: bool,
    show_progress: bool,
) -> Result<()> {
    let report = load_inputs(manager, &input, recursive, show_progress).await?;
    let needle = filter.map(|f| f.to_lowercase());

    let listed: Vec<&ObjectSummary> = report
        .infos
        .iter()
        .filter(|info| needle.as_deref().map_or(true, |n| info.search.contains(n)))
        .collect();

    for info in &listed {
        let container = if info.container.is_empty() {
            String::new()
        } else {
            format!(" <{}>", info.container)
        };
        println!(
            "  [{}] {:<14} {} ({} bytes){}",
            info.path_id, info.type_name, info.name, info.size, container
        );
    }
    println!("\n📊 {} of {} objects listed", listed.len(), report.infos.len());
    Ok(())
}

struct ExportOptions {
    output: PathBuf,
    group: GroupMethod,
    types: Vec<String>,
    archive: bool,
    show_progress: bool,
}

fn selected(info: &ObjectSummary, types: &[String]) -> bool {
    info.can_export && (types.is_empty() || types.iter().any(|t| *t == info.type_name))
}

async fn export_command(
    manager: &AssetManager,
    input: Vec<PathBuf>,
    recursive: bool,
    options: ExportOptions,
) -> Result<()> {
    let start_time = Instant::now();
    let report = load_inputs(manager, &input, recursive, options.show_progress).await?;

    let ids: Vec<_> = report
        .infos
        .iter()
        .filter(|info| selected(info, &options.types))
        .map(|info| info.id.clone())
        .collect();
    if ids.is_empty() {
        println!("⚠️  Nothing to export");
        return Ok(());
    }
    println!("🔄 Exporting {} objects to {:?}", ids.len(), options.output);
    debug!("grouping by {:?}", options.group);

    let progress = options.show_progress.then(|| progress_bar(100));
    let on_progress: Option<ExportProgressFn> = progress.clone().map(|pb| {
        Arc::new(move |p: ExportProgress| {
            pb.set_position(fraction_position(p.fraction));
            pb.set_message(p.name);
        }) as ExportProgressFn
    });

    let stats = if options.archive {
        let Some(archive) = manager
            .export_assets_to_archive(&ids, options.group, on_progress)
            .await?
        else {
            bail!("another export is already running");
        };
        if let Some(parent) = options.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&options.output, &archive.data).await?;
        println!(
            "📦 Wrote {} entries ({} bytes)",
            archive.entries.len(),
            archive.data.len()
        );
        archive.stats
    } else {
        let destination = Arc::new(DirectoryDestination::new(&options.output));
        let Some(stats) = manager
            .export_assets(destination, &ids, options.group, on_progress)
            .await
        else {
            bail!("another export is already running");
        };
        stats
    };

    if let Some(pb) = progress {
        pb.finish_with_message("✅ Export complete");
    }
    print_summary(&stats, start_time);
    Ok(())
}

fn print_summary(stats: &ExportStats, start_time: Instant) {
    println!("\n📊 Summary:");
    println!("  ✅ Success: {}", stats.success);
    println!("  ⏭️  Skipped: {}", stats.skip);
    println!("  ❌ Errors: {}", stats.error);
    println!("  ⏱️  Time: {:.2?}", start_time.elapsed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use unity_asset_export::{ContainerId, InspectValue, ObjectId, PreviewDetail, PreviewInfo};

    #[test]
    fn test_export_arguments() {
        let cli = Cli::try_parse_from([
            "unity-asset-export",
            "export",
            "packs",
            "-o",
            "out.zip",
            "--group",
            "type",
            "--archive",
            "--store",
            "--types",
            "Texture2D",
        ])
        .unwrap();

        let Commands::Export {
            group,
            archive,
            store,
            types,
            ..
        } = cli.command
        else {
            panic!("expected the export command");
        };
        assert_eq!(group, GroupMethod::TypeName);
        assert!(archive && store);
        assert_eq!(types, ["Texture2D"]);
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        let result = Cli::try_parse_from([
            "unity-asset-export",
            "export",
            "packs",
            "-o",
            "out",
            "--group",
            "bogus",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_store_requires_archive() {
        let result = Cli::try_parse_from([
            "unity-asset-export",
            "export",
            "packs",
            "-o",
            "out",
            "--store",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_fraction_position() {
        assert_eq!(fraction_position(0.0), 0);
        assert_eq!(fraction_position(0.25), 25);
        assert_eq!(fraction_position(1.5), 100);
    }

    #[test]
    fn test_pack_file_detection() {
        assert!(is_pack_file(Path::new("level0.zip")));
        assert!(is_pack_file(Path::new("LEVEL0.PACK")));
        assert!(!is_pack_file(Path::new("readme.txt")));
    }

    #[tokio::test]
    async fn test_unreadable_packs_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.zip");
        std::fs::write(&good, b"data").unwrap();
        let missing = dir.path().join("gone.zip");

        let (files, errors) = read_packs(&[missing.clone(), good]).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].data.as_ref(), b"data");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, missing.display().to_string());
    }

    #[tokio::test]
    async fn test_collect_pack_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.zip"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::write(dir.path().join("nested/b.zip"), b"").unwrap();

        let flat = collect_pack_files(&[dir.path().to_path_buf()], false)
            .await
            .unwrap();
        assert_eq!(flat, [dir.path().join("a.zip")]);

        let mut deep = collect_pack_files(&[dir.path().to_path_buf()], true)
            .await
            .unwrap();
        deep.sort();
        assert_eq!(deep, [dir.path().join("a.zip"), dir.path().join("nested/b.zip")]);
    }

    #[test]
    fn test_type_selection() {
        let summary = |type_name: &str, can_export: bool| ObjectSummary {
            key: "c#1".into(),
            id: ObjectId::new(ContainerId::new("c"), 1),
            file_name: "a.zip".into(),
            name: "a".into(),
            container: String::new(),
            type_name: type_name.into(),
            path_id: 1,
            size: 0,
            preview: PreviewInfo {
                detail: PreviewDetail::None,
                type_tree: InspectValue::empty_object(),
                inspect: InspectValue::empty_object(),
            },
            search: "a".into(),
            can_export,
        };

        assert!(selected(&summary("Texture2D", true), &[]));
        assert!(!selected(&summary("Texture2D", false), &[]));
        assert!(!selected(&summary("TextAsset", true), &["Texture2D".to_string()]));
    }
}
