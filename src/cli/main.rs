use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use exif_sweep::config::Config;
use exif_sweep::discovery::MetadataExtractor;
use exif_sweep::engine::{BatchOperation, MetadataEngine};

#[derive(Parser, Debug)]
#[command(
    name = "exif-sweep",
    version,
    about = "Read, edit, and strip image metadata (EXIF, IPTC, XMP, text chunks) without touching pixel data"
)]
struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show metadata for one or more images
    View {
        /// Image files to inspect
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// List privacy-sensitive keys
        #[arg(long)]
        privacy_check: bool,
    },

    /// Remove metadata from one or more images
    Strip {
        /// Image files to strip
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Write result here instead of overwriting (single input only)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Remove only GPS/location keys
        #[arg(long)]
        gps_only: bool,

        /// Keep keys matching these patterns (repeatable)
        #[arg(long, value_name = "PATTERN")]
        keep: Vec<String>,

        /// Skip the automatic backup
        #[arg(long)]
        no_backup: bool,
    },

    /// Export metadata to a JSON file
    Export {
        /// Image file
        path: PathBuf,
        /// Destination JSON file
        export_path: PathBuf,
    },

    /// Restore metadata from a previously exported JSON file
    Restore {
        /// Image file to restore onto
        path: PathBuf,
        /// Exported metadata JSON
        metadata_path: PathBuf,
        /// Skip the automatic backup
        #[arg(long)]
        no_backup: bool,
    },

    /// List supported formats
    Formats,

    /// Process a directory of images
    Batch {
        /// Directory to process
        directory: PathBuf,

        /// Operation to run on each file
        #[arg(long, value_name = "OP", default_value = "strip")]
        operation: String,

        /// Recurse into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Write outputs into this directory
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Skip automatic backups
        #[arg(long)]
        no_backup: bool,
    },

    /// Dump raw container chunks and platform classification
    Discover {
        /// Image file to inspect
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let backup_default = config.backup.enabled;
    let engine = MetadataEngine::with_config(config);

    match cli.command {
        Command::View {
            paths,
            json,
            privacy_check,
        } => {
            let mut failures = 0;
            for path in &paths {
                match engine.read_metadata(path) {
                    Ok(meta) => {
                        if json {
                            println!("{}", meta.to_json());
                        } else {
                            print_metadata_summary(&meta);
                        }
                        if privacy_check {
                            print_privacy_report(&engine, path)?;
                        }
                    }
                    Err(e) => {
                        eprintln!("{}: {e}", path.display());
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{failures} file(s) failed");
            }
        }

        Command::Strip {
            paths,
            output,
            gps_only,
            keep,
            no_backup,
        } => {
            if output.is_some() && paths.len() > 1 {
                anyhow::bail!("--output requires exactly one input file");
            }
            let backup = backup_default && !no_backup;

            let mut failures = 0;
            for path in &paths {
                let result = if !keep.is_empty() {
                    engine.strip_selective(path, output.as_deref(), backup, &keep)
                } else if gps_only {
                    engine.strip_gps_data(path, output.as_deref(), backup)
                } else {
                    engine.strip_metadata(path, output.as_deref(), backup, false)
                };

                match result {
                    Ok(written) => println!("Stripped: {}", written.display()),
                    Err(e) => {
                        eprintln!("{}: {e}", path.display());
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{failures} file(s) failed");
            }
        }

        Command::Export { path, export_path } => {
            engine.export_metadata(&path, &export_path)?;
            println!("Exported metadata to {}", export_path.display());
        }

        Command::Restore {
            path,
            metadata_path,
            no_backup,
        } => {
            engine.restore_metadata(&path, &metadata_path, backup_default && !no_backup)?;
            println!("Restored metadata onto {}", path.display());
        }

        Command::Formats => {
            for format in engine.get_supported_formats() {
                println!(".{format}");
            }
        }

        Command::Batch {
            directory,
            operation,
            recursive,
            output_dir,
            no_backup,
        } => {
            let operation = match operation.as_str() {
                "strip" => BatchOperation::Strip,
                "strip-gps" => BatchOperation::StripGps,
                "export" => BatchOperation::Export,
                other => anyhow::bail!("unknown batch operation: {other}"),
            };

            let files = collect_supported_files(&engine, &directory, recursive);
            if files.is_empty() {
                anyhow::bail!("no supported image files found in {}", directory.display());
            }
            println!("Processing {} file(s)...", files.len());

            let results = engine.batch_process(
                &files,
                operation,
                output_dir.as_deref(),
                backup_default && !no_backup,
            );

            let mut failed = 0;
            for (path, result) in &results {
                match result {
                    Ok(written) => println!("  ok: {path} -> {}", written.display()),
                    Err(e) => {
                        eprintln!("  failed: {path}: {e}");
                        failed += 1;
                    }
                }
            }
            println!("{} succeeded, {failed} failed", results.len() - failed);
            if failed > 0 {
                anyhow::bail!("{failed} file(s) failed");
            }
        }

        Command::Discover { path } => {
            let extractor = MetadataExtractor::new(&engine);
            let extracted = extractor.extract_all(&path)?;

            println!(
                "{} ({}, {} bytes): {} raw chunk(s)",
                extracted.file_path.display(),
                extracted.file_format,
                extracted.file_size,
                extracted.raw_chunks.len()
            );
            for chunk in &extracted.raw_chunks {
                println!(
                    "  {:<12} offset {:>8}  {:>8} bytes{}",
                    chunk.chunk_type,
                    chunk.offset,
                    chunk.length,
                    chunk
                        .decoded_text
                        .as_deref()
                        .map(|t| format!("  {}", truncate(t, 60)))
                        .unwrap_or_default()
                );
            }
            for error in &extracted.extraction_errors {
                eprintln!("  warning: {error}");
            }

            let detected = extractor.classify(&extracted);
            println!(
                "Platform: {} ({:?} confidence)",
                detected.platform_name, detected.confidence
            );
        }
    }

    Ok(())
}

fn print_metadata_summary(meta: &exif_sweep::metadata::ImageMetadata) {
    println!(
        "{} ({}, {} bytes)",
        meta.file_path.display(),
        meta.format,
        meta.file_size.unwrap_or(0)
    );
    for block in meta.blocks() {
        if block.is_empty() {
            continue;
        }
        println!("  [{}]", block.name());
        for (key, value) in block.iter() {
            let text = match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            println!("    {key} = {}", truncate(&text, 80));
        }
    }
    if !meta.has_metadata() {
        println!("  (no metadata)");
    }
}

fn print_privacy_report(engine: &MetadataEngine, path: &Path) -> Result<()> {
    let sensitive = engine.privacy_report(path)?;
    if sensitive.is_empty() {
        println!("  No privacy-sensitive keys found.");
    } else {
        println!("  Privacy-sensitive keys:");
        for (block, key) in sensitive {
            println!("    {block}/{key}");
        }
    }
    Ok(())
}

fn collect_supported_files(
    engine: &MetadataEngine,
    directory: &Path,
    recursive: bool,
) -> Vec<PathBuf> {
    let supported = engine.get_supported_formats();
    let mut walker = WalkDir::new(directory).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    walker
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| supported.iter().any(|s| s == &e.to_lowercase()))
                    .unwrap_or(false)
        })
        .collect()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}
