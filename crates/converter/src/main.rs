// macroblock-converter - rewrites macroblocks for other environments
// Subcommands:
// - convert: filter, optionally replace blocks by items, and write one copy
//   of every macroblock per requested destination environment
// - check-items: verify that the replacement items are installed

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

mod codec;
mod error;
mod filter;
mod items;
mod pipeline;
mod record;
mod remap;
mod tables;

use mbconv_shared::config::Config;
use mbconv_shared::log::{initialize_logging, map_log_level};
use mbconv_shared::sink::{LogSink, TracingSink};
use mbconv_shared::{DEFAULT_CONFIG, ENV_PREFIX, basic_log, error_log};

use crate::codec::{JsonCodec, JsonItemSource};
use crate::error::ConvertError;
use crate::items::ItemCatalog;
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::tables::ConversionTables;

/// File name suffix of macroblocks, compared case-insensitively
const MACROBLOCK_SUFFIX: &str = ".macroblock.gbx";

/// Global stop signal, checked between records
static STOP_EVENT: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "macroblock-converter")]
#[command(about = "Converts macroblocks between environments")]
#[command(version)]
struct Cli {
    /// Console log level override (0=Minimum, 1=Error, 2=Detail, 3=Full/Debug, 4=Trace)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<i32>,

    /// Options file path
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert macroblock files or folders of macroblocks
    Convert(ConvertArgs),
    /// Check that every catalogued replacement item is installed
    CheckItems(CatalogArgs),
}

#[derive(Args, Debug)]
struct CatalogArgs {
    /// Directory holding conversions.json and vegetation.json
    #[arg(long = "tables")]
    tables_dir: Option<String>,

    /// Directory holding the replacement item definitions
    #[arg(long = "items")]
    items_dir: Option<String>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Macroblock files, or folders searched recursively
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[command(flatten)]
    catalog: CatalogArgs,

    /// Destination environments (comma separated); default is all
    #[arg(short = 't', long = "targets", value_delimiter = ',')]
    targets: Option<Vec<String>>,

    /// Block-to-item categories to apply (comma separated)
    #[arg(long = "categories", value_delimiter = ',')]
    categories: Option<Vec<String>>,

    /// Keep macroblocks that lost some of their blocks
    #[arg(long = "preserve-trimmed", num_args = 0..=1, default_missing_value = "true")]
    preserve_trimmed: Option<bool>,

    /// Reset block variants unless known to be safe
    #[arg(long = "nullify-variants", num_args = 0..=1, default_missing_value = "true")]
    nullify_variants: Option<bool>,

    /// Place ground and ground-ghost blocks in air mode
    #[arg(long = "convert-ground", num_args = 0..=1, default_missing_value = "true")]
    convert_ground: Option<bool>,

    /// Drop stock vegetation items
    #[arg(long = "ignore-vegetation", num_args = 0..=1, default_missing_value = "true")]
    ignore_vegetation: Option<bool>,

    /// Replace blocks without a destination equivalent by items
    #[arg(long = "blocks-to-items", num_args = 0..=1, default_missing_value = "true")]
    blocks_to_items: Option<bool>,

    /// Write into a 'Converted' folder inside each destination environment
    #[arg(long = "converted-folder", num_args = 0..=1, default_missing_value = "true")]
    converted_folder: Option<bool>,

    /// Number of threads to use
    #[arg(long = "threads")]
    threads: Option<usize>,
}

fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let mut config = Config::with_env_prefix(ENV_PREFIX);
    match path {
        Some(path) => {
            if !config.set_source(path, ENV_PREFIX) {
                anyhow::bail!("Could not read configuration file {}", path);
            }
        }
        None => {
            // the default file is optional
            config.set_source(DEFAULT_CONFIG, ENV_PREFIX);
        }
    }
    Ok(config)
}

fn init_logging(log_level: Option<i32>, config: &Config) {
    let console_level = map_log_level(log_level.unwrap_or_else(|| config.get_int_default("LogLevel", 2)));
    let log_dir = config.is_set("LogsDir").then(|| config.get_string("LogsDir"));
    initialize_logging(log_dir.as_deref(), console_level, None);
}

fn resolve_threads(threads: Option<usize>, config: &Config) -> usize {
    threads
        .or_else(|| usize::try_from(config.get_int_default("Threads", 0)).ok().filter(|n| *n > 0))
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
}

/// Tables default to the directory of the executable
fn resolve_tables_dir(arg: Option<&str>, config: &Config) -> PathBuf {
    if let Some(dir) = arg {
        return PathBuf::from(dir);
    }
    let configured = config.get_string("TablesDir");
    if !configured.is_empty() {
        return PathBuf::from(configured);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve_items_dir(arg: Option<&str>, config: &Config) -> Option<PathBuf> {
    arg.map(PathBuf::from).or_else(|| {
        let configured = config.get_string("ItemsDir");
        (!configured.is_empty()).then(|| PathBuf::from(configured))
    })
}

fn is_macroblock(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase().ends_with(MACROBLOCK_SUFFIX))
        .unwrap_or(false)
}

fn collect_dir(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("Cannot read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_dir(&path, out)?;
        } else if is_macroblock(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn collect_sources(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            let before = sources.len();
            collect_dir(path, &mut sources)?;
            basic_log!("Found {} macroblocks in {}", sources.len() - before, path.display());
        } else if path.is_file() {
            sources.push(path.clone());
        } else {
            anyhow::bail!("Input path does not exist: {}", path.display());
        }
    }
    sources.sort();
    sources.dedup();
    Ok(sources)
}

fn load_catalog(tables: &ConversionTables, items_dir: &Path, sink: &dyn LogSink) -> anyhow::Result<ItemCatalog> {
    let source = JsonItemSource::new(items_dir);
    let catalog = ItemCatalog::load(tables, &source, sink)
        .with_context(|| format!("Reading items from {}", source.root().display()))?;
    if catalog.is_complete() {
        sink.info("All items found.");
    } else {
        sink.warn(&format!(
            "{} of {} items missing, please install the replacement items.",
            catalog.missing(),
            catalog.catalogued
        ));
    }
    Ok(catalog)
}

fn run_check_items(args: CatalogArgs, config: &Config) -> anyhow::Result<()> {
    let tables_dir = resolve_tables_dir(args.tables_dir.as_deref(), config);
    let tables = ConversionTables::load(&tables_dir)?;
    let Some(items_dir) = resolve_items_dir(args.items_dir.as_deref(), config) else {
        anyhow::bail!("No items directory given (--items or ItemsDir)");
    };

    let catalog = load_catalog(&tables, &items_dir, &TracingSink)?;
    if !catalog.is_complete() {
        anyhow::bail!("Missing items");
    }
    Ok(())
}

fn run_convert(args: ConvertArgs, config: &Config) -> anyhow::Result<()> {
    let mut options = PipelineOptions::from_config(config);
    if let Some(targets) = args.targets {
        options.target_environments = Some(targets.into_iter().collect());
    }
    if let Some(categories) = args.categories {
        options.convert_categories = categories;
    }
    options.preserve_trimmed = args.preserve_trimmed.unwrap_or(options.preserve_trimmed);
    options.nullify_variants = args.nullify_variants.unwrap_or(options.nullify_variants);
    options.convert_ground = args.convert_ground.unwrap_or(options.convert_ground);
    options.ignore_vegetation = args.ignore_vegetation.unwrap_or(options.ignore_vegetation);
    options.convert_blocks_to_items = args.blocks_to_items.unwrap_or(options.convert_blocks_to_items);
    options.create_converted_folder = args.converted_folder.unwrap_or(options.create_converted_folder);

    let tables_dir = resolve_tables_dir(args.catalog.tables_dir.as_deref(), config);
    let tables = ConversionTables::load(&tables_dir)
        .with_context(|| format!("Loading conversion tables from {}", tables_dir.display()))?;

    let sink = TracingSink;
    let catalog = match resolve_items_dir(args.catalog.items_dir.as_deref(), config) {
        Some(dir) if options.convert_blocks_to_items => Some(load_catalog(&tables, &dir, &sink)?),
        _ => None,
    };
    // a partial catalogue would silently drop blocks that have no item
    let metadata = catalog
        .as_ref()
        .filter(|catalog| catalog.is_complete())
        .map(|catalog| &catalog.metadata);

    let sources = collect_sources(&args.paths)?;
    if sources.is_empty() {
        tracing::warn!("No macroblocks found!");
        return Ok(());
    }

    let threads = resolve_threads(args.threads, config);
    tracing::info!("Convert: sources={} threads={} options={:?}", sources.len(), threads, options);

    ctrlc::set_handler(|| {
        tracing::info!("Received stop signal, finishing records in progress");
        STOP_EVENT.store(true, Ordering::SeqCst);
    })?;

    sink.info("=== Starting Conversion ===");
    let pipeline = Pipeline::new(&tables, metadata, &JsonCodec, &sink, options).with_stop_flag(&STOP_EVENT);
    let summary = pipeline.run(&sources, threads)?;
    sink.info("=== Conversion Complete ===");
    if summary.written > 0 {
        sink.info("Remember to restart your game!");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(cli.log_level, &config);

    let result = match cli.command {
        Command::Convert(args) => run_convert(args, &config),
        Command::CheckItems(args) => run_check_items(args, &config),
    };
    if let Err(err) = &result {
        if err.downcast_ref::<ConvertError>().is_some_and(ConvertError::is_fatal) {
            error_log!("Conversion aborted before any record was written");
        }
        error_log!("{:#}", err);
    }
    result
}
