// Conversion pipeline
// parse -> filter -> (convert blocks to items) -> remap per destination -> write
//
// Each source record is an independent job. Jobs run on a rayon pool and only
// share the read-only tables; every destination gets its own remapped copy.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use mbconv_shared::config::Config;
use mbconv_shared::detail_log;
use mbconv_shared::sink::LogSink;
use rayon::prelude::*;

use crate::codec::RecordCodec;
use crate::error::{ConvertError, Result};
use crate::filter::{BlockFilter, FilterOptions};
use crate::items::{ItemConverter, ItemMetadataTable};
use crate::record::MacroblockRecord;
use crate::remap::{EnvironmentRemapper, RemapOptions};
use crate::tables::{ConversionTables, OVERRIDE_VISTA_DECOWALL};

/// Root folder of the game's macroblock library
pub const BLOCKS_DIR: &str = "Blocks";
pub const CONVERTED_DIR: &str = "Converted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Write records even when some of their blocks were dropped
    pub preserve_trimmed: bool,
    pub nullify_variants: bool,
    pub convert_ground: bool,
    pub ignore_vegetation: bool,
    pub convert_blocks_to_items: bool,
    pub create_converted_folder: bool,
    /// Block-to-item categories to apply
    pub convert_categories: Vec<String>,
    /// `None` targets every environment of the loaded tables
    pub target_environments: Option<BTreeSet<String>>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            preserve_trimmed: true,
            nullify_variants: true,
            convert_ground: false,
            ignore_vegetation: false,
            convert_blocks_to_items: false,
            create_converted_folder: true,
            convert_categories: Vec::new(),
            target_environments: None,
        }
    }
}

impl PipelineOptions {
    /// Options from an INI config; absent keys keep their defaults
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            preserve_trimmed: config.get_bool_default("PreserveTrimmed", defaults.preserve_trimmed),
            nullify_variants: config.get_bool_default("NullifyVariants", defaults.nullify_variants),
            convert_ground: config.get_bool_default("ConvertGround", defaults.convert_ground),
            ignore_vegetation: config.get_bool_default("IgnoreVegetation", defaults.ignore_vegetation),
            convert_blocks_to_items: config
                .get_bool_default("ConvertBlocksToItems", defaults.convert_blocks_to_items),
            create_converted_folder: config
                .get_bool_default("CreateConvertedFolder", defaults.create_converted_folder),
            convert_categories: config
                .get_list("ConvertCategories")
                .unwrap_or(defaults.convert_categories),
            target_environments: config
                .get_list("TargetEnvironments")
                .map(|list| list.into_iter().collect())
                .or(defaults.target_environments),
        }
    }

    fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            nullify_variants: self.nullify_variants,
            convert_ground: self.convert_ground,
            skip_vista_deco_wall: self
                .convert_categories
                .iter()
                .any(|c| c == OVERRIDE_VISTA_DECOWALL),
        }
    }

    fn remap_options(&self) -> RemapOptions {
        RemapOptions {
            ignore_vegetation: self.ignore_vegetation,
        }
    }
}

/// Where a source record sits inside the game's Blocks folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    pub blocks_root: PathBuf,
    /// Folder of the source environment, directly below the Blocks root
    pub source_folder: String,
    /// Path below the source environment folder
    pub relative: PathBuf,
}

impl SourceLayout {
    /// The Blocks segment is matched case-insensitively; the game may be
    /// installed twice with differently cased folders.
    pub fn from_path(path: &Path) -> Result<Self> {
        let components: Vec<Component> = path.components().collect();
        let root = components.iter().position(|component| match component {
            Component::Normal(name) => name.to_string_lossy().eq_ignore_ascii_case(BLOCKS_DIR),
            _ => false,
        });

        match root {
            Some(idx) if components.len() > idx + 2 => Ok(Self {
                blocks_root: components[..=idx].iter().collect(),
                source_folder: components[idx + 1].as_os_str().to_string_lossy().into_owned(),
                relative: components[idx + 2..].iter().collect(),
            }),
            _ => Err(ConvertError::SourceLayoutInvalid {
                path: path.to_path_buf(),
            }),
        }
    }

    /// `<blocks root>/<environment>/[Converted/]<relative>`
    pub fn destination(&self, environment: &str, converted_folder: bool) -> PathBuf {
        let mut path = self.blocks_root.join(environment);
        if converted_folder {
            path.push(CONVERTED_DIR);
        }
        path.join(&self.relative)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Converted { written: Vec<PathBuf> },
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub converted: usize,
    pub skipped: usize,
    pub cancelled: usize,
    /// Destination files written
    pub written: usize,
}

pub struct Pipeline<'a> {
    tables: &'a ConversionTables,
    items: Option<&'a ItemMetadataTable>,
    codec: &'a dyn RecordCodec,
    log: &'a dyn LogSink,
    options: PipelineOptions,
    block_to_item: HashMap<String, String>,
    stop: Option<&'a AtomicBool>,
}

impl<'a> Pipeline<'a> {
    /// `items` is the metadata of the locally available replacement items;
    /// without it block-to-item conversion is disabled.
    pub fn new(
        tables: &'a ConversionTables,
        items: Option<&'a ItemMetadataTable>,
        codec: &'a dyn RecordCodec,
        log: &'a dyn LogSink,
        options: PipelineOptions,
    ) -> Self {
        if options.convert_blocks_to_items && items.is_none() {
            log.warn("Block to item conversion disabled: replacement items are missing.");
        }
        for target in options.target_environments.iter().flatten() {
            if tables.environment_id(target).is_none() {
                log.warn(&format!("Unknown target environment '{target}' ignored."));
            }
        }
        let block_to_item = tables.block_to_item_for(&options.convert_categories);

        Self {
            tables,
            items,
            codec,
            log,
            options,
            block_to_item,
            stop: None,
        }
    }

    /// Records not yet started are left alone once `stop` is set
    pub fn with_stop_flag(mut self, stop: &'a AtomicBool) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Requested destinations other than the source environment
    pub fn destinations(&self, source_environment: i32) -> Vec<(&str, i32)> {
        self.tables
            .environments
            .iter()
            .filter(|(name, id)| {
                **id != source_environment
                    && self
                        .options
                        .target_environments
                        .as_ref()
                        .is_none_or(|targets| targets.contains(*name))
            })
            .map(|(name, id)| (name.as_str(), *id))
            .collect()
    }

    /// Filters the record and appends converted items. The returned record is
    /// the shared starting point for every destination.
    pub fn prepare(&self, mut record: MacroblockRecord) -> Result<MacroblockRecord> {
        record.auto_terrains.clear();

        let filter = BlockFilter::new(self.tables, self.options.filter_options());
        let valid_blocks = filter.filter(&mut record.blocks);

        if self.options.convert_blocks_to_items
            && let Some(metadata) = self.items
        {
            let converter = ItemConverter::new(&self.block_to_item, metadata);
            let items = converter.convert(&record.blocks);
            detail_log!("{} blocks replaced by items in {}", items.len(), record.ident.name);
            record.items.extend(items);
        }

        if valid_blocks.is_empty() && record.items.is_empty() {
            return Err(ConvertError::NoConvertibleContent);
        }
        if !self.options.preserve_trimmed && valid_blocks.len() < record.blocks.len() {
            return Err(ConvertError::PartiallyInvalidRecord {
                kept: valid_blocks.len(),
                total: record.blocks.len(),
            });
        }

        record.blocks = valid_blocks;
        Ok(record)
    }

    /// One remapped record per destination environment, in memory
    pub fn convert(&self, record: MacroblockRecord) -> Result<Vec<(String, MacroblockRecord)>> {
        let prepared = self.prepare(record)?;
        let remapper = EnvironmentRemapper::new(self.tables, self.options.remap_options());
        detail_log!(
            "{} from {}: {} blocks, {} items",
            prepared.ident.name,
            self.tables.environment_name(prepared.environment()).unwrap_or("unknown environment"),
            prepared.blocks.len(),
            prepared.items.len()
        );
        Ok(self
            .destinations(prepared.environment())
            .into_iter()
            .map(|(name, id)| (name.to_string(), remapper.remap(&prepared, id)))
            .collect())
    }

    pub fn process_record(&self, source: &Path, layout: &SourceLayout) -> RecordOutcome {
        if self.stop.is_some_and(|stop| stop.load(Ordering::SeqCst)) {
            return RecordOutcome::Cancelled;
        }

        let record = match self.codec.read(source) {
            Ok(record) => record,
            Err(err) => {
                self.log.warn(&format!("Error processing file {}: {}", source.display(), err));
                return RecordOutcome::Skipped;
            }
        };

        let converted = match self.convert(record) {
            Ok(converted) => converted,
            Err(err) => {
                self.log.warn(&format!("{} skipped: {}", source.display(), err));
                return RecordOutcome::Skipped;
            }
        };

        let mut written = Vec::with_capacity(converted.len());
        for (environment, record) in &converted {
            let destination = layout.destination(environment, self.options.create_converted_folder);
            if let Err(err) = self.write(record, &destination) {
                self.log.warn(&format!("Error processing file {}: {}", source.display(), err));
                return RecordOutcome::Skipped;
            }
            written.push(destination);
        }

        self.log.info(&format!(
            "Converted {} from {} to {} environment(s).",
            source.display(),
            layout.source_folder,
            written.len()
        ));
        RecordOutcome::Converted { written }
    }

    fn write(&self, record: &MacroblockRecord, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            // create_dir_all tolerates directories created concurrently
            fs::create_dir_all(parent).map_err(|err| ConvertError::record_io(parent, err))?;
        }
        self.codec.write(record, destination)
    }

    /// Converts every source. Fails before touching any record when a source
    /// does not live inside a Blocks folder.
    pub fn run(&self, sources: &[PathBuf], threads: usize) -> Result<Summary> {
        let mut jobs = Vec::with_capacity(sources.len());
        for source in sources {
            match SourceLayout::from_path(source) {
                Ok(layout) => jobs.push((source.as_path(), layout)),
                Err(err) => {
                    self.log.warn(&err.to_string());
                    return Err(err);
                }
            }
        }

        let skipped = AtomicUsize::new(0);
        let cancelled = AtomicUsize::new(0);
        let written = AtomicUsize::new(0);
        let work = |(source, layout): &(&Path, SourceLayout)| match self.process_record(source, layout) {
            RecordOutcome::Converted { written: paths } => {
                written.fetch_add(paths.len(), Ordering::Relaxed);
            }
            RecordOutcome::Skipped => {
                skipped.fetch_add(1, Ordering::Relaxed);
            }
            RecordOutcome::Cancelled => {
                cancelled.fetch_add(1, Ordering::Relaxed);
            }
        };

        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| jobs.par_iter().for_each(work)),
            Err(e) => {
                tracing::warn!("Failed to create thread pool: {}, using single-threaded", e);
                jobs.iter().for_each(work);
            }
        }

        let skipped = skipped.into_inner();
        let cancelled = cancelled.into_inner();
        let summary = Summary {
            total: sources.len(),
            converted: sources.len() - skipped - cancelled,
            skipped,
            cancelled,
            written: written.into_inner(),
        };

        self.log.info("=== Summary ===");
        self.log.info(&format!("Converted: {}", summary.converted));
        self.log.info(&format!("Skipped: {}", summary.skipped));
        if summary.cancelled > 0 {
            self.log.info(&format!("Cancelled: {}", summary.cancelled));
        }
        Ok(summary)
    }
}
