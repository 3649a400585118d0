// Conversion symbol tables
// Loaded once per run and shared read-only by every worker.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{ConvertError, Result};

/// Theme every stock asset falls back to; also the theme of converted items
pub const BASE_ENVIRONMENT_ID: i32 = 26;
pub const ITEM_ENVIRONMENT_ID: i32 = 26;

/// Category whose block names are force-rejected when selected
pub const OVERRIDE_VISTA_DECOWALL: &str = "Override Vista DecoWall";

pub const CONVERSIONS_FILE: &str = "conversions.json";
pub const VEGETATION_FILE: &str = "vegetation.json";
pub const COLLECTIONS_FILE: &str = "collections.json";

const BAN_SUBSTRINGS: [&str; 18] = [
    // stadium
    "Snow", "Rally", "DecoWall", "TrackWall", "Canopy", "Water", "Stage", "Hill", "Cliff", "ToTheme", "Roulette",
    // vistas
    "Lake", "River", "Terrain", "Land", "Beach", "Sea", "Shore",
];

const ALLOW_SUBSTRINGS: [&str; 6] = [
    "DecoWallBase",
    "DecoWallSlope2Straight",
    "DecoWallDiag1",
    "StageTechnicsLight",
    "GameplayRally",
    "GameplaySnow",
];

const SAFE_VARIANT_SUBSTRINGS: [&str; 2] = ["StructureSupport", "StageTechnicsLight"];

const ALT_VEHICLE_PREFIXES: [&str; 3] = ["Snow", "Rally", "Desert"];

pub const DEFAULT_ENVIRONMENTS: [(&str, i32); 5] = [
    ("BlueBay", 28),
    ("GreenCoast", 15),
    ("RedIsland", 16),
    ("WhiteShore", 29),
    ("Stadium", 26),
];

/// Block name -> item path, grouped by user-selectable category
pub type CategoryMap = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone)]
pub struct ConversionTables {
    pub ban_substrings: Vec<String>,
    /// Checked after the ban list; a hit makes the name valid again
    pub allow_substrings: Vec<String>,
    pub environments: BTreeMap<String, i32>,
    pub block_to_item: CategoryMap,
    pub vegetation: HashSet<String>,
    pub safe_variant_substrings: Vec<String>,
    pub alt_vehicle_prefixes: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl ConversionTables {
    /// Built-in lists plus the two data tables that only exist on disk
    pub fn new(block_to_item: CategoryMap, vegetation: HashSet<String>) -> Self {
        Self {
            ban_substrings: owned(&BAN_SUBSTRINGS),
            allow_substrings: owned(&ALLOW_SUBSTRINGS),
            environments: DEFAULT_ENVIRONMENTS
                .iter()
                .map(|(name, id)| (name.to_string(), *id))
                .collect(),
            block_to_item,
            vegetation,
            safe_variant_substrings: owned(&SAFE_VARIANT_SUBSTRINGS),
            alt_vehicle_prefixes: owned(&ALT_VEHICLE_PREFIXES),
        }
    }

    /// Load tables from `dir`. `conversions.json` and `vegetation.json` are
    /// required, `collections.json` replaces the default environment list.
    pub fn load(dir: &Path) -> Result<Self> {
        let block_to_item: CategoryMap = read_json(&dir.join(CONVERSIONS_FILE))?;
        let vegetation: HashSet<String> = read_json(&dir.join(VEGETATION_FILE))?;
        let mut tables = Self::new(block_to_item, vegetation);

        let collections = dir.join(COLLECTIONS_FILE);
        if collections.exists() {
            tables.environments = read_json(&collections)?;
        }

        tracing::debug!(
            "Loaded {} categories, {} vegetation items, {} environments from {}",
            tables.block_to_item.len(),
            tables.vegetation.len(),
            tables.environments.len(),
            dir.display()
        );
        Ok(tables)
    }

    /// Ban list first, then the allow list overrides it
    pub fn is_valid_name(&self, name: &str) -> bool {
        let banned = self.ban_substrings.iter().any(|token| name.contains(token.as_str()));
        !banned || self.allow_substrings.iter().any(|token| name.contains(token.as_str()))
    }

    pub fn has_safe_variants(&self, name: &str) -> bool {
        self.safe_variant_substrings
            .iter()
            .any(|token| name.contains(token.as_str()))
    }

    pub fn environment_id(&self, name: &str) -> Option<i32> {
        self.environments.get(name).copied()
    }

    pub fn environment_name(&self, id: i32) -> Option<&str> {
        self.environments
            .iter()
            .find(|(_, env)| **env == id)
            .map(|(name, _)| name.as_str())
    }

    /// Union of the selected categories; later categories win on duplicate keys
    pub fn block_to_item_for(&self, categories: &[String]) -> HashMap<String, String> {
        self.block_to_item
            .iter()
            .filter(|(category, _)| categories.contains(*category))
            .flat_map(|(_, mapping)| mapping.iter())
            .map(|(block, item)| (block.clone(), item.clone()))
            .collect()
    }

    pub fn is_vista_override(&self, name: &str) -> bool {
        self.block_to_item
            .get(OVERRIDE_VISTA_DECOWALL)
            .is_some_and(|mapping| mapping.contains_key(name))
    }

    pub fn is_vegetation(&self, name: &str) -> bool {
        self.vegetation.contains(name)
    }

    pub fn is_alt_vehicle_item(&self, name: &str) -> bool {
        self.alt_vehicle_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(ConvertError::ConfigurationMissing {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path).map_err(|err| ConvertError::ConfigurationInvalid {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|err| ConvertError::ConfigurationInvalid {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}
