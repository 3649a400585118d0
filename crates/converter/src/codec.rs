// Record storage boundary
// The engine only sees typed records; these traits are where a container
// format plugs in. JsonCodec is the bundled implementation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConvertError, Result};
use crate::items::ItemDefinition;
use crate::record::MacroblockRecord;

pub trait RecordCodec: Send + Sync {
    fn read(&self, path: &Path) -> Result<MacroblockRecord>;

    /// Must either produce the complete file at `path` or leave nothing there
    fn write(&self, record: &MacroblockRecord, path: &Path) -> Result<()>;
}

/// Source of item definitions, addressed by their catalogue path
pub trait ItemSource {
    /// `Ok(None)` when the item is not present
    fn load(&self, item_path: &str) -> Result<Option<ItemDefinition>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl RecordCodec for JsonCodec {
    fn read(&self, path: &Path) -> Result<MacroblockRecord> {
        let text = fs::read_to_string(path).map_err(|err| ConvertError::record_io(path, err))?;
        serde_json::from_str(&text).map_err(|err| ConvertError::record_io(path, err))
    }

    fn write(&self, record: &MacroblockRecord, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record).map_err(|err| ConvertError::record_io(path, err))?;
        write_atomic(path, &bytes)
    }
}

/// Writes into a sibling temporary file and renames it over `path`
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ConvertError::record_io(path, "destination has no file name"))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(".partial");
    let temp = path.with_file_name(temp_name);

    let result = fs::write(&temp, bytes).and_then(|_| fs::rename(&temp, path));
    if let Err(err) = result {
        let _ = fs::remove_file(&temp);
        return Err(ConvertError::record_io(path, err));
    }
    Ok(())
}

/// Item definitions stored as JSON files under a root directory
#[derive(Debug, Clone)]
pub struct JsonItemSource {
    root: PathBuf,
}

impl JsonItemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ItemSource for JsonItemSource {
    fn load(&self, item_path: &str) -> Result<Option<ItemDefinition>> {
        let path = item_path
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part));
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|err| ConvertError::record_io(&path, err))?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| ConvertError::record_io(&path, err))
    }
}
