// Environment remapping
// Produces one destination-specific copy of a filtered macroblock.

use crate::record::{MacroblockRecord, PlacedItem};
use crate::tables::{BASE_ENVIRONMENT_ID, ConversionTables};

const DECO_WALL_BASE: &str = "DecoWallBase";
const DECO_WALL_BASE_PILLAR: &str = "DecoWallBasePillar";

#[derive(Debug, Clone, Copy, Default)]
pub struct RemapOptions {
    /// Drop stock vegetation items instead of leaving them in their own theme
    pub ignore_vegetation: bool,
}

/// Deco wall bases are different assets in the base theme and in the vistas
fn remap_block_name(name: &str, destination: i32) -> &str {
    if destination == BASE_ENVIRONMENT_ID {
        if name == DECO_WALL_BASE_PILLAR { DECO_WALL_BASE } else { name }
    } else if name == DECO_WALL_BASE {
        DECO_WALL_BASE_PILLAR
    } else {
        name
    }
}

pub struct EnvironmentRemapper<'a> {
    tables: &'a ConversionTables,
    options: RemapOptions,
}

impl<'a> EnvironmentRemapper<'a> {
    pub fn new(tables: &'a ConversionTables, options: RemapOptions) -> Self {
        Self { tables, options }
    }

    /// Returns a rewritten copy; `record` itself is never modified
    pub fn remap(&self, record: &MacroblockRecord, destination: i32) -> MacroblockRecord {
        let mut remapped = record.clone();
        remapped.ident = remapped.ident.with_environment(destination);
        remapped.auto_terrains.clear();

        for block in &mut remapped.blocks {
            if let Some(ident) = block.ident.as_mut() {
                ident.name = remap_block_name(&ident.name, destination).to_string();
                ident.environment = destination;
            }
        }

        if self.options.ignore_vegetation {
            remapped.items.retain(|item| !self.is_stock_vegetation(item));
        }
        for item in &mut remapped.items {
            if self.follows_destination(item) {
                item.ident.environment = destination;
            }
        }

        remapped
    }

    fn is_stock_vegetation(&self, item: &PlacedItem) -> bool {
        item.ident.is_official() && self.tables.is_vegetation(&item.ident.name)
    }

    /// Stock items move along so they stay selectable in the editor, except
    /// vegetation (not shared by every theme) and alternate-vehicle items
    fn follows_destination(&self, item: &PlacedItem) -> bool {
        item.ident.is_official()
            && !self.tables.is_vegetation(&item.ident.name)
            && !self.tables.is_alt_vehicle_item(&item.ident.name)
    }
}

#[cfg(test)]
mod tests {
    use glam::{IVec3, Vec3};

    use super::*;
    use crate::record::{BlockFlags, Direction, Ident, PlacedBlock, NADEO_AUTHOR};
    use crate::tables::tests::fixture;

    fn record() -> MacroblockRecord {
        let mut record = MacroblockRecord::new(Ident::new("MyMacro", 26, "player"));
        for name in ["DecoWallBase", "DecoWallBasePillar", "RoadTechStraight"] {
            record.blocks.push(PlacedBlock::new(
                Ident::new(name, 26, NADEO_AUTHOR),
                IVec3::ZERO,
                Direction::North,
                BlockFlags::default(),
            ));
        }
        for (name, author) in [
            ("Flag", NADEO_AUTHOR),
            ("PalmTree", NADEO_AUTHOR),
            ("RallyFlag", NADEO_AUTHOR),
            ("0-B-NoUpload\\MacroblockConverter\\Wall.Item.Gbx", "player"),
        ] {
            record.items.push(PlacedItem::new(Ident::new(name, 26, author), Vec3::ZERO));
        }
        record
    }

    fn names(record: &MacroblockRecord) -> Vec<&str> {
        record.blocks.iter().filter_map(|b| b.name()).collect()
    }

    #[test]
    fn test_deco_wall_base_swap() {
        let tables = fixture();
        let remapper = EnvironmentRemapper::new(&tables, RemapOptions::default());
        let source = record();

        let vista = remapper.remap(&source, 28);
        assert_eq!(names(&vista), vec!["DecoWallBasePillar", "DecoWallBasePillar", "RoadTechStraight"]);
        assert!(vista.blocks.iter().all(|b| b.ident.as_ref().unwrap().environment == 28));
        assert_eq!(vista.ident.environment, 28);

        let stadium = remapper.remap(&vista, BASE_ENVIRONMENT_ID);
        assert_eq!(names(&stadium), vec!["DecoWallBase", "DecoWallBase", "RoadTechStraight"]);
    }

    #[test]
    fn test_source_left_untouched() {
        let tables = fixture();
        let remapper = EnvironmentRemapper::new(&tables, RemapOptions { ignore_vegetation: true });
        let source = record();
        let before = source.clone();
        let _ = remapper.remap(&source, 15);
        let _ = remapper.remap(&source, 16);
        assert_eq!(source, before);
    }

    #[test]
    fn test_item_environments() {
        let tables = fixture();
        let remapper = EnvironmentRemapper::new(&tables, RemapOptions::default());
        let remapped = remapper.remap(&record(), 29);
        let envs: Vec<i32> = remapped.items.iter().map(|i| i.ident.environment).collect();
        assert_eq!(envs, vec![29, 26, 26, 26]);
    }

    #[test]
    fn test_ignore_vegetation_strips_stock_vegetation() {
        let tables = fixture();
        let remapper = EnvironmentRemapper::new(&tables, RemapOptions { ignore_vegetation: true });
        let mut source = record();
        source
            .items
            .push(PlacedItem::new(Ident::new("PalmTree", 26, "player"), Vec3::ZERO));
        let remapped = remapper.remap(&source, 16);
        let items: Vec<&str> = remapped.items.iter().map(|i| i.ident.name.as_str()).collect();
        assert_eq!(
            items,
            vec!["Flag", "RallyFlag", "0-B-NoUpload\\MacroblockConverter\\Wall.Item.Gbx", "PalmTree"]
        );
    }
}
