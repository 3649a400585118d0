// Block to item conversion
// Blocks without an equivalent in the destination theme can be swapped for a
// free-standing item with the same footprint. This module derives per-item
// placement metadata and computes item placements from block placements.

use std::collections::{BTreeSet, HashMap};
use std::f32::consts::FRAC_PI_2;

use glam::{EulerRot, IVec3, Quat, Vec3};
use mbconv_shared::sink::LogSink;
use serde::{Deserialize, Serialize};

use crate::codec::ItemSource;
use crate::error::Result;
use crate::record::{Direction, GRID_UNIT, Ident, PlacedBlock, PlacedItem, PlacementMode};
use crate::tables::{ConversionTables, ITEM_ENVIRONMENT_ID};

/// Folder (inside the user's item library) holding the replacement items
pub const ITEM_PATH_PREFIX: &str = "0-B-NoUpload/MacroblockConverter/";

/// Pitch within this distance of +-pi/2 takes the vertical placement path
const VERTICAL_TOLERANCE: f32 = 0.01;

/// Placement-relevant parts of an item's own definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub author: String,
    #[serde(default)]
    pub pivot_positions: Vec<Vec3>,
    #[serde(default = "default_snap_distance")]
    pub pivot_snap_distance: f32,
    /// Vertex positions of the first mesh layer
    #[serde(default)]
    pub mesh_positions: Vec<Vec3>,
}

fn default_snap_distance() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub author: String,
    pub pivot: Vec3,
    /// Footprint in grid cells
    pub size: IVec3,
}

impl ItemMetadata {
    /// Items with declared pivots use the first one. Items converted without
    /// pivots are aligned by their horizontal footprint, measured from the
    /// mesh bounds and rounded half to even; the height is left at 0.
    pub fn from_definition(definition: &ItemDefinition) -> Self {
        if let Some(first) = definition.pivot_positions.first() {
            return Self {
                author: definition.author.clone(),
                pivot: *first * definition.pivot_snap_distance,
                size: IVec3::ZERO,
            };
        }

        let size = match definition.mesh_positions.split_first() {
            Some((first, rest)) => {
                let (min, max) = rest
                    .iter()
                    .fold((*first, *first), |(min, max), v| (min.min(*v), max.max(*v)));
                let cells = (max - min) / GRID_UNIT;
                IVec3::new(cells.x.round_ties_even() as i32, 0, cells.z.round_ties_even() as i32)
            }
            None => IVec3::ZERO,
        };

        Self {
            author: definition.author.clone(),
            pivot: Vec3::ZERO,
            size,
        }
    }
}

/// Metadata keyed by source block name
pub type ItemMetadataTable = HashMap<String, ItemMetadata>;

/// Every catalogued replacement item that could be found locally
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    pub metadata: ItemMetadataTable,
    pub catalogued: usize,
}

impl ItemCatalog {
    pub fn load(tables: &ConversionTables, source: &dyn ItemSource, log: &dyn LogSink) -> Result<Self> {
        log.info("Checking local items...");

        let mut block_names = BTreeSet::new();
        let mut metadata = ItemMetadataTable::new();
        for mapping in tables.block_to_item.values() {
            for (block, item_path) in mapping {
                block_names.insert(block.clone());
                match source.load(item_path)? {
                    Some(definition) => {
                        metadata.insert(block.clone(), ItemMetadata::from_definition(&definition));
                    }
                    None => log.warn(&format!("Missing item {item_path} (for {block})")),
                }
            }
        }

        Ok(Self {
            metadata,
            catalogued: block_names.len(),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.metadata.len() == self.catalogued
    }

    pub fn missing(&self) -> usize {
        self.catalogued.saturating_sub(self.metadata.len())
    }
}

pub struct ItemConverter<'a> {
    block_to_item: &'a HashMap<String, String>,
    metadata: &'a ItemMetadataTable,
}

impl<'a> ItemConverter<'a> {
    pub fn new(block_to_item: &'a HashMap<String, String>, metadata: &'a ItemMetadataTable) -> Self {
        Self {
            block_to_item,
            metadata,
        }
    }

    pub fn convert(&self, blocks: &[PlacedBlock]) -> Vec<PlacedItem> {
        blocks.iter().filter_map(|block| self.convert_block(block)).collect()
    }

    /// `None` when the block has no mapped item or no defined transform
    pub fn convert_block(&self, block: &PlacedBlock) -> Option<PlacedItem> {
        let name = block.name()?;
        let item_path = self.block_to_item.get(name)?;
        let Some(meta) = self.metadata.get(name) else {
            tracing::debug!("No metadata for item replacing {}", name);
            return None;
        };

        let path = format!("{ITEM_PATH_PREFIX}{item_path}").replace('/', "\\");
        let mut item = PlacedItem::new(Ident::new(path, ITEM_ENVIRONMENT_ID, meta.author.clone()), meta.pivot);
        item.color = block.color;

        match block.placement_mode() {
            mode if mode.is_axis_aligned() => place_on_grid(block, meta, &mut item),
            PlacementMode::Free => place_free(block, meta.pivot, &mut item),
            _ => return None,
        }
        Some(item)
    }
}

/// Grid placement: the item turns in quarter steps and its anchor moves by the
/// rotated footprint so it covers the same cells as the block did.
fn place_on_grid(block: &PlacedBlock, meta: &ItemMetadata, item: &mut PlacedItem) {
    let depth = meta.size.z;
    let offset = match block.direction {
        Direction::North => IVec3::ZERO,
        Direction::East => IVec3::new(1, 0, 0) * depth,
        Direction::South => IVec3::new(1, 0, 1) * depth,
        Direction::West => IVec3::new(0, 0, 1) * depth,
    };

    item.pitch_yaw_roll = Vec3::new(block.direction.item_yaw(), 0.0, 0.0);
    item.block_coord = block.coord + offset;
    item.absolute_position = item.block_coord.as_vec3() * GRID_UNIT - item.pivot;
}

/// Free placement. The first rotation component is the heading.
fn place_free(block: &PlacedBlock, pivot: Vec3, item: &mut PlacedItem) {
    let Vec3 { x: pitch, y: yaw, z: roll } = block.pitch_yaw_roll;

    let offset = if (pitch.abs() - FRAC_PI_2).abs() < VERTICAL_TOLERANCE {
        // composing all three angles here runs into gimbal lock
        let angle = if pitch > 0.0 { -(yaw - roll) } else { yaw + roll };
        let rotated = Quat::from_axis_angle(Vec3::X, angle) * pivot;
        if pitch > 0.0 {
            Vec3::new(rotated.x, -rotated.y, -rotated.z)
        } else {
            Vec3::new(-rotated.x, -rotated.y, rotated.z)
        }
    } else {
        Quat::from_euler(EulerRot::YXZ, pitch, yaw, roll) * -pivot
    };

    item.absolute_position = block.absolute_position + offset;
    item.block_coord = grid_cell(item.absolute_position);
    item.pitch_yaw_roll = block.pitch_yaw_roll;
}

/// Grid cell containing a world position; floors so negative positions
/// land in the cell below zero
pub fn grid_cell(position: Vec3) -> IVec3 {
    (position / GRID_UNIT).floor().as_ivec3()
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use mbconv_shared::sink::MemorySink;

    use super::*;
    use crate::error::ConvertError;
    use crate::record::{BlockFlags, NADEO_AUTHOR};

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-3
    }

    fn setup(size: IVec3, pivot: Vec3) -> (HashMap<String, String>, ItemMetadataTable) {
        let mapping = HashMap::from([(
            "TrackWallStraight".to_string(),
            "TrackWall/TrackWallStraight.Item.Gbx".to_string(),
        )]);
        let metadata = HashMap::from([(
            "TrackWallStraight".to_string(),
            ItemMetadata {
                author: "converter".to_string(),
                pivot,
                size,
            },
        )]);
        (mapping, metadata)
    }

    fn wall(coord: IVec3, direction: Direction, mode: PlacementMode) -> PlacedBlock {
        PlacedBlock::new(
            Ident::new("TrackWallStraight", 26, NADEO_AUTHOR),
            coord,
            direction,
            BlockFlags::from_parts(mode, 0),
        )
    }

    #[test]
    fn test_axis_aligned_east() {
        let (mapping, metadata) = setup(IVec3::new(1, 0, 2), Vec3::new(-16.0, 0.0, -16.0));
        let converter = ItemConverter::new(&mapping, &metadata);
        let mut block = wall(IVec3::new(3, 0, 5), Direction::East, PlacementMode::Normal);
        block.color = 3;

        let item = converter.convert_block(&block).unwrap();
        assert_eq!(item.pitch_yaw_roll, Vec3::new(-FRAC_PI_2, 0.0, 0.0));
        assert_eq!(item.block_coord, IVec3::new(5, 0, 5));
        assert_eq!(item.absolute_position, Vec3::new(176.0, 0.0, 176.0));
        assert_eq!(item.pivot, Vec3::new(-16.0, 0.0, -16.0));
        assert_eq!(item.color, 3);
    }

    #[test]
    fn test_axis_aligned_offsets_per_direction() {
        let (mapping, metadata) = setup(IVec3::new(0, 0, 3), Vec3::ZERO);
        let converter = ItemConverter::new(&mapping, &metadata);
        let expected = [
            (Direction::North, IVec3::new(0, 1, 0), 0.0),
            (Direction::South, IVec3::new(3, 1, 3), -PI),
            (Direction::West, IVec3::new(0, 1, 3), FRAC_PI_2),
        ];
        for (direction, coord, yaw) in expected {
            let item = converter
                .convert_block(&wall(IVec3::new(0, 1, 0), direction, PlacementMode::Ground))
                .unwrap();
            assert_eq!(item.block_coord, coord, "{direction:?}");
            assert_eq!(item.pitch_yaw_roll.x, yaw);
            assert_eq!(item.absolute_position, coord.as_vec3() * GRID_UNIT);
        }
    }

    #[test]
    fn test_fixed_fields() {
        let (mapping, metadata) = setup(IVec3::ZERO, Vec3::ZERO);
        let converter = ItemConverter::new(&mapping, &metadata);
        let item = converter
            .convert_block(&wall(IVec3::ZERO, Direction::North, PlacementMode::Air))
            .unwrap();
        assert_eq!(item.ident.name, "0-B-NoUpload\\MacroblockConverter\\TrackWall\\TrackWallStraight.Item.Gbx");
        assert_eq!(item.ident.environment, ITEM_ENVIRONMENT_ID);
        assert_eq!(item.ident.author, "converter");
        assert_eq!(item.scale, 1.0);
        assert_eq!(item.version, 14);
        assert_eq!(item.snap_flag, 1);
        assert_eq!(item.unused_coord, IVec3::splat(-1));
        assert_eq!(item.unused_scalar, -1);
    }

    #[test]
    fn test_unmapped_and_unknown_modes_skipped() {
        let (mapping, metadata) = setup(IVec3::ZERO, Vec3::ZERO);
        let converter = ItemConverter::new(&mapping, &metadata);
        let mut other = wall(IVec3::ZERO, Direction::North, PlacementMode::Normal);
        other.ident = Some(Ident::new("RoadTechStraight", 26, NADEO_AUTHOR));
        let odd = wall(IVec3::ZERO, Direction::North, PlacementMode::Unknown(9));
        let ok = wall(IVec3::ZERO, Direction::North, PlacementMode::Normal);
        assert_eq!(converter.convert(&[other, odd, ok]).len(), 1);
    }

    #[test]
    fn test_free_general_rotation() {
        let (mapping, metadata) = setup(IVec3::ZERO, Vec3::new(16.0, 0.0, 16.0));
        let converter = ItemConverter::new(&mapping, &metadata);

        let mut block = wall(IVec3::ZERO, Direction::North, PlacementMode::Free);
        block.absolute_position = Vec3::new(100.0, 10.0, 100.0);
        let item = converter.convert_block(&block).unwrap();
        assert!(close(item.absolute_position, Vec3::new(84.0, 10.0, 84.0)));
        assert_eq!(item.block_coord, IVec3::new(2, 1, 2));

        // half a turn around the vertical axis sends the pivot the other way
        block.pitch_yaw_roll = Vec3::new(PI, 0.0, 0.0);
        let item = converter.convert_block(&block).unwrap();
        assert!(close(item.absolute_position, Vec3::new(116.0, 10.0, 116.0)));
        assert_eq!(item.pitch_yaw_roll, block.pitch_yaw_roll);
    }

    #[test]
    fn test_free_vertical_rotation() {
        let (mapping, metadata) = setup(IVec3::ZERO, Vec3::new(16.0, 4.0, 8.0));
        let converter = ItemConverter::new(&mapping, &metadata);

        let mut block = wall(IVec3::ZERO, Direction::North, PlacementMode::Free);
        block.pitch_yaw_roll = Vec3::new(FRAC_PI_2, 0.0, 0.0);
        let item = converter.convert_block(&block).unwrap();
        assert!(close(item.absolute_position, Vec3::new(16.0, -4.0, -8.0)));
        assert_eq!(item.block_coord, IVec3::new(0, -1, -1));

        let (mapping, metadata) = setup(IVec3::ZERO, Vec3::new(0.0, 0.0, 16.0));
        let converter = ItemConverter::new(&mapping, &metadata);
        block.pitch_yaw_roll = Vec3::new(-FRAC_PI_2 + 0.005, FRAC_PI_2, 0.0);
        let item = converter.convert_block(&block).unwrap();
        assert!(close(item.absolute_position, Vec3::new(0.0, 16.0, 0.0)));
    }

    #[test]
    fn test_free_rotation_composes_heading_pitch_roll() {
        let (mapping, metadata) = setup(IVec3::ZERO, Vec3::new(16.0, -4.0, 8.0));
        let converter = ItemConverter::new(&mapping, &metadata);

        // heading about Y, then pitch about X, then roll about Z
        let mut block = wall(IVec3::ZERO, Direction::North, PlacementMode::Free);
        block.pitch_yaw_roll = Vec3::new(0.7, -0.4, 1.1);
        let item = converter.convert_block(&block).unwrap();
        assert!(
            close(item.absolute_position, Vec3::new(-9.90225, -14.57789, 5.04287)),
            "{:?}",
            item.absolute_position
        );
        assert_eq!(item.block_coord, IVec3::new(-1, -2, 0));
        assert_eq!(item.pitch_yaw_roll, block.pitch_yaw_roll);
    }

    #[test]
    fn test_free_vertical_rotation_uses_roll() {
        let (mapping, metadata) = setup(IVec3::ZERO, Vec3::new(0.0, 0.0, 16.0));
        let converter = ItemConverter::new(&mapping, &metadata);
        let mut block = wall(IVec3::ZERO, Direction::North, PlacementMode::Free);

        // pitch up: angle is roll - yaw = 0.2
        block.pitch_yaw_roll = Vec3::new(FRAC_PI_2, 0.3, 0.5);
        let item = converter.convert_block(&block).unwrap();
        assert!(
            close(item.absolute_position, Vec3::new(0.0, 3.17871, -15.68107)),
            "{:?}",
            item.absolute_position
        );

        // pitch down: angle is yaw + roll = 0.8
        block.pitch_yaw_roll = Vec3::new(-FRAC_PI_2, 0.3, 0.5);
        let item = converter.convert_block(&block).unwrap();
        assert!(
            close(item.absolute_position, Vec3::new(0.0, 11.47770, 11.14731)),
            "{:?}",
            item.absolute_position
        );
    }

    #[test]
    fn test_grid_cell_floors_negatives() {
        assert_eq!(grid_cell(Vec3::new(-1.0, -1.0, -1.0)), IVec3::new(-1, -1, -1));
        assert_eq!(grid_cell(Vec3::new(31.9, 8.0, 64.0)), IVec3::new(0, 1, 2));
        assert_eq!(grid_cell(Vec3::new(-32.0, -8.5, 0.0)), IVec3::new(-1, -2, 0));
    }

    #[test]
    fn test_metadata_from_pivots() {
        let definition = ItemDefinition {
            author: "converter".to_string(),
            pivot_positions: vec![Vec3::new(-2.0, 0.0, -2.0), Vec3::ONE],
            pivot_snap_distance: 8.0,
            mesh_positions: vec![Vec3::ZERO, Vec3::splat(64.0)],
        };
        let meta = ItemMetadata::from_definition(&definition);
        assert_eq!(meta.pivot, Vec3::new(-16.0, 0.0, -16.0));
        assert_eq!(meta.size, IVec3::ZERO);
    }

    #[test]
    fn test_metadata_from_mesh_bounds() {
        let definition = ItemDefinition {
            author: "converter".to_string(),
            pivot_positions: Vec::new(),
            pivot_snap_distance: 1.0,
            mesh_positions: vec![
                Vec3::new(-1.0, 0.0, 0.0),
                Vec3::new(63.0, 15.0, 95.0),
                Vec3::new(10.0, 3.0, 40.0),
            ],
        };
        let meta = ItemMetadata::from_definition(&definition);
        assert_eq!(meta.pivot, Vec3::ZERO);
        assert_eq!(meta.size, IVec3::new(2, 0, 3));
    }

    #[test]
    fn test_mesh_footprint_rounds_half_to_even() {
        let definition = ItemDefinition {
            author: "converter".to_string(),
            pivot_positions: Vec::new(),
            pivot_snap_distance: 1.0,
            mesh_positions: vec![Vec3::ZERO, Vec3::new(80.0, 20.0, 80.0)],
        };
        assert_eq!(ItemMetadata::from_definition(&definition).size, IVec3::new(2, 0, 2));

        let definition = ItemDefinition {
            mesh_positions: vec![Vec3::ZERO, Vec3::new(112.0, 0.0, 48.0)],
            ..definition
        };
        assert_eq!(ItemMetadata::from_definition(&definition).size, IVec3::new(4, 0, 2));

        // 2.5 cells deep: an East facing wall moves its anchor by 2, not 3
        let size = ItemMetadata::from_definition(&ItemDefinition {
            mesh_positions: vec![Vec3::ZERO, Vec3::new(32.0, 8.0, 80.0)],
            ..Default::default()
        })
        .size;
        let (mapping, metadata) = setup(size, Vec3::ZERO);
        let converter = ItemConverter::new(&mapping, &metadata);
        let item = converter
            .convert_block(&wall(IVec3::new(1, 0, 1), Direction::East, PlacementMode::Normal))
            .unwrap();
        assert_eq!(item.block_coord, IVec3::new(3, 0, 1));
    }

    struct FixedSource;

    impl ItemSource for FixedSource {
        fn load(&self, item_path: &str) -> Result<Option<ItemDefinition>> {
            if item_path.contains("Curve") {
                return Ok(None);
            }
            if item_path.contains("Broken") {
                return Err(ConvertError::record_io(item_path, "bad item"));
            }
            Ok(Some(ItemDefinition {
                author: "converter".to_string(),
                ..Default::default()
            }))
        }
    }

    #[test]
    fn test_catalog_reports_missing_items() {
        let tables = crate::tables::tests::fixture();
        let log = MemorySink::new();
        let catalog = ItemCatalog::load(&tables, &FixedSource, &log).unwrap();
        assert_eq!(catalog.catalogued, 3);
        assert_eq!(catalog.missing(), 1);
        assert!(!catalog.is_complete());
        assert!(catalog.metadata.contains_key("TrackWallStraight"));
        assert_eq!(log.count_containing("Missing item"), 1);
    }
}
