// In-memory macroblock model
// The container format is handled elsewhere; everything here is plain data
// plus the bit layout of the block flags field.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Author of every stock asset
pub const NADEO_AUTHOR: &str = "Nadeo";

/// Size of one block grid cell in world units
pub const GRID_UNIT: Vec3 = Vec3::new(32.0, 8.0, 32.0);

/// Identity of a block, item or macroblock: (name, environment, author)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub environment: i32,
    pub author: String,
}

impl Ident {
    pub fn new(name: impl Into<String>, environment: i32, author: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment,
            author: author.into(),
        }
    }

    /// Stock game asset, the only kind eligible for conversion
    pub fn is_official(&self) -> bool {
        self.author == NADEO_AUTHOR
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn with_environment(&self, environment: i32) -> Self {
        Self {
            environment,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    North,
    East,
    South,
    West,
}

impl Direction {
    /// Direction rotated by 180 degrees
    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    /// Heading an item needs to face the same way as a block
    pub fn item_yaw(self) -> f32 {
        match self {
            Direction::North => 0.0,
            Direction::East => -FRAC_PI_2,
            Direction::South => -PI,
            Direction::West => FRAC_PI_2,
        }
    }
}

/// Placement style stored in the high byte of the block flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementMode {
    Normal,
    Ground,
    Air,
    GroundGhost,
    /// Air ghost, placed with an arbitrary position and rotation
    Free,
    Unknown(u8),
}

impl PlacementMode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => PlacementMode::Normal,
            1 => PlacementMode::Ground,
            2 => PlacementMode::Air,
            3 => PlacementMode::GroundGhost,
            4 => PlacementMode::Free,
            other => PlacementMode::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            PlacementMode::Normal => 0,
            PlacementMode::Ground => 1,
            PlacementMode::Air => 2,
            PlacementMode::GroundGhost => 3,
            PlacementMode::Free => 4,
            PlacementMode::Unknown(other) => other,
        }
    }

    /// Snapped to the grid with one of the four cardinal directions
    pub fn is_axis_aligned(self) -> bool {
        self.to_byte() < 4
    }

    pub fn is_grounded(self) -> bool {
        matches!(self, PlacementMode::Ground | PlacementMode::GroundGhost)
    }
}

/// Packed block state: high byte is the placement mode, the low 24 bits hold
/// variant, color and other per-block state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockFlags(u32);

impl BlockFlags {
    const MODE_SHIFT: u32 = 24;
    const MODE_MASK: u32 = 0xFF00_0000;
    const STATE_MASK: u32 = 0x00FF_FFFF;

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn from_parts(mode: PlacementMode, state: u32) -> Self {
        Self(((mode.to_byte() as u32) << Self::MODE_SHIFT) | (state & Self::STATE_MASK))
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn placement_mode(self) -> PlacementMode {
        PlacementMode::from_byte((self.0 >> Self::MODE_SHIFT) as u8)
    }

    /// Low 24 bits: variant index and other theme specific state
    pub fn state_bits(self) -> u32 {
        self.0 & Self::STATE_MASK
    }

    /// Keeps the placement mode byte and clears everything else
    pub fn with_masked_variant(self) -> Self {
        Self(self.0 & Self::MODE_MASK)
    }

    /// Replaces the placement mode byte, leaving the low 24 bits intact
    pub fn with_placement_mode(self, mode: PlacementMode) -> Self {
        Self::from_parts(mode, self.state_bits())
    }
}

/// One block stamped down by a macroblock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedBlock {
    pub ident: Option<Ident>,
    pub coord: IVec3,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub flags: BlockFlags,
    /// Only meaningful in free placement mode
    #[serde(default)]
    pub pitch_yaw_roll: Vec3,
    /// Only meaningful in free placement mode
    #[serde(default)]
    pub absolute_position: Vec3,
    #[serde(default)]
    pub color: u8,
}

impl PlacedBlock {
    pub fn new(ident: Ident, coord: IVec3, direction: Direction, flags: BlockFlags) -> Self {
        Self {
            ident: Some(ident),
            coord,
            direction,
            flags,
            pitch_yaw_roll: Vec3::ZERO,
            absolute_position: Vec3::ZERO,
            color: 0,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.ident.as_ref().map(|ident| ident.name.as_str())
    }

    pub fn placement_mode(&self) -> PlacementMode {
        self.flags.placement_mode()
    }
}

/// One free-standing item stamped down by a macroblock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedItem {
    pub ident: Ident,
    pub pivot: Vec3,
    pub absolute_position: Vec3,
    pub block_coord: IVec3,
    pub pitch_yaw_roll: Vec3,
    pub scale: f32,
    pub version: i32,
    pub color: u8,
    #[serde(default)]
    pub snap_flag: i32,
    #[serde(default = "unset_coord")]
    pub unused_coord: IVec3,
    #[serde(default = "unset_scalar")]
    pub unused_scalar: i32,
}

fn unset_coord() -> IVec3 {
    IVec3::splat(-1)
}

fn unset_scalar() -> i32 {
    -1
}

impl PlacedItem {
    pub const VERSION: i32 = 14;

    /// Item with the fixed fields every converted placement carries
    pub fn new(ident: Ident, pivot: Vec3) -> Self {
        Self {
            ident,
            pivot,
            absolute_position: Vec3::ZERO,
            block_coord: IVec3::ZERO,
            pitch_yaw_roll: Vec3::ZERO,
            scale: 1.0,
            version: Self::VERSION,
            color: 0,
            snap_flag: 1,
            unused_coord: unset_coord(),
            unused_scalar: unset_scalar(),
        }
    }
}

/// Terrain auto-generation reference; never survives a theme change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoTerrain {
    pub offset: IVec3,
    pub terrain: Option<Ident>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroblockRecord {
    /// Environment of this ident is the source theme
    pub ident: Ident,
    #[serde(default)]
    pub blocks: Vec<PlacedBlock>,
    #[serde(default)]
    pub items: Vec<PlacedItem>,
    #[serde(default)]
    pub auto_terrains: Vec<AutoTerrain>,
}

impl MacroblockRecord {
    pub fn new(ident: Ident) -> Self {
        Self {
            ident,
            blocks: Vec::new(),
            items: Vec::new(),
            auto_terrains: Vec::new(),
        }
    }

    pub fn environment(&self) -> i32 {
        self.ident.environment
    }
}
