// Block filter
// Decides which placed blocks survive a theme change and rewrites the
// survivors' names and flags in place.

use std::f32::consts::PI;

use glam::Vec3;
use mbconv_shared::debug_log;

use crate::record::{PlacedBlock, PlacementMode};
use crate::tables::ConversionTables;

const TERRAIN_NAMES: [&str; 7] = ["Water", "Dirt", "Lake", "Grass", "Land", "Beach", "SeaCliff"];

#[derive(Debug, Clone, Copy, Default)]
pub struct FilterOptions {
    /// Clear variant bits of blocks not known to share variants across themes
    pub nullify_variants: bool,
    /// Turn ground and ground-ghost placements into air placements
    pub convert_ground: bool,
    /// Reject every block named in the vista deco-wall override table
    pub skip_vista_deco_wall: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Kept,
    NoIdentifier,
    ForeignAuthor,
    VistaOverride,
    /// Non-slope terrain block in free placement; no transform exists for it
    FreeTerrain,
    Banned,
}

/// "On<Terrain>..." infix of a block sitting on terrain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerrainInfix<'a> {
    pub text: &'a str,
    /// Trailing terrain height, if the name carries one
    pub height: Option<i32>,
}

impl<'a> TerrainInfix<'a> {
    /// Leftmost "On" + terrain word, everything up to the next digit run
    /// (or the end of the name), and that digit run.
    pub fn find(name: &'a str) -> Option<Self> {
        for (start, _) in name.match_indices("On") {
            let after_on = &name[start + 2..];
            let Some(terrain) = TERRAIN_NAMES.iter().find(|t| after_on.starts_with(*t)) else {
                continue;
            };

            let tail = &after_on[terrain.len()..];
            let digits_start = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
            let digits_len = tail[digits_start..]
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(tail.len() - digits_start);
            let end = start + 2 + terrain.len() + digits_start + digits_len;
            let digits = &tail[digits_start..digits_start + digits_len];

            return Some(Self {
                text: &name[start..end],
                height: digits.parse().ok(),
            });
        }
        None
    }
}

/// Heading mirrored by half a turn, wrapped to (-pi, pi]
fn mirror_yaw(yaw: f32) -> f32 {
    if yaw > 0.0 { yaw - PI } else { yaw + PI }
}

pub struct BlockFilter<'a> {
    tables: &'a ConversionTables,
    options: FilterOptions,
}

impl<'a> BlockFilter<'a> {
    pub fn new(tables: &'a ConversionTables, options: FilterOptions) -> Self {
        Self { tables, options }
    }

    /// Runs every block through [`Self::filter_block`] and returns copies of the
    /// survivors in their original order. Rejected blocks stay in `blocks`
    /// (the item converter still wants them) but are absent from the result.
    pub fn filter(&self, blocks: &mut [PlacedBlock]) -> Vec<PlacedBlock> {
        let mut kept = Vec::with_capacity(blocks.len());
        for block in blocks.iter_mut() {
            let verdict = self.filter_block(block);
            if verdict == Verdict::Kept {
                kept.push(block.clone());
            } else {
                debug_log!("Dropped {:?} (flags {:#010x}): {:?}", block.name(), block.flags.raw(), verdict);
            }
        }
        kept
    }

    pub fn filter_block(&self, block: &mut PlacedBlock) -> Verdict {
        let Some(ident) = block.ident.as_ref() else {
            return Verdict::NoIdentifier;
        };
        if !ident.is_official() {
            return Verdict::ForeignAuthor;
        }
        if self.options.skip_vista_deco_wall && self.tables.is_vista_override(&ident.name) {
            return Verdict::VistaOverride;
        }

        let mode = block.placement_mode();
        let mut name = ident.name.clone();

        // blocks on terrain become regular blocks
        if let Some(infix) = TerrainInfix::find(&ident.name) {
            name = name.replace(infix.text, "");
            if name.contains("Slope") {
                if name.contains("SlopeBase") {
                    // mirrored geometry
                    if mode.is_axis_aligned() {
                        block.direction = block.direction.opposite();
                    } else {
                        let pyr = block.pitch_yaw_roll;
                        block.pitch_yaw_roll = Vec3::new(-pyr.x, mirror_yaw(pyr.y), -pyr.z);
                    }
                }
                if name.contains("Platform") {
                    name = name.replace("SlopeBase2", "Slope2Base");
                }
            } else {
                // TODO: derive a transform for free-placed terrain blocks instead of dropping them
                if !mode.is_axis_aligned() {
                    return Verdict::FreeTerrain;
                }
                if name.contains("Diag") {
                    name.push_str("X2");
                }
                block.coord.y += infix.height.unwrap_or(1);
            }
        }

        if !self.tables.is_valid_name(&name) {
            return Verdict::Banned;
        }

        // surface variants collapse to one block in other themes
        if name.starts_with("DecoPlatformDirt") {
            name = name.replace("Dirt", "");
        } else if name.starts_with("DecoPlatformIce") {
            name = name.replace("Ice", "");
        }

        if self.options.nullify_variants && !self.tables.has_safe_variants(&name) {
            block.flags = block.flags.with_masked_variant();
        }
        if self.options.convert_ground && mode.is_grounded() {
            block.flags = block.flags.with_placement_mode(PlacementMode::Air);
        }
        block.ident = block.ident.take().map(|ident| ident.with_name(name));

        Verdict::Kept
    }
}
