//! Standard quadtree tile layout.
//!
//! A pyramid of depth `p` has `2^p x 2^p` leaf tiles. Every tile is addressed
//! by its quadrant digits from the root down, where a digit is
//! `x_bit + 2 * y_bit`. An inner tile at zoom `z` lives at
//! `digits[..z-1]/digits[z-1]` and its children in `digits[..z]/{0,1,2,3}`.

use std::path::PathBuf;

use super::{InnerTile, LeafTile, TileRange};

/// Tile columns covered by one leaf tile.
pub const TILE_COLS: i64 = 2;

/// Tile rows covered by one leaf tile.
pub const TILE_ROWS: i64 = 4;

/// Name of the single tile at zoom 0.
pub const ROOT_TILE_NAME: &str = "base";

/// Deepest zoom a layout can address. Deeper layouts have no tiles.
pub const MAX_DEPTH: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadtreeLayout {
    depth: u32,
    min_col: i64,
    min_row: i64,
}

impl QuadtreeLayout {
    pub fn new(depth: u32, min_col: i64, min_row: i64) -> Self {
        Self { depth, min_col, min_row }
    }

    /// Layout whose leaf grid is centred on tile coordinate (0, 0).
    pub fn centered(depth: u32) -> Self {
        let side = side(depth).unwrap_or(0) as i64;
        Self::new(depth, -(side * TILE_COLS) / 2, -(side * TILE_ROWS) / 2)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of leaf tiles, `4^depth`.
    pub fn leaf_count(&self) -> u64 {
        tiles_at(self.depth)
    }

    /// Number of tiles at `zoom`, `4^zoom`.
    pub fn inner_count(&self, zoom: u32) -> u64 {
        tiles_at(zoom)
    }

    pub fn leaf_tiles(&self) -> impl Iterator<Item = LeafTile> + '_ {
        let side = side(self.depth).unwrap_or(0);
        (0..side * side).map(move |i| {
            let (tx, ty) = (i % side, i / side);
            let col = self.min_col + tx as i64 * TILE_COLS;
            let row = self.min_row + ty as i64 * TILE_ROWS;
            let digits = quadrant_digits(tx, ty, self.depth);
            let path = if digits.is_empty() {
                PathBuf::from(ROOT_TILE_NAME)
            } else {
                digits.iter().map(|d| d.to_string()).collect()
            };
            LeafTile {
                range: TileRange::new(col, col + TILE_COLS, row, row + TILE_ROWS),
                path,
            }
        })
    }

    pub fn inner_tiles(&self, zoom: u32) -> impl Iterator<Item = InnerTile> {
        let side = side(zoom).unwrap_or(0);
        (0..side * side).map(move |i| {
            let digits = quadrant_digits(i % side, i / side, zoom);
            match digits.split_last() {
                Some((last, parents)) => InnerTile {
                    dest: parents.iter().map(|d| d.to_string()).collect(),
                    name: last.to_string(),
                },
                None => InnerTile { dest: PathBuf::new(), name: ROOT_TILE_NAME.to_string() },
            }
        })
    }
}

/// Tiles along one edge at `zoom`, or `None` past [`MAX_DEPTH`].
fn side(zoom: u32) -> Option<u64> {
    (zoom <= MAX_DEPTH).then(|| 1u64 << zoom)
}

fn tiles_at(zoom: u32) -> u64 {
    4u64.saturating_pow(zoom)
}

fn quadrant_digits(tx: u64, ty: u64, len: u32) -> Vec<u8> {
    (0..len)
        .rev()
        .map(|bit| (((tx >> bit) & 1) + 2 * ((ty >> bit) & 1)) as u8)
        .collect()
}
