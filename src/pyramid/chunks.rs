//! Source-chunk resolution for leaf tiles.

use std::fmt;
use std::sync::Arc;

use super::{Region, SourceDataset, TileRange};

/// Chunks per region side.
pub const REGION_SPAN: i64 = 32;

/// Rows above a tile's range whose chunks can still draw into it.
pub const ROW_OVERSCAN: i64 = 16;

/// A source chunk intersecting a tile.
#[derive(Clone)]
pub struct ChunkRef {
    pub col: i64,
    pub row: i64,
    pub chunk_x: i64,
    pub chunk_y: i64,
    pub region: Arc<dyn Region>,
}

impl fmt::Debug for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkRef")
            .field("col", &self.col)
            .field("row", &self.row)
            .field("chunk_x", &self.chunk_x)
            .field("chunk_y", &self.chunk_y)
            .field("region", &self.region.path())
            .finish()
    }
}

/// Enumerate the present source chunks that draw into `range`.
///
/// Only (row, col) pairs of equal parity map onto a chunk; mixed-parity pairs
/// would reference the same chunk twice. Order is not significant.
pub fn chunks_in_range(source: &dyn SourceDataset, range: &TileRange) -> Vec<ChunkRef> {
    let mut chunks = Vec::new();
    for row in (range.row_start - ROW_OVERSCAN)..=range.row_end {
        for col in range.col_start..=range.col_end {
            if row.rem_euclid(2) != col.rem_euclid(2) {
                continue;
            }
            let (chunk_x, chunk_y) = source.unconvert_coords(col, row);
            let Some(region) = source.region(chunk_x.div_euclid(REGION_SPAN), chunk_y.div_euclid(REGION_SPAN))
            else {
                continue;
            };
            if region.chunk_exists(chunk_x, chunk_y) {
                chunks.push(ChunkRef { col, row, chunk_x, chunk_y, region });
            }
        }
    }
    chunks
}
