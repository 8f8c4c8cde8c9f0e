//! Pyramid and source dataset contracts.
//!
//! A pyramid (quadtree) is one independently renderable image hierarchy. All
//! pyramids in a run share one source dataset. Rendering itself is delegated
//! to the pyramid implementation; the scheduler only decides what to render
//! and when.

mod chunks;
mod job;
mod layout;

pub use chunks::{chunks_in_range, ChunkRef, REGION_SPAN, ROW_OVERSCAN};
pub use job::{InnerJob, InnerTile, IntoJob, JobBatch, LeafJob, LeafTile, PyramidIndex, TileRange};
pub use layout::{QuadtreeLayout, MAX_DEPTH, ROOT_TILE_NAME, TILE_COLS, TILE_ROWS};

use std::path::Path;
use std::sync::Arc;

use crate::error::RenderError;

/// Lazy, finite stream of tiles produced by a pyramid.
pub type TileIter<'a, T> = Box<dyn Iterator<Item = T> + 'a>;

/// One renderable tile pyramid.
///
/// Implementations are shared read-only with every worker once the run has
/// started, so the render methods take `&self`.
pub trait Pyramid: Send + Sync {
    /// Number of zoom levels. Level 0 is the root tile, level `depth` the finest.
    fn depth(&self) -> u32;

    /// Directory that tile paths are relative to.
    fn tile_dir(&self) -> &Path;

    /// Level-independent setup, run once before any job is generated.
    fn prepare(&mut self, _concurrency: usize) -> Result<(), RenderError> {
        Ok(())
    }

    /// Leaf tiles for the base (highest zoom) level.
    fn leaf_tiles(&self) -> TileIter<'_, LeafTile>;

    /// Inner tiles for `zoom`. Only called when `zoom <= depth()`.
    fn inner_tiles(&self, zoom: u32) -> TileIter<'_, InnerTile>;

    /// Render one leaf tile from source chunks.
    ///
    /// `chunks` may be empty; the renderer must then remove any stale output at `dest`.
    fn render_leaf(&self, chunks: &[ChunkRef], range: &TileRange, dest: &Path) -> Result<(), RenderError>;

    /// Compose tile `name` in directory `dest` from its four children.
    fn render_inner(&self, dest: &Path, name: &str) -> Result<(), RenderError>;
}

/// Storage region holding a block of source chunks.
pub trait Region: Send + Sync {
    /// Location of the region, for diagnostics and renderers.
    fn path(&self) -> &Path;

    fn chunk_exists(&self, chunk_x: i64, chunk_y: i64) -> bool;
}

/// The source dataset every pyramid renders from.
pub trait SourceDataset: Send + Sync {
    /// Convert tile column/row into native chunk coordinates.
    ///
    /// Tile space is a diagonal projection of chunk space; callers only pass
    /// pairs where `col` and `row` share parity, so the halving is exact.
    fn unconvert_coords(&self, col: i64, row: i64) -> (i64, i64) {
        ((col - row) / 2, (col + row) / 2)
    }

    /// Region covering region coordinate `(region_x, region_y)`, if any.
    fn region(&self, region_x: i64, region_y: i64) -> Option<Arc<dyn Region>>;
}
