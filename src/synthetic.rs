//! In-memory source dataset and marker-file pyramid.
//!
//! These stand in for a real world store and image renderer: the CLI demo
//! uses them to exercise the scheduler end to end, and the integration tests
//! use them as fixtures.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::RenderError;
use crate::pyramid::{
    ChunkRef, InnerTile, LeafTile, Pyramid, QuadtreeLayout, Region, SourceDataset, TileIter, TileRange, REGION_SPAN,
    ROOT_TILE_NAME,
};

/// Extension of the marker files written by [`MarkerPyramid`].
pub const MARKER_EXTENSION: &str = "tile";

/// A block of `REGION_SPAN x REGION_SPAN` chunks.
#[derive(Debug)]
pub struct SyntheticRegion {
    path: PathBuf,
    chunks: HashSet<(i64, i64)>,
}

impl Region for SyntheticRegion {
    fn path(&self) -> &Path {
        &self.path
    }

    fn chunk_exists(&self, chunk_x: i64, chunk_y: i64) -> bool {
        self.chunks.contains(&(chunk_x, chunk_y))
    }
}

/// Source dataset held entirely in memory.
#[derive(Debug, Default)]
pub struct SyntheticWorld {
    regions: HashMap<(i64, i64), Arc<SyntheticRegion>>,
}

impl SyntheticWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// World with every chunk in `[-radius, radius)` on both axes.
    pub fn filled(radius: i64) -> Self {
        let coords = (-radius..radius).flat_map(|x| (-radius..radius).map(move |y| (x, y)));
        Self::with_chunks(coords)
    }

    pub fn with_chunks(chunks: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let mut grouped: HashMap<(i64, i64), HashSet<(i64, i64)>> = HashMap::new();
        for (x, y) in chunks {
            grouped
                .entry((x.div_euclid(REGION_SPAN), y.div_euclid(REGION_SPAN)))
                .or_default()
                .insert((x, y));
        }
        let regions = grouped
            .into_iter()
            .map(|((rx, ry), chunks)| {
                let path = PathBuf::from(format!("r.{rx}.{ry}.mcr"));
                ((rx, ry), Arc::new(SyntheticRegion { path, chunks }))
            })
            .collect();
        Self { regions }
    }

    pub fn chunk_count(&self) -> usize {
        self.regions.values().map(|r| r.chunks.len()).sum()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

impl SourceDataset for SyntheticWorld {
    fn region(&self, region_x: i64, region_y: i64) -> Option<Arc<dyn Region>> {
        self.regions
            .get(&(region_x, region_y))
            .map(|r| Arc::clone(r) as Arc<dyn Region>)
    }
}

/// Pyramid that writes one small text file per tile.
///
/// Leaf markers record how many chunks drew into the tile; inner markers
/// record how many children were present. Tiles with nothing to show have
/// their marker removed. Inner requests for tiles at the pyramid's own leaf
/// zoom, which happen when it is shallower than others in the same run, leave
/// the leaf output untouched.
#[derive(Debug)]
pub struct MarkerPyramid {
    layout: QuadtreeLayout,
    tile_dir: PathBuf,
    prepared_with: Option<usize>,
    leaf_renders: AtomicUsize,
    inner_renders: AtomicUsize,
}

impl MarkerPyramid {
    pub fn new(layout: QuadtreeLayout, tile_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout,
            tile_dir: tile_dir.into(),
            prepared_with: None,
            leaf_renders: AtomicUsize::new(0),
            inner_renders: AtomicUsize::new(0),
        }
    }

    pub fn centered(depth: u32, tile_dir: impl Into<PathBuf>) -> Self {
        Self::new(QuadtreeLayout::centered(depth), tile_dir)
    }

    /// Concurrency passed to `prepare`, if it ran.
    pub fn prepared_with(&self) -> Option<usize> {
        self.prepared_with
    }

    pub fn leaf_renders(&self) -> usize {
        self.leaf_renders.load(Ordering::Relaxed)
    }

    pub fn inner_renders(&self) -> usize {
        self.inner_renders.load(Ordering::Relaxed)
    }

    /// Zoom of the inner tile `name` in directory `dest`.
    fn zoom_of(&self, dest: &Path, name: &str) -> u32 {
        if name == ROOT_TILE_NAME {
            return 0;
        }
        let parents = dest.strip_prefix(&self.tile_dir).map(|rel| rel.components().count()).unwrap_or(0);
        parents as u32 + 1
    }
}

/// Marker file for the tile at `dest` (a path without extension).
pub fn marker_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".");
    name.push(MARKER_EXTENSION);
    PathBuf::from(name)
}

fn write_marker(path: &Path, contents: &str) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RenderError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| RenderError::io(path, e))
}

fn remove_marker(path: &Path) -> Result<(), RenderError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RenderError::io(path, e)),
    }
}

impl Pyramid for MarkerPyramid {
    fn depth(&self) -> u32 {
        self.layout.depth()
    }

    fn tile_dir(&self) -> &Path {
        &self.tile_dir
    }

    fn prepare(&mut self, concurrency: usize) -> Result<(), RenderError> {
        fs::create_dir_all(&self.tile_dir).map_err(|e| RenderError::io(&self.tile_dir, e))?;
        self.prepared_with = Some(concurrency);
        Ok(())
    }

    fn leaf_tiles(&self) -> TileIter<'_, LeafTile> {
        Box::new(self.layout.leaf_tiles())
    }

    fn inner_tiles(&self, zoom: u32) -> TileIter<'_, InnerTile> {
        Box::new(self.layout.inner_tiles(zoom))
    }

    fn render_leaf(&self, chunks: &[ChunkRef], range: &TileRange, dest: &Path) -> Result<(), RenderError> {
        self.leaf_renders.fetch_add(1, Ordering::Relaxed);
        let marker = marker_path(dest);
        if chunks.is_empty() {
            return remove_marker(&marker);
        }
        write_marker(
            &marker,
            &format!(
                "leaf chunks={} cols={}..{} rows={}..{}\n",
                chunks.len(),
                range.col_start,
                range.col_end,
                range.row_start,
                range.row_end
            ),
        )
    }

    fn render_inner(&self, dest: &Path, name: &str) -> Result<(), RenderError> {
        self.inner_renders.fetch_add(1, Ordering::Relaxed);
        if self.zoom_of(dest, name) >= self.depth() {
            // drawn by the leaf pass
            return Ok(());
        }
        // The root's children sit beside it rather than in a folder of its own.
        let children_dir = if name == ROOT_TILE_NAME { dest.to_path_buf() } else { dest.join(name) };
        let present = (0..4)
            .filter(|q| marker_path(&children_dir.join(q.to_string())).is_file())
            .count();
        let marker = marker_path(&dest.join(name));
        if present == 0 {
            return remove_marker(&marker);
        }
        write_marker(&marker, &format!("inner children={present}\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::chunks_in_range;

    #[test]
    fn test_filled_world_groups_regions() {
        let world = SyntheticWorld::filled(40);
        assert_eq!(world.chunk_count(), 80 * 80);
        // -40..40 spans regions -2..=1 on each axis
        assert_eq!(world.region_count(), 16);
        assert!(world.region(-2, 1).is_some());
        assert!(world.region(2, 0).is_none());
    }

    #[test]
    fn test_marker_path_appends_extension() {
        assert_eq!(marker_path(Path::new("/t/0/3")), PathBuf::from("/t/0/3.tile"));
        assert_eq!(marker_path(Path::new("/t/base")), PathBuf::from("/t/base.tile"));
    }

    #[test]
    fn test_leaf_marker_written_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let pyramid = MarkerPyramid::centered(1, dir.path());
        let world = SyntheticWorld::filled(4);
        let range = TileRange::new(0, 2, 0, 4);
        let dest = dir.path().join("3");

        let chunks = chunks_in_range(&world, &range);
        assert!(!chunks.is_empty());
        pyramid.render_leaf(&chunks, &range, &dest).unwrap();
        assert!(marker_path(&dest).is_file());

        pyramid.render_leaf(&[], &range, &dest).unwrap();
        assert!(!marker_path(&dest).exists());
        assert_eq!(pyramid.leaf_renders(), 2);
    }

    #[test]
    fn test_inner_render_keeps_leaf_output() {
        let dir = tempfile::tempdir().unwrap();
        let pyramid = MarkerPyramid::centered(1, dir.path());
        fs::write(dir.path().join("2.tile"), "leaf").unwrap();

        // zoom 1 is this pyramid's leaf level
        pyramid.render_inner(dir.path(), "2").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("2.tile")).unwrap(), "leaf");
        assert_eq!(pyramid.inner_renders(), 1);
    }

    #[test]
    fn test_root_counts_sibling_children() {
        let dir = tempfile::tempdir().unwrap();
        let pyramid = MarkerPyramid::centered(1, dir.path());
        fs::write(dir.path().join("0.tile"), "x").unwrap();
        fs::write(dir.path().join("2.tile"), "x").unwrap();

        pyramid.render_inner(dir.path(), ROOT_TILE_NAME).unwrap();
        let contents = fs::read_to_string(dir.path().join("base.tile")).unwrap();
        assert_eq!(contents, "inner children=2\n");
    }
}
