//! End-to-end tests for level-by-level distribution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tilepyramid::pyramid::{ChunkRef, InnerTile, LeafTile, Pyramid, TileIter, TileRange, ROOT_TILE_NAME};
use tilepyramid::scheduler::{resolve_concurrency, DistributorOptions, DrainPolicy};
use tilepyramid::synthetic::{MarkerPyramid, SyntheticWorld};
use tilepyramid::{DistributeError, RenderError, WorkerFailure};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Leaf { pyramid: usize },
    Inner { pyramid: usize, zoom: u32 },
    Root { pyramid: usize },
}

type EventLog = Arc<Mutex<Vec<Event>>>;

/// Wraps a marker pyramid and records every render call in order.
struct Recording {
    id: usize,
    inner: MarkerPyramid,
    log: EventLog,
    prepared: Arc<AtomicUsize>,
    fail_leaf: Option<PathBuf>,
    leaf_delay: Option<Duration>,
    panic_inner: bool,
}

impl Recording {
    fn new(id: usize, depth: u32, dir: &Path, log: &EventLog) -> Self {
        Self {
            id,
            inner: MarkerPyramid::centered(depth, dir.join(format!("p{id}"))),
            log: Arc::clone(log),
            prepared: Arc::new(AtomicUsize::new(0)),
            fail_leaf: None,
            leaf_delay: None,
            panic_inner: false,
        }
    }
}

impl Pyramid for Recording {
    fn depth(&self) -> u32 {
        self.inner.depth()
    }

    fn tile_dir(&self) -> &Path {
        self.inner.tile_dir()
    }

    fn prepare(&mut self, concurrency: usize) -> Result<(), RenderError> {
        self.prepared.store(concurrency, Ordering::SeqCst);
        self.inner.prepare(concurrency)
    }

    fn leaf_tiles(&self) -> TileIter<'_, LeafTile> {
        self.inner.leaf_tiles()
    }

    fn inner_tiles(&self, zoom: u32) -> TileIter<'_, InnerTile> {
        self.inner.inner_tiles(zoom)
    }

    fn render_leaf(&self, chunks: &[ChunkRef], range: &TileRange, dest: &Path) -> Result<(), RenderError> {
        if self.fail_leaf.as_deref().is_some_and(|bad| dest.ends_with(bad)) {
            return Err(RenderError::message("disk full"));
        }
        if let Some(delay) = self.leaf_delay {
            std::thread::sleep(delay);
        }
        self.log.lock().push(Event::Leaf { pyramid: self.id });
        self.inner.render_leaf(chunks, range, dest)
    }

    fn render_inner(&self, dest: &Path, name: &str) -> Result<(), RenderError> {
        if name == ROOT_TILE_NAME && dest == self.tile_dir() {
            self.log.lock().push(Event::Root { pyramid: self.id });
        } else {
            if self.panic_inner {
                panic!("compositor crashed");
            }
            let parents = dest.strip_prefix(self.tile_dir()).map(|p| p.components().count()).unwrap_or(0);
            self.log.lock().push(Event::Inner { pyramid: self.id, zoom: parents as u32 + 1 });
        }
        self.inner.render_inner(dest, name)
    }
}

fn world() -> Arc<SyntheticWorld> {
    Arc::new(SyntheticWorld::filled(16))
}

fn log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Rank of an event in the expected level order: leaves, then decreasing zoom, then roots.
fn phase(event: &Event, max_depth: u32) -> u32 {
    match event {
        Event::Leaf { .. } => 0,
        Event::Inner { zoom, .. } => max_depth - zoom,
        Event::Root { .. } => max_depth,
    }
}

fn marker_files(root: &Path) -> BTreeMap<PathBuf, String> {
    let mut files = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let contents = std::fs::read_to_string(&path).unwrap();
                files.insert(path.strip_prefix(root).unwrap().to_path_buf(), contents);
            }
        }
    }
    files
}

#[test]
fn every_level_completes_four_to_the_zoom() {
    let dir = tempfile::tempdir().unwrap();
    let events = log();
    let pyramids: Vec<Box<dyn Pyramid>> = vec![Box::new(Recording::new(0, 4, dir.path(), &events))];

    let summary = tilepyramid::run(pyramids, world(), 3).unwrap();

    let totals: Vec<(u32, u64, u64)> = summary.levels.iter().map(|l| (l.zoom, l.total, l.complete)).collect();
    assert_eq!(totals, vec![(4, 256, 256), (3, 64, 64), (2, 16, 16), (1, 4, 4)]);
    assert_eq!(summary.max_level, 4);
    assert_eq!(summary.workers, 3);
    assert_eq!(summary.total_complete(), 340);
}

#[test]
fn levels_never_overlap_and_roots_come_last() {
    let dir = tempfile::tempdir().unwrap();
    let events = log();
    let pyramids: Vec<Box<dyn Pyramid>> = vec![
        Box::new(Recording::new(0, 3, dir.path(), &events)),
        Box::new(Recording::new(1, 3, dir.path(), &events)),
    ];

    tilepyramid::run(pyramids, world(), 4).unwrap();

    let events = events.lock();
    let phases: Vec<u32> = events.iter().map(|e| phase(e, 3)).collect();
    assert!(phases.windows(2).all(|w| w[0] <= w[1]), "levels interleaved: {phases:?}");

    for id in 0..2 {
        let roots: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| **e == Event::Root { pyramid: id })
            .map(|(i, _)| i)
            .collect();
        assert_eq!(roots.len(), 1, "pyramid {id} root rendered {} times", roots.len());
        let last_other = events
            .iter()
            .rposition(|e| matches!(e, Event::Leaf { pyramid } | Event::Inner { pyramid, .. } if *pyramid == id))
            .unwrap();
        assert!(roots[0] > last_other);
    }
}

#[test]
fn mixed_depths_only_schedule_eligible_pyramids() {
    let dir = tempfile::tempdir().unwrap();
    let events = log();
    let pyramids: Vec<Box<dyn Pyramid>> = vec![
        Box::new(Recording::new(0, 3, dir.path(), &events)),
        Box::new(Recording::new(1, 1, dir.path(), &events)),
    ];

    let summary = tilepyramid::run(pyramids, world(), 2).unwrap();

    let totals: Vec<u64> = summary.levels.iter().map(|l| l.total).collect();
    assert_eq!(totals, vec![64 + 4, 16, 4 + 4]);
    assert_eq!(summary.roots_rendered, 2);

    let events = events.lock();
    assert!(!events.contains(&Event::Inner { pyramid: 1, zoom: 2 }));
    assert_eq!(events.iter().filter(|e| **e == Event::Inner { pyramid: 1, zoom: 1 }).count(), 4);
    // the shallow pyramid keeps its leaf output
    assert!(dir.path().join("p1").join("base.tile").is_file());
}

#[test]
fn inline_and_threaded_runs_write_identical_tiles() {
    let inline_dir = tempfile::tempdir().unwrap();
    let threaded_dir = tempfile::tempdir().unwrap();

    for (dir, concurrency) in [(&inline_dir, 1), (&threaded_dir, 4)] {
        let pyramids: Vec<Box<dyn Pyramid>> = vec![
            Box::new(MarkerPyramid::centered(3, dir.path().join("a"))),
            Box::new(MarkerPyramid::centered(2, dir.path().join("b"))),
        ];
        let summary = tilepyramid::run(pyramids, world(), concurrency).unwrap();
        assert_eq!(summary.workers, concurrency);
    }

    let inline = marker_files(inline_dir.path());
    assert!(!inline.is_empty());
    assert_eq!(inline, marker_files(threaded_dir.path()));
}

#[test]
fn leaf_failure_aborts_before_inner_levels() {
    let dir = tempfile::tempdir().unwrap();
    let events = log();
    let mut pyramid = Recording::new(0, 3, dir.path(), &events);
    pyramid.fail_leaf = Some(PathBuf::from("1/2/3"));

    let err = tilepyramid::run(vec![Box::new(pyramid)], world(), 2).unwrap_err();

    match err {
        DistributeError::Worker { level, source: WorkerFailure::Render { pyramid, dest, .. } } => {
            assert_eq!(level, 1);
            assert_eq!(pyramid, 0);
            assert!(dest.ends_with("1/2/3"));
        }
        other => panic!("expected worker render failure, got {other:?}"),
    }
    let events = events.lock();
    assert!(events.iter().all(|e| matches!(e, Event::Leaf { .. })));
}

#[test]
fn failure_stops_running_batches_between_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let events = log();
    let mut pyramid = Recording::new(0, 3, dir.path(), &events);
    // the first leaf fails at once; every other leaf is slow
    pyramid.fail_leaf = Some(PathBuf::from("0/0/0"));
    pyramid.leaf_delay = Some(Duration::from_millis(100));

    let started = Instant::now();
    let err = tilepyramid::run(vec![Box::new(pyramid)], world(), 2).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, DistributeError::Worker { level: 1, source: WorkerFailure::Render { .. } }));
    // a full 16-job batch on the other worker would take 1.6s
    assert!(elapsed < Duration::from_secs(1), "run took {elapsed:?} to fail");
    assert!(events.lock().len() < 16);
}

#[test]
fn timed_drain_resolves_every_batch() {
    let drain = DrainPolicy { interval: Duration::ZERO, chunk_budget: 1, ..DrainPolicy::default() };

    for concurrency in [1, 3] {
        let dir = tempfile::tempdir().unwrap();
        let pyramids: Vec<Box<dyn Pyramid>> = vec![
            Box::new(MarkerPyramid::centered(4, dir.path().join("a"))),
            Box::new(MarkerPyramid::centered(2, dir.path().join("b"))),
        ];
        let options = DistributorOptions::new(concurrency).with_drain(drain);

        let summary = tilepyramid::run_with_options(pyramids, world(), options).unwrap();

        let totals: Vec<u64> = summary.levels.iter().map(|l| l.total).collect();
        assert_eq!(totals, vec![272, 64, 32, 8]);
        assert!(summary.levels.iter().all(|l| l.complete == l.total), "{:?}", summary.levels);
        // every submission is followed by a one-batch drain
        assert_eq!(summary.peak_pending, 1);
    }
}

#[test]
fn oversized_depth_is_rejected_before_prepare() {
    let dir = tempfile::tempdir().unwrap();
    let events = log();
    let shallow = Recording::new(0, 2, dir.path(), &events);
    let prepared = Arc::clone(&shallow.prepared);
    let pyramids: Vec<Box<dyn Pyramid>> =
        vec![Box::new(shallow), Box::new(MarkerPyramid::centered(40, dir.path().join("deep")))];

    let err = tilepyramid::run(pyramids, world(), 2).unwrap_err();

    assert!(matches!(err, DistributeError::DepthTooLarge { index: 1, depth: 40, max: 30 }));
    assert_eq!(prepared.load(Ordering::SeqCst), 0);
}

#[test]
fn panic_in_renderer_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let events = log();
    let mut pyramid = Recording::new(0, 2, dir.path(), &events);
    pyramid.panic_inner = true;

    let err = tilepyramid::run(vec![Box::new(pyramid)], world(), 2).unwrap_err();

    assert!(matches!(
        err,
        DistributeError::Worker { level: 2, source: WorkerFailure::Panicked(ref msg) } if msg == "compositor crashed"
    ));
    assert!(!events.lock().iter().any(|e| matches!(e, Event::Root { .. })));
}

#[test]
fn empty_pyramid_set_is_rejected() {
    let result = tilepyramid::run(Vec::new(), world(), 2);
    assert!(matches!(result, Err(DistributeError::NoPyramids)));
}

#[test]
fn prepare_receives_resolved_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let events = log();
    let pyramid = Recording::new(0, 1, dir.path(), &events);
    let prepared = Arc::clone(&pyramid.prepared);

    tilepyramid::run(vec![Box::new(pyramid)], world(), 0).unwrap();

    assert_eq!(prepared.load(Ordering::SeqCst), resolve_concurrency(0));
}

#[test]
fn pending_depth_stays_under_high_water() {
    let dir = tempfile::tempdir().unwrap();
    let drain = DrainPolicy { high_water_budget: 160, low_water_budget: 40, ..DrainPolicy::default() };
    let options = DistributorOptions::new(2).with_drain(drain);
    let pyramids: Vec<Box<dyn Pyramid>> = vec![Box::new(MarkerPyramid::centered(5, dir.path()))];

    let summary = tilepyramid::run_with_options(pyramids, world(), options).unwrap();

    // 1024 leaves in batches of 16, high water 160 / 16
    assert_eq!(summary.levels[0].complete, 1024);
    assert!(summary.peak_pending >= 1);
    assert!(summary.peak_pending <= 10, "peak {}", summary.peak_pending);
}

#[test]
fn cancelled_run_reports_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let options = DistributorOptions::new(1).with_cancel(cancel);
    let pyramids: Vec<Box<dyn Pyramid>> = vec![Box::new(MarkerPyramid::centered(2, dir.path()))];

    let err = tilepyramid::run_with_options(pyramids, world(), options).unwrap_err();

    assert!(err.is_cancellation());
    assert!(!dir.path().join("base.tile").exists());
}
