pub mod cache;
pub mod predict;
pub mod queue;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use tracing::{debug, warn};

use crate::geo::{LatLng, TileCoord};
use crate::route::Route;
use crate::store::TileReader;
use cache::TileMemoryCache;
use predict::MovementTracker;
use queue::{LoadQueue, TileLoadRequest};

pub use cache::VectorTile;
pub use queue::Priority;

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Upper bound on simultaneous store fetches.
    pub max_concurrent: usize,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Route points scanned ahead of the viewport for the high tier.
    pub route_lookahead_points: usize,
    /// Every Nth lookahead point is sampled.
    pub route_sample_stride: usize,
    /// Ring distance for the medium surrounding-buffer tier.
    pub surround_radius: i64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            cache_capacity: 500,
            cache_ttl: Duration::from_secs(300),
            route_lookahead_points: 50,
            route_sample_stride: 5,
            surround_radius: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: f64,
    pub bounds: ViewportBounds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cached_tiles: usize,
    pub cache_size: u64,
    pub queue_length: usize,
    pub active_loads: usize,
}

type TileCallback = Box<dyn Fn(TileCoord) + Send + Sync>;

struct LoaderState {
    queue: LoadQueue,
    in_flight: HashSet<TileCoord>,
    cache: TileMemoryCache,
    tracker: MovementTracker,
    route: Option<Route>,
}

struct LoaderShared {
    state: Mutex<LoaderState>,
    epoch: AtomicU64,
    callback: Mutex<Option<TileCallback>>,
    store_path: PathBuf,
}

impl LoaderShared {
    fn notify(&self, tile: TileCoord) {
        let callback = self.callback.lock().expect("callback lock poisoned");
        if let Some(cb) = callback.as_ref() {
            cb(tile);
        }
    }
}

/// Progressive tile loader: a priority queue of fetch requests drained by a
/// bounded pool of worker threads, each reading through its own read-only
/// store connection, populating a shared in-memory cache.
///
/// Tile state moves Unrequested -> Queued -> Fetching -> Cached. Duplicate
/// scheduling is resolved by skip-if-cached/in-flight checks at both enqueue
/// and dequeue; a failed fetch just releases its in-flight slot, leaving the
/// tile eligible for a later request.
pub struct ProgressiveLoader {
    shared: Arc<LoaderShared>,
    wake_tx: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
    immediate_reader: Mutex<TileReader>,
    config: LoaderConfig,
}

impl ProgressiveLoader {
    /// Opens the store read-only and spawns the worker pool. An unopenable
    /// store is fatal here, unlike per-tile read failures during travel.
    pub fn new(store_path: &Path, config: LoaderConfig) -> Result<Self> {
        let immediate_reader = TileReader::open(store_path)
            .context("progressive loader failed to open tile store")?;

        let shared = Arc::new(LoaderShared {
            state: Mutex::new(LoaderState {
                queue: LoadQueue::new(),
                in_flight: HashSet::new(),
                cache: TileMemoryCache::new(config.cache_capacity, config.cache_ttl),
                tracker: MovementTracker::new(),
                route: None,
            }),
            epoch: AtomicU64::new(0),
            callback: Mutex::new(None),
            store_path: store_path.to_path_buf(),
        });

        let (wake_tx, wake_rx) = crossbeam_channel::unbounded::<()>();
        let mut workers = Vec::with_capacity(config.max_concurrent.max(1));
        for worker_id in 0..config.max_concurrent.max(1) {
            let shared = Arc::clone(&shared);
            let rx = wake_rx.clone();
            workers.push(std::thread::spawn(move || worker_loop(worker_id, shared, rx)));
        }

        Ok(Self {
            shared,
            wake_tx: Some(wake_tx),
            workers,
            immediate_reader: Mutex::new(immediate_reader),
            config,
        })
    }

    pub fn set_route(&self, route: Route) {
        let mut state = self.lock_state();
        state.route = Some(route);
    }

    pub fn on_tile_loaded(&self, callback: impl Fn(TileCoord) + Send + Sync + 'static) {
        let mut slot = self.shared.callback.lock().expect("callback lock poisoned");
        *slot = Some(Box::new(callback));
    }

    /// Four-tier scheduling pass for a camera/position update.
    ///
    /// The immediate tier (tiles covering the viewport) is fetched on the
    /// caller's thread and has completed or failed by the time this returns;
    /// the high (route lookahead), medium (surrounding ring), and low
    /// (motion-predicted) tiers drain in the background in priority order.
    pub fn load_tiles_for_view(&self, viewport: &Viewport) {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let zoom = viewport
            .zoom
            .floor()
            .clamp(0.0, f64::from(crate::geo::MAX_TILE_ZOOM)) as u8;

        {
            let mut state = self.lock_state();
            state.tracker.record(viewport.center);
        }

        self.fetch_immediate(&viewport_tiles(viewport, zoom));
        self.schedule_route_lookahead(viewport, zoom, epoch);
        self.schedule_surrounding(viewport, zoom, epoch);
        self.schedule_predicted(zoom, epoch);
    }

    /// Enqueue tiles for background fetch, skipping any that are already
    /// cached or in flight.
    pub fn request_tiles(&self, tiles: &[TileCoord], priority: Priority) {
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        self.request_tiles_at_epoch(tiles, priority, epoch);
    }

    fn request_tiles_at_epoch(&self, tiles: &[TileCoord], priority: Priority, epoch: u64) {
        let mut scheduled = 0usize;
        {
            let mut state = self.lock_state();
            for &tile in tiles {
                if state.cache.contains(&tile) || state.in_flight.contains(&tile) {
                    continue;
                }
                state.queue.push(tile, priority, epoch);
                scheduled += 1;
            }
        }
        if let Some(tx) = &self.wake_tx {
            for _ in 0..scheduled {
                let _ = tx.send(());
            }
        }
    }

    fn fetch_immediate(&self, tiles: &[TileCoord]) {
        let reader = self.immediate_reader.lock().expect("reader lock poisoned");
        for &tile in tiles {
            if self.lock_state().cache.contains(&tile) {
                continue;
            }
            match reader.read_tile(tile) {
                Ok(Some(data)) => {
                    let mut state = self.lock_state();
                    state.cache.insert(tile, VectorTile::new(data));
                    drop(state);
                    self.shared.notify(tile);
                }
                Ok(None) => debug!(%tile, "immediate tile not in offline store"),
                Err(err) => warn!(%tile, error = %err, "immediate tile read failed"),
            }
        }
    }

    fn schedule_route_lookahead(&self, viewport: &Viewport, zoom: u8, epoch: u64) {
        let tiles = {
            let state = self.lock_state();
            let Some(route) = state.route.as_ref() else {
                return;
            };
            let Some(start) = route.closest_point_index(viewport.center) else {
                return;
            };
            let end = (start + self.config.route_lookahead_points).min(route.points.len());
            let mut tiles = Vec::new();
            for index in (start..end).step_by(self.config.route_sample_stride.max(1)) {
                let center = TileCoord::from_lat_lng(route.points[index], zoom);
                for dx in -1..=1 {
                    for dy in -1..=1 {
                        if let Some(tile) = center.offset(dx, dy) {
                            tiles.push(tile);
                        }
                    }
                }
            }
            tiles
        };
        self.request_tiles_at_epoch(&tiles, Priority::High, epoch);
    }

    fn schedule_surrounding(&self, viewport: &Viewport, zoom: u8, epoch: u64) {
        let center = TileCoord::from_lat_lng(viewport.center, zoom);
        let radius = self.config.surround_radius;
        let mut tiles = Vec::new();
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                // The inner 3x3 block is already covered by the viewport.
                if dx.abs() <= 1 && dy.abs() <= 1 {
                    continue;
                }
                if let Some(tile) = center.offset(dx, dy) {
                    tiles.push(tile);
                }
            }
        }
        self.request_tiles_at_epoch(&tiles, Priority::Medium, epoch);
    }

    fn schedule_predicted(&self, zoom: u8, epoch: u64) {
        let tiles = {
            let state = self.lock_state();
            state.tracker.predict_next_tiles(zoom)
        };
        if !tiles.is_empty() {
            self.request_tiles_at_epoch(&tiles, Priority::Low, epoch);
        }
    }

    /// Pure cache lookup; never triggers a fetch.
    pub fn get_tile(&self, coord: &TileCoord) -> Option<VectorTile> {
        self.lock_state().cache.get(coord)
    }

    pub fn is_tile_loaded(&self, coord: &TileCoord) -> bool {
        self.lock_state().cache.contains(coord)
    }

    pub fn cache_stats(&self) -> CacheStats {
        let state = self.lock_state();
        CacheStats {
            cached_tiles: state.cache.len(),
            cache_size: state.cache.size_bytes(),
            queue_length: state.queue.len(),
            active_loads: state.in_flight.len(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LoaderState> {
        self.shared.state.lock().expect("loader state lock poisoned")
    }
}

impl Drop for ProgressiveLoader {
    fn drop(&mut self) {
        // Closing the wake channel lets each worker observe shutdown once its
        // current fetch finishes.
        self.wake_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(worker_id: usize, shared: Arc<LoaderShared>, wake_rx: Receiver<()>) {
    let reader = match TileReader::open(&shared.store_path) {
        Ok(reader) => reader,
        Err(err) => {
            warn!(worker_id, error = %err, "loader worker could not open store");
            return;
        }
    };

    while wake_rx.recv().is_ok() {
        let Some(request) = next_request(&shared) else {
            continue;
        };
        let result = reader.read_tile(request.tile);
        complete_request(&shared, &request, result);
    }
}

/// Pop the highest-priority request that is still worth fetching. Requests
/// that became cached or in-flight since enqueue, or whose viewport epoch has
/// fallen more than one generation behind, are dropped here.
fn next_request(shared: &LoaderShared) -> Option<TileLoadRequest> {
    let current_epoch = shared.epoch.load(Ordering::SeqCst);
    let mut state = shared.state.lock().expect("loader state lock poisoned");
    while let Some(request) = state.queue.pop() {
        if state.cache.contains(&request.tile) || state.in_flight.contains(&request.tile) {
            continue;
        }
        if request.epoch + 1 < current_epoch {
            debug!(tile = %request.tile, epoch = request.epoch, "dropping stale request");
            continue;
        }
        state.in_flight.insert(request.tile);
        return Some(request);
    }
    None
}

fn complete_request(
    shared: &LoaderShared,
    request: &TileLoadRequest,
    result: Result<Option<Vec<u8>>>,
) {
    let current_epoch = shared.epoch.load(Ordering::SeqCst);
    let loaded = {
        let mut state = shared.state.lock().expect("loader state lock poisoned");
        state.in_flight.remove(&request.tile);
        match result {
            Ok(Some(data)) => {
                if request.epoch + 1 < current_epoch {
                    debug!(tile = %request.tile, "dropping stale fetch result");
                    false
                } else {
                    state.cache.insert(request.tile, VectorTile::new(data));
                    true
                }
            }
            Ok(None) => {
                debug!(tile = %request.tile, "tile not in offline store");
                false
            }
            Err(err) => {
                // Per-tile failures never abort the batch or the worker.
                warn!(tile = %request.tile, error = %err, "tile fetch failed");
                false
            }
        }
    };
    if loaded {
        shared.notify(request.tile);
    }
}

fn viewport_tiles(viewport: &Viewport, zoom: u8) -> Vec<TileCoord> {
    let nw = TileCoord::from_lat_lng(
        LatLng::new(viewport.bounds.north, viewport.bounds.west),
        zoom,
    );
    let se = TileCoord::from_lat_lng(
        LatLng::new(viewport.bounds.south, viewport.bounds.east),
        zoom,
    );
    let (x0, x1) = (nw.x.min(se.x), nw.x.max(se.x));
    let (y0, y1) = (nw.y.min(se.y), nw.y.max(se.y));
    let mut tiles = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
    for x in x0..=x1 {
        for y in y0..=y1 {
            tiles.push(TileCoord::new(zoom, x, y));
        }
    }
    tiles
}
