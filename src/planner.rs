use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::geo::{meters_per_tile, LatLng, TileCoord, METERS_PER_MILE};
use crate::route::{RoadType, Route, RouteSegment};

/// Tunable planning constants. The per-zoom size table and the assumed
/// compression ratio are seed defaults meant to be recalibrated from measured
/// ratios of representative tiles.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub budget_bytes: u64,
    /// Estimated compressed tile size by zoom, z8 through z16.
    pub tile_bytes_by_zoom: [u64; 9],
    pub assumed_compression_ratio: f64,
    /// Share of each unit's fair byte allocation reserved in the base pass.
    pub base_share: f64,
    /// Index and row overhead on top of raw tile bytes.
    pub database_overhead: f64,
    /// Corridor tiles assumed per route mile of detail, used for cost
    /// estimates in the detail pass.
    pub corridor_width_tiles: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 100 * 1024 * 1024,
            tile_bytes_by_zoom: [
                8 * 1024,  // z8
                10 * 1024, // z9
                13 * 1024, // z10
                16 * 1024, // z11
                20 * 1024, // z12
                25 * 1024, // z13
                30 * 1024, // z14
                35 * 1024, // z15
                40 * 1024, // z16
            ],
            assumed_compression_ratio: 0.4,
            base_share: 0.7,
            database_overhead: 0.05,
            corridor_width_tiles: 3,
        }
    }
}

impl PlannerConfig {
    pub fn tile_bytes_at_zoom(&self, zoom: u8) -> u64 {
        let clamped = zoom.clamp(8, 16);
        self.tile_bytes_by_zoom[(clamped - 8) as usize]
    }
}

/// One contiguous run of the route with a single zoom classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentPlan {
    pub start: LatLng,
    pub end: LatLng,
    pub start_index: usize,
    pub end_index: usize,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedSegment {
    pub plan: SegmentPlan,
    pub zoom_levels: Vec<u8>,
    pub allocated_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizedZoomPlan {
    pub segments: Vec<PlannedSegment>,
    pub total_size: u64,
    pub coverage: Vec<TileCoord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageEstimate {
    pub tile_data_size: u64,
    pub database_overhead: u64,
    pub total_size: u64,
    pub tiles_per_mile: f64,
    pub bytes_per_mile: f64,
    pub assumed_compression_ratio: f64,
}

fn classify_segment(segment: &RouteSegment) -> (u8, u8, u8) {
    if segment.road_type == RoadType::Highway && segment.speed_limit_mph > 55 {
        (8, 11, 1)
    } else if segment.is_urban || segment.has_complex_intersections {
        (12, 16, 3)
    } else {
        (10, 14, 2)
    }
}

/// Classify every route segment into a zoom range and priority, then merge
/// adjacent runs with identical classification so the plan stays proportional
/// to the number of distinct runs rather than the number of segments.
pub fn calculate_optimal_zoom_levels(route: &Route) -> Vec<SegmentPlan> {
    let mut plans: Vec<SegmentPlan> = Vec::new();
    for segment in &route.segments {
        let (min_zoom, max_zoom, priority) = classify_segment(segment);
        if let Some(last) = plans.last_mut() {
            if last.min_zoom == min_zoom && last.max_zoom == max_zoom && last.priority == priority {
                last.end = route.points[segment.end_index];
                last.end_index = segment.end_index;
                continue;
            }
        }
        plans.push(SegmentPlan {
            start: route.points[segment.start_index],
            end: route.points[segment.end_index],
            start_index: segment.start_index,
            end_index: segment.end_index,
            min_zoom,
            max_zoom,
            priority,
        });
    }
    plans
}

fn plan_length_miles(route: &Route, plan: &SegmentPlan) -> f64 {
    route.points[plan.start_index..=plan.end_index]
        .windows(2)
        .map(|pair| crate::geo::haversine_meters(pair[0], pair[1]))
        .sum::<f64>()
        / METERS_PER_MILE
}

/// Estimated cost of adding one zoom level of detail over a plan's range:
/// corridor tile count at that zoom times the per-zoom size table, scaled by
/// the assumed compression ratio.
fn zoom_level_cost(config: &PlannerConfig, plan: &SegmentPlan, length_miles: f64, zoom: u8) -> u64 {
    let mid_lat = (plan.start.lat + plan.end.lat) / 2.0;
    let tile_edge = meters_per_tile(zoom, mid_lat);
    let tiles_along = ((length_miles * METERS_PER_MILE) / tile_edge).ceil().max(1.0) as u64;
    let tiles = tiles_along * config.corridor_width_tiles;
    let per_tile = (config.tile_bytes_at_zoom(zoom) as f64 * config.assumed_compression_ratio) as u64;
    tiles * per_tile
}

/// Two-pass greedy allocator.
///
/// Base pass reserves 70% of each unit's fair byte share and registers its
/// minimum zoom, so every mile of route has offline coverage before any mile
/// gets extra detail. The detail pass then walks units in priority order,
/// adding one zoom level at a time while the increment still fits the budget;
/// the first level that does not fit ends that unit's allocation.
pub fn optimize_zoom_levels_for_budget(
    route: &Route,
    plans: &[SegmentPlan],
    budget_bytes: u64,
    config: &PlannerConfig,
) -> OptimizedZoomPlan {
    let route_miles = route.length_miles().max(f64::EPSILON);
    let bytes_per_mile = budget_bytes as f64 / route_miles;

    let mut allocated_total: u64 = 0;
    let mut segments: Vec<PlannedSegment> = Vec::with_capacity(plans.len());
    for plan in plans {
        let length = plan_length_miles(route, plan);
        let base = (length * bytes_per_mile * config.base_share) as u64;
        let base = base.min(budget_bytes.saturating_sub(allocated_total));
        allocated_total += base;
        segments.push(PlannedSegment {
            plan: plan.clone(),
            zoom_levels: vec![plan.min_zoom],
            allocated_bytes: base,
        });
    }

    // Priority descending, stable so ties keep route order.
    let mut order: Vec<usize> = (0..segments.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(segments[i].plan.priority));

    for index in order {
        let length = plan_length_miles(route, &segments[index].plan);
        let (min_zoom, max_zoom) = (segments[index].plan.min_zoom, segments[index].plan.max_zoom);
        for zoom in (min_zoom + 1)..=max_zoom {
            let cost = zoom_level_cost(config, &segments[index].plan, length, zoom);
            if allocated_total + cost > budget_bytes {
                debug!(
                    segment = index,
                    zoom,
                    cost,
                    remaining = budget_bytes - allocated_total,
                    "budget exhausted for segment"
                );
                break;
            }
            allocated_total += cost;
            segments[index].allocated_bytes += cost;
            segments[index].zoom_levels.push(zoom);
        }
    }

    let mut coverage_set: HashSet<TileCoord> = HashSet::new();
    let mut coverage: Vec<TileCoord> = Vec::new();
    for segment in &segments {
        for &zoom in &segment.zoom_levels {
            for point in &route.points[segment.plan.start_index..=segment.plan.end_index] {
                let tile = TileCoord::from_lat_lng(*point, zoom);
                if coverage_set.insert(tile) {
                    coverage.push(tile);
                }
            }
        }
    }

    OptimizedZoomPlan {
        segments,
        total_size: allocated_total,
        coverage,
    }
}

/// Advisory pre-download estimate; the actual stored bytes are whatever the
/// dedup write path ends up persisting.
pub fn estimate_route_storage(route: &Route, config: &PlannerConfig) -> StorageEstimate {
    let plans = calculate_optimal_zoom_levels(route);
    let plan = optimize_zoom_levels_for_budget(route, &plans, config.budget_bytes, config);
    let route_miles = route.length_miles().max(f64::EPSILON);
    let tile_data_size = plan.total_size;
    let database_overhead = (tile_data_size as f64 * config.database_overhead) as u64;
    StorageEstimate {
        tile_data_size,
        database_overhead,
        total_size: tile_data_size + database_overhead,
        tiles_per_mile: plan.coverage.len() as f64 / route_miles,
        bytes_per_mile: tile_data_size as f64 / route_miles,
        assumed_compression_ratio: config.assumed_compression_ratio,
    }
}

/// Tiles within an adaptive buffer of every route point.
///
/// The buffer doubles at the first and last point (the user's actual start
/// and end may deviate from the sampled geometry) and grows 1.5x through
/// urban segments. Zoom levels come from each point's segment classification.
pub fn calculate_route_corridor(route: &Route, buffer_meters: f64) -> Vec<TileCoord> {
    corridor_tiles(route, buffer_meters, |index| {
        let (min_zoom, max_zoom) = route
            .segment_for_point(index)
            .map(|s| {
                let (min, max, _) = classify_segment(s);
                (min, max)
            })
            .unwrap_or((10, 14));
        (min_zoom..=max_zoom).collect()
    })
}

/// Corridor restricted to the zoom levels a budget allocation actually
/// bought. Each point contributes only the zooms of the planned unit that
/// contains it, so the written store stays within the plan instead of
/// materializing every classified level.
pub fn calculate_budgeted_corridor(
    route: &Route,
    plan: &OptimizedZoomPlan,
    buffer_meters: f64,
) -> Vec<TileCoord> {
    corridor_tiles(route, buffer_meters, |index| {
        plan.segments
            .iter()
            .find(|s| index >= s.plan.start_index && index <= s.plan.end_index)
            .map(|s| s.zoom_levels.clone())
            .unwrap_or_default()
    })
}

fn corridor_tiles(
    route: &Route,
    buffer_meters: f64,
    zooms_for_point: impl Fn(usize) -> Vec<u8>,
) -> Vec<TileCoord> {
    let mut seen: HashSet<TileCoord> = HashSet::new();
    let mut corridor: Vec<TileCoord> = Vec::new();
    let last_index = route.points.len() - 1;

    for (index, point) in route.points.iter().enumerate() {
        let segment = route.segment_for_point(index);

        let mut buffer = buffer_meters;
        if index == 0 || index == last_index {
            buffer *= 2.0;
        }
        if segment.is_some_and(|s| s.is_urban) {
            buffer *= 1.5;
        }

        for zoom in zooms_for_point(index) {
            let center = TileCoord::from_lat_lng(*point, zoom);
            let radius = (buffer / meters_per_tile(zoom, point.lat)).ceil() as i64;
            for dx in -radius..=radius {
                for dy in -radius..=radius {
                    if let Some(tile) = center.offset(dx, dy) {
                        if seen.insert(tile) {
                            corridor.push(tile);
                        }
                    }
                }
            }
        }
    }
    corridor
}
