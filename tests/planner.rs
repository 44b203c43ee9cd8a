use route_tiles::geo::LatLng;
use route_tiles::planner::{
    calculate_budgeted_corridor, calculate_optimal_zoom_levels, calculate_route_corridor,
    estimate_route_storage, optimize_zoom_levels_for_budget, PlannerConfig,
};
use route_tiles::route::{RoadType, Route, RouteSegment};
use route_tiles::store::TileStore;

/// A commute-shaped route: urban start, highway middle, urban end.
fn commute_route() -> Route {
    let points: Vec<LatLng> = (0..61)
        .map(|i| LatLng::new(39.5 + i as f64 * 0.01, -75.2 + i as f64 * 0.005))
        .collect();
    let segments = vec![
        RouteSegment {
            start_index: 0,
            end_index: 10,
            road_type: RoadType::Arterial,
            is_urban: true,
            has_complex_intersections: true,
            speed_limit_mph: 30,
        },
        RouteSegment {
            start_index: 10,
            end_index: 50,
            road_type: RoadType::Highway,
            is_urban: false,
            has_complex_intersections: false,
            speed_limit_mph: 70,
        },
        RouteSegment {
            start_index: 50,
            end_index: 60,
            road_type: RoadType::Arterial,
            is_urban: true,
            has_complex_intersections: false,
            speed_limit_mph: 25,
        },
    ];
    let route = Route { points, segments };
    route.validate().expect("fixture route is valid");
    route
}

#[test]
fn plan_respects_budget_across_scales() {
    let route = commute_route();
    let config = PlannerConfig::default();
    let plans = calculate_optimal_zoom_levels(&route);

    for budget in [
        256 * 1024,
        4 * 1024 * 1024,
        50 * 1024 * 1024,
        1024 * 1024 * 1024,
    ] {
        let optimized = optimize_zoom_levels_for_budget(&route, &plans, budget, &config);
        assert!(optimized.total_size <= budget);
        assert_eq!(optimized.segments.len(), plans.len());
        for segment in &optimized.segments {
            assert_eq!(segment.zoom_levels[0], segment.plan.min_zoom);
        }
    }
}

#[test]
fn larger_budgets_buy_more_detail() {
    let route = commute_route();
    let config = PlannerConfig::default();
    let plans = calculate_optimal_zoom_levels(&route);

    let small = optimize_zoom_levels_for_budget(&route, &plans, 4 * 1024 * 1024, &config);
    let large = optimize_zoom_levels_for_budget(&route, &plans, 1024 * 1024 * 1024, &config);

    let zoom_count =
        |plan: &route_tiles::planner::OptimizedZoomPlan| -> usize {
            plan.segments.iter().map(|s| s.zoom_levels.len()).sum()
        };
    assert!(zoom_count(&large) >= zoom_count(&small));

    // With a generous budget every unit reaches its maximum zoom.
    for segment in &large.segments {
        assert_eq!(
            *segment.zoom_levels.last().expect("non-empty"),
            segment.plan.max_zoom
        );
    }
}

#[test]
fn estimate_is_consistent_with_its_parts() {
    let route = commute_route();
    let config = PlannerConfig {
        budget_bytes: 50 * 1024 * 1024,
        ..PlannerConfig::default()
    };
    let estimate = estimate_route_storage(&route, &config);
    assert!(estimate.tile_data_size <= config.budget_bytes);
    assert_eq!(
        estimate.total_size,
        estimate.tile_data_size + estimate.database_overhead
    );
    assert!(estimate.tiles_per_mile > 0.0);
    assert!(estimate.bytes_per_mile > 0.0);
}

#[test]
fn download_budget_changes_what_is_stored() {
    let route = commute_route();
    let config = PlannerConfig::default();
    let plans = calculate_optimal_zoom_levels(&route);

    let mut stored_counts = Vec::new();
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, budget) in [("small.db", 256 * 1024), ("large.db", 1024 * 1024 * 1024)] {
        let optimized = optimize_zoom_levels_for_budget(&route, &plans, budget, &config);
        let corridor = calculate_budgeted_corridor(&route, &optimized, 500.0);
        let mut store = TileStore::open(&dir.path().join(name)).expect("open store");
        for tile in &corridor {
            store
                .store_tile_deduplicated(*tile, format!("tile {tile}").as_bytes())
                .expect("store tile");
        }
        stored_counts.push(store.storage_stats().expect("stats").total_tiles);
    }
    assert!(
        stored_counts[0] < stored_counts[1],
        "budgets stored {stored_counts:?}"
    );
}

#[test]
fn corridor_zooms_follow_segment_classification() {
    let route = commute_route();
    let corridor = calculate_route_corridor(&route, 500.0);
    assert!(!corridor.is_empty());

    // Highway stretch plans z8-11, urban stretches z12-16.
    let zooms: std::collections::HashSet<u8> = corridor.iter().map(|t| t.zoom).collect();
    assert!(zooms.contains(&8));
    assert!(zooms.contains(&16));
    assert!(zooms.iter().all(|z| (8..=16).contains(z)));
}
