use anyhow::Result;
use clap::Parser;

use route_tiles::cli::{Cli, Command, ReportFormat};
use route_tiles::planner::{
    calculate_budgeted_corridor, calculate_optimal_zoom_levels, estimate_route_storage,
    optimize_zoom_levels_for_budget, PlannerConfig,
};
use route_tiles::route::Route;
use route_tiles::store::TileStore;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    match cli.command {
        Command::Estimate(args) => {
            let route = Route::from_json_file(&args.route)?;
            let config = PlannerConfig {
                budget_bytes: args.budget_mb * 1024 * 1024,
                ..PlannerConfig::default()
            };
            let estimate = estimate_route_storage(&route, &config);
            match args.output {
                ReportFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&estimate)?);
                }
                ReportFormat::Text => {
                    println!(
                        "tile_data_size: {} database_overhead: {} total_size: {}",
                        estimate.tile_data_size, estimate.database_overhead, estimate.total_size
                    );
                    println!(
                        "tiles_per_mile: {:.1} bytes_per_mile: {:.0} assumed_compression_ratio: {}",
                        estimate.tiles_per_mile,
                        estimate.bytes_per_mile,
                        estimate.assumed_compression_ratio
                    );
                }
            }
        }
        Command::Plan(args) => {
            let route = Route::from_json_file(&args.route)?;
            let config = PlannerConfig::default();
            let budget = args.budget_mb * 1024 * 1024;
            let plans = calculate_optimal_zoom_levels(&route);
            let optimized = optimize_zoom_levels_for_budget(&route, &plans, budget, &config);
            match args.output {
                ReportFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&optimized)?);
                }
                ReportFormat::Text => {
                    println!(
                        "segments: {} total_size: {} budget: {budget} coverage_tiles: {}",
                        optimized.segments.len(),
                        optimized.total_size,
                        optimized.coverage.len()
                    );
                    for (i, segment) in optimized.segments.iter().enumerate() {
                        println!(
                            "segment {i}: priority={} zooms={:?} allocated_bytes={}",
                            segment.plan.priority, segment.zoom_levels, segment.allocated_bytes
                        );
                    }
                }
            }
        }
        Command::Download(args) => {
            let route = Route::from_json_file(&args.route)?;
            let budget = args.budget_mb * 1024 * 1024;
            let config = PlannerConfig {
                budget_bytes: budget,
                ..PlannerConfig::default()
            };
            let plans = calculate_optimal_zoom_levels(&route);
            let optimized = optimize_zoom_levels_for_budget(&route, &plans, budget, &config);
            let mut store = TileStore::open(&args.store)?;
            let corridor = calculate_budgeted_corridor(&route, &optimized, args.buffer_m as f64);
            let mut stored = 0u64;
            let mut missing = 0u64;
            for tile in &corridor {
                let path = args
                    .tiles_dir
                    .join(tile.zoom.to_string())
                    .join(tile.x.to_string())
                    .join(format!("{}.pbf", tile.y));
                if !path.exists() {
                    missing += 1;
                    continue;
                }
                let bytes = std::fs::read(&path)?;
                store.store_tile_deduplicated(*tile, &bytes)?;
                stored += 1;
            }
            let stats = store.storage_stats()?;
            println!(
                "corridor_tiles: {} stored: {stored} missing: {missing} budget: {budget}",
                corridor.len()
            );
            println!(
                "unique_blobs: {} dedup_ratio: {:.2} stored_bytes: {}",
                stats.unique_tile_data, stats.deduplication_ratio, stats.total_size
            );
        }
        Command::Stats(args) => {
            let store = TileStore::open(&args.store)?;
            let stats = store.storage_stats()?;
            match args.output {
                ReportFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                ReportFormat::Text => {
                    println!(
                        "total_tiles: {} unique_tile_data: {} dedup_ratio: {:.2}",
                        stats.total_tiles, stats.unique_tile_data, stats.deduplication_ratio
                    );
                    println!(
                        "total_size: {} average_compression_ratio: {:.3}",
                        stats.total_size, stats.average_compression_ratio
                    );
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
