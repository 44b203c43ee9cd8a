use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
pub const METERS_PER_MILE: f64 = 1_609.344;
/// Deepest slippy-map zoom the tile math accepts. Shifts on the zoom exponent
/// stay well inside u32/u64 range under this bound.
pub const MAX_TILE_ZOOM: u8 = 22;

/// A point in geographic coordinates (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A tile address under the standard slippy-map (z/x/y) scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Tile containing the given point at the given zoom.
    pub fn from_lat_lng(point: LatLng, zoom: u8) -> Self {
        let n = (1u32 << zoom) as f64;
        let lat = point.lat.clamp(-85.0511, 85.0511);
        let x = ((point.lng + 180.0) / 360.0 * n).floor();
        let lat_rad = lat.to_radians();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0
            * n)
            .floor();
        let max = (n - 1.0).max(0.0);
        Self {
            zoom,
            x: x.clamp(0.0, max) as u32,
            y: y.clamp(0.0, max) as u32,
        }
    }

    /// Center of this tile in geographic coordinates.
    pub fn center(&self) -> LatLng {
        let n = (1u32 << self.zoom) as f64;
        let lng = (self.x as f64 + 0.5) / n * 360.0 - 180.0;
        let lat_rad = (std::f64::consts::PI * (1.0 - 2.0 * (self.y as f64 + 0.5) / n))
            .sinh()
            .atan();
        LatLng::new(lat_rad.to_degrees(), lng)
    }

    /// Neighboring tile offset by (dx, dy), clamped to the zoom's grid.
    pub fn offset(&self, dx: i64, dy: i64) -> Option<Self> {
        let max = (1u64 << self.zoom) as i64;
        let x = self.x as i64 + dx;
        let y = self.y as i64 + dy;
        if x < 0 || y < 0 || x >= max || y >= max {
            return None;
        }
        Some(Self {
            zoom: self.zoom,
            x: x as u32,
            y: y as u32,
        })
    }

    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.zoom, self.x, self.y)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

pub fn parse_tile_key(value: &str) -> Result<TileCoord> {
    let trimmed = value.trim();
    let mut parts = trimmed.split('/');
    let zoom_str = parts.next().context("tile must be in z/x/y format")?;
    let x_str = parts.next().context("tile must be in z/x/y format")?;
    let y_str = parts.next().context("tile must be in z/x/y format")?;
    if parts.next().is_some() {
        anyhow::bail!("tile must be in z/x/y format");
    }
    let zoom: u8 = zoom_str.parse().context("invalid tile zoom")?;
    if zoom > MAX_TILE_ZOOM {
        anyhow::bail!("tile zoom {zoom} exceeds maximum {MAX_TILE_ZOOM}");
    }
    let x: u32 = x_str.parse().context("invalid tile x")?;
    let y: u32 = y_str.parse().context("invalid tile y")?;
    let grid = 1u64 << zoom;
    if u64::from(x) >= grid || u64::from(y) >= grid {
        anyhow::bail!("tile {zoom}/{x}/{y} is outside the zoom {zoom} grid");
    }
    Ok(TileCoord { zoom, x, y })
}

/// Great-circle distance between two points, in meters.
pub fn haversine_meters(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

/// Ground length of one tile edge at the given zoom and latitude, in meters.
pub fn meters_per_tile(zoom: u8, lat: f64) -> f64 {
    let n = (1u32 << zoom) as f64;
    let circumference = 2.0 * std::f64::consts::PI * EARTH_RADIUS_METERS;
    circumference * lat.to_radians().cos() / n
}

/// Drop consecutive points closer than `epsilon_meters` apart.
pub fn dedup_points(points: &[LatLng], epsilon_meters: f64) -> Vec<LatLng> {
    let mut out: Vec<LatLng> = Vec::with_capacity(points.len());
    for point in points {
        match out.last() {
            Some(prev) if haversine_meters(*prev, *point) < epsilon_meters => {}
            _ => out.push(*point),
        }
    }
    out
}
