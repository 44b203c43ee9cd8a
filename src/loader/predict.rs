use std::collections::VecDeque;
use std::time::Instant;

use crate::geo::{haversine_meters, LatLng, TileCoord};

/// Below this ground speed the user is effectively parked and speculative
/// prefetch is suppressed.
pub const MIN_PREDICTION_SPEED_MPS: f64 = 2.0;
/// How far ahead the linear projection looks.
pub const PREDICTION_HORIZON_SECS: f64 = 5.0;
const MAX_SAMPLES: usize = 10;
const MAX_PREFETCH_RADIUS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementVector {
    pub lat_per_sec: f64,
    pub lng_per_sec: f64,
    pub speed_mps: f64,
}

/// Bounded ring of recent position samples, used only to derive a velocity
/// vector. Never persisted.
#[derive(Debug, Default)]
pub struct MovementTracker {
    samples: VecDeque<(LatLng, Instant)>,
}

impl MovementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, position: LatLng) {
        self.record_at(position, Instant::now());
    }

    pub fn record_at(&mut self, position: LatLng, at: Instant) {
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back((position, at));
    }

    /// Velocity from the two most recent samples, or `None` with fewer than
    /// two samples or a zero elapsed interval.
    pub fn movement_vector(&self) -> Option<MovementVector> {
        let len = self.samples.len();
        if len < 2 {
            return None;
        }
        let (prev, prev_at) = self.samples[len - 2];
        let (curr, curr_at) = self.samples[len - 1];
        let elapsed = curr_at.duration_since(prev_at).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some(MovementVector {
            lat_per_sec: (curr.lat - prev.lat) / elapsed,
            lng_per_sec: (curr.lng - prev.lng) / elapsed,
            speed_mps: haversine_meters(prev, curr) / elapsed,
        })
    }

    /// Tiles around the position projected `PREDICTION_HORIZON_SECS` ahead.
    /// Empty while stationary; the block radius grows with speed, and one
    /// extra row either side of the projected tile covers lateral drift.
    pub fn predict_next_tiles(&self, zoom: u8) -> Vec<TileCoord> {
        let Some(vector) = self.movement_vector() else {
            return Vec::new();
        };
        if vector.speed_mps < MIN_PREDICTION_SPEED_MPS {
            return Vec::new();
        }
        let Some(&(current, _)) = self.samples.back() else {
            return Vec::new();
        };
        let projected = LatLng::new(
            current.lat + vector.lat_per_sec * PREDICTION_HORIZON_SECS,
            current.lng + vector.lng_per_sec * PREDICTION_HORIZON_SECS,
        );
        let center = TileCoord::from_lat_lng(projected, zoom);
        let radius = ((vector.speed_mps / 10.0).floor() as i64).min(MAX_PREFETCH_RADIUS);

        let mut tiles = Vec::new();
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                if let Some(tile) = center.offset(dx, dy) {
                    tiles.push(tile);
                }
            }
        }
        for dy in [-(radius + 1), radius + 1] {
            if let Some(tile) = center.offset(0, dy) {
                tiles.push(tile);
            }
        }
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker_with_speed(meters_per_sec: f64) -> MovementTracker {
        // One degree of latitude is ~111,195 m under the haversine radius.
        let deg_per_sec = meters_per_sec / 111_194.9;
        let start = Instant::now();
        let mut tracker = MovementTracker::new();
        tracker.record_at(LatLng::new(40.0, -75.0), start);
        tracker.record_at(
            LatLng::new(40.0 + deg_per_sec, -75.0),
            start + Duration::from_secs(1),
        );
        tracker
    }

    #[test]
    fn no_prediction_without_samples() {
        let tracker = MovementTracker::new();
        assert!(tracker.movement_vector().is_none());
        assert!(tracker.predict_next_tiles(14).is_empty());
    }

    #[test]
    fn stationary_suppresses_prefetch() {
        let tracker = tracker_with_speed(1.0);
        let vector = tracker.movement_vector().expect("vector");
        assert!(vector.speed_mps < MIN_PREDICTION_SPEED_MPS);
        assert!(tracker.predict_next_tiles(14).is_empty());
    }

    #[test]
    fn prediction_grows_with_speed() {
        let walking = tracker_with_speed(3.0).predict_next_tiles(14);
        let driving = tracker_with_speed(30.0).predict_next_tiles(14);
        let highway = tracker_with_speed(90.0).predict_next_tiles(14);
        assert!(!walking.is_empty());
        assert!(driving.len() > walking.len());
        assert!(highway.len() > driving.len());
    }

    #[test]
    fn prediction_is_ahead_of_current_position() {
        // Northbound at highway speed: the projected block must sit at or
        // above (smaller y) the current tile.
        let tracker = tracker_with_speed(30.0);
        let (current, _) = *tracker.samples.back().unwrap();
        let current_tile = TileCoord::from_lat_lng(current, 14);
        let tiles = tracker.predict_next_tiles(14);
        assert!(tiles.iter().all(|t| t.y <= current_tile.y + 4));
        assert!(tiles.iter().any(|t| t.y < current_tile.y));
    }

    #[test]
    fn ring_buffer_is_bounded() {
        let mut tracker = MovementTracker::new();
        let start = Instant::now();
        for i in 0..25 {
            tracker.record_at(
                LatLng::new(40.0 + i as f64 * 0.001, -75.0),
                start + Duration::from_secs(i),
            );
        }
        assert_eq!(tracker.samples.len(), 10);
    }
}
