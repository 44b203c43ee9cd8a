use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::geo::{haversine_meters, LatLng, METERS_PER_MILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadType {
    Highway,
    Arterial,
    Residential,
    Rural,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub start_index: usize,
    pub end_index: usize,
    pub road_type: RoadType,
    #[serde(default)]
    pub is_urban: bool,
    #[serde(default)]
    pub has_complex_intersections: bool,
    pub speed_limit_mph: u32,
}

/// A route produced by an external routing engine, consumed read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub points: Vec<LatLng>,
    pub segments: Vec<RouteSegment>,
}

impl Route {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open route: {}", path.display()))?;
        let route: Route =
            serde_json::from_reader(std::io::BufReader::new(file)).context("parse route json")?;
        route.validate()?;
        Ok(route)
    }

    /// Segments must cover the point sequence monotonically without overlap.
    pub fn validate(&self) -> Result<()> {
        if self.points.len() < 2 {
            anyhow::bail!("route must have at least two points");
        }
        if self.segments.is_empty() {
            anyhow::bail!("route must have at least one segment");
        }
        let mut expected_start = 0usize;
        for (i, segment) in self.segments.iter().enumerate() {
            if segment.start_index != expected_start {
                anyhow::bail!(
                    "segment {i} starts at {} but previous segment ended at {expected_start}",
                    segment.start_index
                );
            }
            if segment.end_index <= segment.start_index {
                anyhow::bail!("segment {i} has an empty or reversed index range");
            }
            if segment.end_index >= self.points.len() {
                anyhow::bail!(
                    "segment {i} ends at {} past the last point index {}",
                    segment.end_index,
                    self.points.len() - 1
                );
            }
            expected_start = segment.end_index;
        }
        if expected_start != self.points.len() - 1 {
            anyhow::bail!("segments do not cover the route to its final point");
        }
        Ok(())
    }

    pub fn length_miles(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| haversine_meters(pair[0], pair[1]))
            .sum::<f64>()
            / METERS_PER_MILE
    }

    pub fn segment_length_miles(&self, segment: &RouteSegment) -> f64 {
        self.points[segment.start_index..=segment.end_index]
            .windows(2)
            .map(|pair| haversine_meters(pair[0], pair[1]))
            .sum::<f64>()
            / METERS_PER_MILE
    }

    /// Segment whose index range contains the given point index.
    pub fn segment_for_point(&self, point_index: usize) -> Option<&RouteSegment> {
        self.segments
            .iter()
            .find(|s| point_index >= s.start_index && point_index <= s.end_index)
    }

    /// Index of the route point nearest to `position`.
    pub fn closest_point_index(&self, position: LatLng) -> Option<usize> {
        self.points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                haversine_meters(**a, position)
                    .partial_cmp(&haversine_meters(**b, position))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
    }
}
