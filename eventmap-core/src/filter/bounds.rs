//! Geographic bounding boxes.

use serde::{Deserialize, Serialize};

/// A latitude/longitude box. When `west > east` the box crosses the
/// antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Bounds {
            north,
            south,
            east,
            west,
        }
    }

    /// Parse `"south,west,north,east"`, the order map viewports report in.
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| format!("Invalid bounds '{}'. Expected south,west,north,east", s))?;

        let &[south, west, north, east] = &parts[..] else {
            return Err(format!(
                "Invalid bounds '{}'. Expected 4 values, got {}",
                s,
                parts.len()
            ));
        };

        if parts.iter().any(|v| !v.is_finite()) {
            return Err(format!("Invalid bounds '{}'. Values must be finite", s));
        }
        if south > north {
            return Err(format!("Invalid bounds '{}'. South ({}) is above north ({})", s, south, north));
        }

        Ok(Bounds::new(north, south, east, west))
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Edges are inclusive.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        if !(self.south..=self.north).contains(&lat) {
            return false;
        }
        if self.crosses_antimeridian() {
            lng >= self.west || lng <= self.east
        } else {
            (self.west..=self.east).contains(&lng)
        }
    }
}
