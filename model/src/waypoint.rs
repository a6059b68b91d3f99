use geo::Point;
use serde::{Deserialize, Serialize};

/// A named dealer location, ready to be written to every output format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub description: String,
    pub lat: f64,
    pub lon: f64,
}

impl Waypoint {
    /// x is longitude, y is latitude.
    pub fn point(&self) -> Point {
        Point::new(self.lon, self.lat)
    }
}
