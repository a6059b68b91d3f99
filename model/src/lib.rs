use core::fmt;

use serde::{Deserialize, Serialize};

mod osm;
mod waypoint;

pub use osm::OsmId;
pub use waypoint::Waypoint;

/// Brand token meaning "dealers without any brand tag".
pub const GENERIC: &str = "GENERIC";

/// One pipeline run: which brand to query and how to style its output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandJob {
    pub brand: String,
    /// Garmin symbol name written to every GPX waypoint.
    pub icon: String,
    /// Organic Maps style id, e.g. `placemark-orange`.
    pub style: String,
}

impl fmt::Display for BrandJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.brand)
    }
}

impl BrandJob {
    pub fn new(brand: &str, icon: &str, style: &str) -> Self {
        Self {
            brand: brand.to_string(),
            icon: icon.to_string(),
            style: style.to_string(),
        }
    }

    pub fn is_generic(&self) -> bool {
        self.brand.trim().eq_ignore_ascii_case(GENERIC)
    }

    /// Lowercase alphanumerics only, so "Gas Gas", "gas-gas" and "GasGas"
    /// share a key.
    pub fn key(&self) -> String {
        brand_key(&self.brand)
    }
}

pub fn brand_key(brand: &str) -> String {
    brand
        .chars()
        .filter(|x| x.is_alphanumeric())
        .flat_map(|x| x.to_lowercase())
        .collect()
}
