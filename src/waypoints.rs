use _model::Waypoint;
use log::warn;
use thiserror::Error;

use crate::overpass::RawElement;

pub const OPENING_HOURS: &str = "Opening Hours: ";

#[derive(Debug, Error)]
#[error("{0} has neither coordinates nor a center")]
pub struct MalformedRecord(String);

#[derive(Debug, Default, PartialEq)]
pub struct Normalized {
    pub waypoints: Vec<Waypoint>,
    pub unnamed: usize,
    pub malformed: usize,
}

/// Turns overpass elements into waypoints, keeping their order. Elements
/// without a usable name are dropped, elements without a position are
/// skipped and logged.
pub fn normalize(elements: &[RawElement]) -> Normalized {
    let mut output = Normalized::default();
    for element in elements {
        match waypoint(element) {
            Ok(Some(x)) => output.waypoints.push(x),
            Ok(None) => output.unnamed += 1,
            Err(e) => {
                warn!("Skipping record: {e}");
                output.malformed += 1;
            }
        }
    }
    output
}

fn waypoint(element: &RawElement) -> Result<Option<Waypoint>, MalformedRecord> {
    let position = element
        .position()
        .ok_or_else(|| MalformedRecord(element.describe()))?;

    let description = match element.tag("opening_hours") {
        Some(x) => format!("{OPENING_HOURS}{x}"),
        None => String::new(),
    };

    Ok(match element.tag("name") {
        Some(name) if !name.trim().is_empty() => Some(Waypoint {
            name: name.to_string(),
            description,
            lat: position.lat,
            lon: position.lon,
        }),
        _ => None,
    })
}
