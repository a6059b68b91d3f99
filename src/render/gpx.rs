use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use _model::Waypoint;
use anyhow::{Context, Result};
use gpx::{Gpx, GpxVersion};

pub trait TrackWriter {
    /// Writes every waypoint to `path`, all sharing the same symbol.
    fn write(&self, waypoints: &[Waypoint], path: &Path, symbol: &str) -> Result<()>;
}

pub struct GpxWriter;

impl TrackWriter for GpxWriter {
    fn write(&self, waypoints: &[Waypoint], path: &Path, symbol: &str) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        gpx::write(&document(waypoints, symbol), &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn document(waypoints: &[Waypoint], symbol: &str) -> Gpx {
    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(concat!("motopoi ", env!("CARGO_PKG_VERSION")).to_string()),
        ..Default::default()
    };

    for x in waypoints {
        let mut wpt = gpx::Waypoint::new(x.point());
        wpt.name = Some(x.name.clone());
        if !x.description.is_empty() {
            wpt.description = Some(x.description.clone());
        }
        wpt.symbol = Some(symbol.to_string());
        gpx.waypoints.push(wpt);
    }

    gpx
}
