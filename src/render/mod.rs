use _model::BrandJob;

mod gpi;
mod gpx;
pub mod kml;
pub mod organic;

pub use gpi::{Conversion, ConvertError, Converter, GpsBabel};
pub use gpx::{GpxWriter, TrackWriter};

/// OruxMaps icon for a brand, `<base><brand>.bmp`.
pub fn icon_url(base: &str, job: &BrandJob) -> String {
    format!("{base}{}.bmp", job.brand.replace(' ', "%20"))
}
