use std::collections::BTreeMap;

use _model::{BrandJob, GENERIC};

const ICON: &str = "ATV";
const STYLE: &str = "placemark-orange";

/// The default run, in processing order.
pub fn all() -> Vec<BrandJob> {
    [
        GENERIC,
        "BMW",
        "GasGas",
        "Husqvarna",
        "CFMOTO",
        "CF MOTO",
        "Honda",
        "Yamaha",
        "Suzuki",
    ]
    .into_iter()
    .map(|x| BrandJob::new(x, ICON, STYLE))
    .collect()
}

/// Brands that are spelled both with and without an inner space.
pub fn query_overrides() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("gasgas".to_string(), "gas ?gas".to_string()),
        ("cfmoto".to_string(), "cf ?moto".to_string()),
    ])
}

pub fn job(brand: &str, icon: Option<String>, style: Option<String>) -> BrandJob {
    BrandJob {
        brand: brand.to_string(),
        icon: icon.unwrap_or_else(|| ICON.to_string()),
        style: style.unwrap_or_else(|| STYLE.to_string()),
    }
}
