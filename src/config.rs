use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use _model::BrandJob;
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{brands, layout::Layout};

/// Everything that depends on the machine the tool runs on. Loaded once in
/// `main` and passed down; nothing below reads the environment itself.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub overpass_url: String,
    pub user_agent: String,
    /// seconds
    pub fetch_timeout: u64,
    /// seconds, sent to overpass as `[timeout:N]`
    pub query_timeout: u64,
    pub gpsbabel: PathBuf,
    /// seconds
    pub convert_timeout: u64,
    pub bitmap_dir: PathBuf,
    pub icon_base_url: String,
    pub work_dir: PathBuf,
    pub output_root: PathBuf,
    pub layout: Layout,
    pub raw_cache: Option<PathBuf>,
    pub author: String,
    pub author_link: String,
    /// brand key -> overpass regex, for brands written with and without spaces
    pub query_overrides: BTreeMap<String, String>,
    pub brands: Vec<BrandJob>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            user_agent: concat!("motopoi/", env!("CARGO_PKG_VERSION")).to_string(),
            fetch_timeout: 2400,
            query_timeout: 2400,
            gpsbabel: PathBuf::from("gpsbabel"),
            convert_timeout: 300,
            bitmap_dir: PathBuf::from("BMP"),
            icon_base_url: "http://motorradtouren.de/pins/bmp_4_oruxmaps/".to_string(),
            work_dir: PathBuf::from("."),
            output_root: PathBuf::from("."),
            layout: Layout::Dealer,
            raw_cache: None,
            author: "Hans Straßgütl".to_string(),
            author_link: "https://gravelmaps.de".to_string(),
            query_overrides: brands::query_overrides(),
            brands: brands::all(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout)
    }
}
