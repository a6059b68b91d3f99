use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::warn;
use serde::{Deserialize, Serialize};

/// Where finished files end up and what they are called.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// One directory per format, `<brand>-Dealer.<ext>`.
    Dealer,
    /// Everything in `POI_ww`, `<brand>-global.<ext>`.
    Global,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Track,
    Poi,
    Orux,
    Organic,
}

impl Output {
    pub fn all() -> [Self; 4] {
        [Self::Track, Self::Poi, Self::Orux, Self::Organic]
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Track => write!(f, "GPX"),
            Self::Poi => write!(f, "GPI"),
            Self::Orux => write!(f, "OruxMaps KML"),
            Self::Organic => write!(f, "Organic Maps KML"),
        }
    }
}

impl Layout {
    pub fn directory(&self, output: Output) -> &'static str {
        match self {
            Self::Dealer => match output {
                Output::Track => "POI_gpx",
                Output::Poi => "POI_gpi",
                Output::Orux => "POI_kml_orux",
                Output::Organic => "POI_kml_organic",
            },
            Self::Global => "POI_ww",
        }
    }

    pub fn file_name(&self, brand: &str, output: Output) -> String {
        match self {
            Self::Dealer => match output {
                Output::Track => format!("{brand}-Dealer.gpx"),
                Output::Poi => format!("{brand}-Dealer.gpi"),
                Output::Orux | Output::Organic => format!("{brand}-Dealer.kml"),
            },
            Self::Global => match output {
                Output::Track => format!("{brand}-global.gpx"),
                Output::Poi => format!("{brand}-global.gpi"),
                Output::Orux => format!("{brand}-orux-global.kml"),
                Output::Organic => format!("{brand}-organic-global.kml"),
            },
        }
    }

    pub fn destination(&self, root: &Path, brand: &str, output: Output) -> PathBuf {
        root.join(self.directory(output))
            .join(self.file_name(brand, output))
    }

    /// Creates every destination directory; existing ones are fine.
    pub fn prepare(&self, root: &Path) -> Result<()> {
        for x in Output::all() {
            let dir = root.join(self.directory(x));
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Moves a finished file into place, replacing an older one.
    pub fn relocate(&self, from: &Path, root: &Path, brand: &str, output: Output) -> Result<PathBuf> {
        let to = self.destination(root, brand, output);
        if let Some(dir) = to.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        // rename fails across filesystems
        if fs::rename(from, &to).is_err() {
            fs::copy(from, &to).with_context(|| {
                format!("Failed to copy {} to {}", from.display(), to.display())
            })?;
            fs::remove_file(from)
                .with_context(|| format!("Failed to remove {}", from.display()))?;
        }
        Ok(to)
    }
}

/// Intermediate files of one brand inside the working directory.
#[derive(Debug)]
pub struct WorkFiles {
    pub gpx: PathBuf,
    pub gpi: PathBuf,
    pub kml: PathBuf,
    pub orux: PathBuf,
    pub organic: PathBuf,
}

impl WorkFiles {
    pub fn new(dir: &Path, brand: &str) -> Self {
        Self {
            gpx: dir.join(format!("{brand}.gpx")),
            gpi: dir.join(format!("{brand}.gpi")),
            kml: dir.join(format!("{brand}.kml")),
            orux: dir.join(format!("{brand}-orux.kml")),
            organic: dir.join(format!("{brand}-organic.kml")),
        }
    }

    pub fn output(&self, output: Output) -> &Path {
        match output {
            Output::Track => &self.gpx,
            Output::Poi => &self.gpi,
            Output::Orux => &self.orux,
            Output::Organic => &self.organic,
        }
    }

    /// Removes whatever is left over. Returns the files that could not be
    /// removed.
    pub fn clean(&self) -> Vec<PathBuf> {
        let mut stuck = Vec::new();
        for x in [&self.gpx, &self.gpi, &self.kml, &self.orux, &self.organic] {
            match fs::remove_file(x) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {e}", x.display());
                    stuck.push(x.clone());
                }
            }
        }
        stuck
    }
}
