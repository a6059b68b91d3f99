use std::{fmt, fs, path::PathBuf};

use _model::{BrandJob, Waypoint};
use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use log::{debug, error, info, warn};

use crate::{
    config::Config,
    layout::{Output, WorkFiles},
    overpass::{self, Source},
    render::{self, kml, organic, Converter, TrackWriter},
    waypoints,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Track,
    Poi,
    Overlay,
    Orux,
    Organic,
    Relocate,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Track => write!(f, "GPX"),
            Self::Poi => write!(f, "GPI conversion"),
            Self::Overlay => write!(f, "KML"),
            Self::Orux => write!(f, "OruxMaps KML"),
            Self::Organic => write!(f, "Organic Maps KML"),
            Self::Relocate => write!(f, "relocation"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

#[derive(Debug)]
pub struct Failure {
    pub stage: Stage,
    pub error: anyhow::Error,
}

impl Failure {
    fn new(stage: Stage, error: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct BrandReport {
    pub brand: String,
    pub waypoints: usize,
    pub unnamed: usize,
    pub malformed: usize,
    pub delivered: Vec<PathBuf>,
    pub failures: Vec<Failure>,
}

impl BrandReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn log(&self) {
        for x in &self.failures {
            error!("{}: {} failed: {:#}", self.brand, x.stage, x.error);
        }
        if self.is_complete() {
            info!(
                "{}: {} dealers written to {} files ({} unnamed, {} malformed skipped)",
                self.brand,
                self.waypoints,
                self.delivered.len(),
                self.unnamed,
                self.malformed
            );
        } else {
            warn!(
                "{}: only {} of {} files delivered",
                self.brand,
                self.delivered.len(),
                Output::all().len()
            );
        }
    }
}

/// Runs fetch, normalize, render and relocate for one brand at a time.
pub struct Pipeline<'a> {
    config: &'a Config,
    source: &'a dyn Source,
    tracks: &'a dyn TrackWriter,
    converter: &'a dyn Converter,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        source: &'a dyn Source,
        tracks: &'a dyn TrackWriter,
        converter: &'a dyn Converter,
    ) -> Self {
        Self {
            config,
            source,
            tracks,
            converter,
        }
    }

    /// Fails only when the brand's elements could not be fetched. Anything
    /// going wrong later is recorded per file in the report.
    pub fn run(&self, job: &BrandJob) -> Result<BrandReport> {
        info!("Working on {job}");
        let query = overpass::query(job, self.config);
        debug!("{query}");
        let elements = overpass::load(self.source, job, &query, self.config.raw_cache.as_deref())
            .with_context(|| format!("{job}: fetching from overpass failed"))?;

        let normalized = waypoints::normalize(&elements);
        info!(
            "{job}: {} elements, {} named, {} unnamed, {} malformed",
            elements.len(),
            normalized.waypoints.len(),
            normalized.unnamed,
            normalized.malformed
        );
        if normalized.waypoints.is_empty() {
            warn!("{job}: no named dealers, writing empty files");
        }

        let mut report = BrandReport {
            brand: job.brand.clone(),
            waypoints: normalized.waypoints.len(),
            unnamed: normalized.unnamed,
            malformed: normalized.malformed,
            ..Default::default()
        };

        fs::create_dir_all(&self.config.work_dir).with_context(|| {
            format!("Failed to create {}", self.config.work_dir.display())
        })?;
        let work = WorkFiles::new(&self.config.work_dir, &job.brand);
        let ready = self.render(job, &normalized.waypoints, &work, &mut report.failures);

        let layout = self.config.layout;
        for output in ready {
            match layout.relocate(work.output(output), &self.config.output_root, &job.brand, output)
            {
                Ok(x) => report.delivered.push(x),
                Err(e) => report
                    .failures
                    .push(Failure::new(Stage::Relocate, e.context(output.to_string()))),
            }
        }

        let stuck = work.clean();
        if !stuck.is_empty() {
            report.failures.push(Failure::new(
                Stage::Cleanup,
                anyhow!("left behind {}", stuck.iter().map(|x| x.display()).join(", ")),
            ));
        }

        Ok(report)
    }

    fn render(
        &self,
        job: &BrandJob,
        waypoints: &[Waypoint],
        work: &WorkFiles,
        failures: &mut Vec<Failure>,
    ) -> Vec<Output> {
        let mut ready = Vec::new();

        match self.tracks.write(waypoints, &work.gpx, &job.icon) {
            Ok(()) => {
                ready.push(Output::Track);
                match self.converter.convert(&work.gpx, &work.gpi, job) {
                    Ok(x) => {
                        for line in x.stdout.lines().chain(x.stderr.lines()) {
                            debug!("{job}: gpsbabel: {line}");
                        }
                        ready.push(Output::Poi);
                    }
                    Err(e) => failures.push(Failure::new(Stage::Poi, e)),
                }
            }
            Err(e) => {
                failures.push(Failure::new(Stage::Track, e));
                failures.push(Failure::new(Stage::Poi, anyhow!("no GPX file to convert")));
            }
        }

        let doc = kml::Document {
            name: &job.brand,
            author: &self.config.author,
            link: &self.config.author_link,
        };

        // the plain file is only the base of the Organic Maps copy
        let plain = match kml::write(&work.kml, &doc, waypoints, None) {
            Ok(()) => true,
            Err(e) => {
                failures.push(Failure::new(Stage::Overlay, e));
                false
            }
        };

        let icon = render::icon_url(&self.config.icon_base_url, job);
        match kml::write(&work.orux, &doc, waypoints, Some(&icon)) {
            Ok(()) => ready.push(Output::Orux),
            Err(e) => failures.push(Failure::new(Stage::Orux, e)),
        }

        if plain {
            let reworked = fs::copy(&work.kml, &work.organic)
                .with_context(|| format!("Failed to copy {}", work.kml.display()))
                .and_then(|_| organic::rework_file(&work.organic, &job.style));
            match reworked {
                Ok(()) => ready.push(Output::Organic),
                Err(e) => failures.push(Failure::new(Stage::Organic, e)),
            }
        } else {
            failures.push(Failure::new(Stage::Organic, anyhow!("no KML file to rework")));
        }

        ready
    }
}

#[cfg(test)]
mod tests {
    use std::{io, path::Path, time::Duration};

    use super::*;
    use crate::{
        layout::Layout,
        overpass::{parse, FetchError, RawElement},
        render::{Conversion, ConvertError, GpxWriter},
    };

    const RESPONSE: &str = r#"{"elements":[
        {"type":"node","id":1,"lat":48.1,"lon":11.5,"tags":{"name":"Test Dealer","opening_hours":"Mo-Fr 09:00-18:00"}},
        {"type":"way","id":2,"center":{"lat":47.0,"lon":10.0},"tags":{"name":"Hall"}},
        {"type":"node","id":3,"lat":1.0,"lon":1.0,"tags":{"shop":"motorcycle"}},
        {"type":"relation","id":4,"tags":{"name":"Nowhere"}}
    ]}"#;

    struct Canned(Option<&'static str>);

    impl Source for Canned {
        fn fetch(&self, _query: &str) -> Result<Vec<RawElement>, FetchError> {
            match self.0 {
                Some(x) => Ok(parse(x).unwrap()),
                None => Err(FetchError::Status {
                    code: 504,
                    body: "Gateway Timeout".to_string(),
                }),
            }
        }
    }

    struct FakeBabel {
        works: bool,
    }

    impl Converter for FakeBabel {
        fn convert(
            &self,
            gpx: &Path,
            gpi: &Path,
            _job: &BrandJob,
        ) -> Result<Conversion, ConvertError> {
            assert!(gpx.exists());
            if !self.works {
                return Err(ConvertError::Timeout(Duration::from_secs(1)));
            }
            fs::write(gpi, b"GRMREC00")?;
            Ok(Conversion::default())
        }
    }

    fn config(root: &Path, layout: Layout) -> Config {
        Config {
            work_dir: root.join("work"),
            output_root: root.join("out"),
            layout,
            ..Default::default()
        }
    }

    fn leftovers(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn full_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), Layout::Dealer);
        let source = Canned(Some(RESPONSE));
        let tracks = GpxWriter;
        let babel = FakeBabel { works: true };
        let pipeline = Pipeline::new(&config, &source, &tracks, &babel);

        let job = BrandJob::new("BMW", "ATV", "placemark-orange");
        let report = pipeline.run(&job).unwrap();

        assert!(report.is_complete(), "{:?}", report.failures);
        assert_eq!(report.waypoints, 2);
        assert_eq!(report.unnamed, 1);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.delivered.len(), 4);
        assert_eq!(leftovers(&config.work_dir), 0);

        let out = &config.output_root;
        assert!(out.join("POI_gpx/BMW-Dealer.gpx").exists());
        assert!(out.join("POI_gpi/BMW-Dealer.gpi").exists());

        let orux = fs::read_to_string(out.join("POI_kml_orux/BMW-Dealer.kml")).unwrap();
        assert_eq!(
            orux.matches("<href>http://motorradtouren.de/pins/bmp_4_oruxmaps/BMW.bmp</href>")
                .count(),
            2
        );
        assert!(!orux.contains("<styleUrl>"));

        let organic = fs::read_to_string(out.join("POI_kml_organic/BMW-Dealer.kml")).unwrap();
        assert_eq!(
            organic.matches("<styleUrl>#placemark-orange</styleUrl>").count(),
            2
        );
        assert!(!organic.contains("<href>"));
        assert!(organic.lines().all(|x| !x.starts_with(' ')));
    }

    #[test]
    fn fetch_failure_stops_the_brand() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), Layout::Dealer);
        let tracks = GpxWriter;
        let babel = FakeBabel { works: true };
        let source = Canned(None);
        let pipeline = Pipeline::new(&config, &source, &tracks, &babel);

        let e = pipeline
            .run(&BrandJob::new("Honda", "ATV", "placemark-orange"))
            .unwrap_err();
        let message = format!("{e:#}");

        assert!(message.contains("Honda"), "{message}");
        assert!(message.contains("504"), "{message}");
        assert!(!config.work_dir.exists());
        assert!(!config.output_root.exists());
    }

    #[test]
    fn converter_failure_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), Layout::Global);
        let source = Canned(Some(RESPONSE));
        let tracks = GpxWriter;
        let babel = FakeBabel { works: false };
        let pipeline = Pipeline::new(&config, &source, &tracks, &babel);

        let report = pipeline
            .run(&BrandJob::new("Suzuki", "ATV", "placemark-blue"))
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, Stage::Poi);
        assert_eq!(report.delivered.len(), 3);
        assert_eq!(leftovers(&config.work_dir), 0);

        let out = config.output_root.join("POI_ww");
        assert!(out.join("Suzuki-global.gpx").exists());
        assert!(!out.join("Suzuki-global.gpi").exists());
        assert!(out.join("Suzuki-orux-global.kml").exists());
        assert!(out.join("Suzuki-organic-global.kml").exists());
    }

    #[test]
    fn brands_do_not_mix() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), Layout::Dealer);
        let source = Canned(Some(RESPONSE));
        let tracks = GpxWriter;
        let babel = FakeBabel { works: true };
        let pipeline = Pipeline::new(&config, &source, &tracks, &babel);

        for brand in ["BMW", "Yamaha"] {
            pipeline
                .run(&BrandJob::new(brand, "ATV", "placemark-orange"))
                .unwrap();
        }

        for x in Output::all() {
            assert_eq!(
                leftovers(&config.output_root.join(Layout::Dealer.directory(x))),
                2
            );
        }
    }

    #[test]
    fn relocation_failure_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), Layout::Dealer);
        let source = Canned(Some(RESPONSE));
        let tracks = GpxWriter;
        let babel = FakeBabel { works: true };
        let pipeline = Pipeline::new(&config, &source, &tracks, &babel);

        let blocked = config.output_root.join("POI_gpx/BMW-Dealer.gpx");
        fs::create_dir_all(&blocked).unwrap();

        let report = pipeline
            .run(&BrandJob::new("BMW", "ATV", "placemark-orange"))
            .unwrap();

        assert_eq!(report.failures.len(), 1, "{:?}", report.failures);
        assert_eq!(report.failures[0].stage, Stage::Relocate);
        assert_eq!(report.delivered.len(), 3);
        assert!(!report.delivered.contains(&blocked));
        assert!(blocked.is_dir());
        assert_eq!(leftovers(&config.work_dir), 0);
    }

    #[test]
    fn overlay_failure_keeps_its_cause() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), Layout::Dealer);
        let source = Canned(Some(RESPONSE));
        let tracks = GpxWriter;
        let babel = FakeBabel { works: true };
        let pipeline = Pipeline::new(&config, &source, &tracks, &babel);

        // a directory where the plain KML goes
        fs::create_dir_all(config.work_dir.join("BMW.kml")).unwrap();

        let report = pipeline
            .run(&BrandJob::new("BMW", "ATV", "placemark-orange"))
            .unwrap();

        let overlay = report
            .failures
            .iter()
            .find(|x| x.stage == Stage::Overlay)
            .unwrap();
        assert!(overlay.error.to_string().starts_with("Failed to create"));
        assert!(overlay.error.root_cause().downcast_ref::<io::Error>().is_some());
        assert!(report.failures.iter().any(|x| x.stage == Stage::Organic));
        assert_eq!(report.delivered.len(), 3);
        assert!(!config.output_root.join("POI_kml_organic/BMW-Dealer.kml").exists());
    }
}
