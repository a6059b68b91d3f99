use std::{
    ffi::OsString,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    thread::{self, sleep, JoinHandle},
    time::{Duration, Instant},
};

use _model::BrandJob;
use itertools::Itertools;
use log::{debug, warn};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("converter failed with {status}: {stderr}")]
    Exit { status: ExitStatus, stderr: String },
    #[error("converter still running after {0:?}, killed")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Captured output of a successful conversion.
#[derive(Debug, Default)]
pub struct Conversion {
    pub stdout: String,
    pub stderr: String,
}

pub trait Converter {
    /// Turns the GPX file of a brand into a Garmin GPI file.
    fn convert(&self, gpx: &Path, gpi: &Path, job: &BrandJob) -> Result<Conversion, ConvertError>;
}

pub struct GpsBabel {
    program: PathBuf,
    bitmap_dir: PathBuf,
    timeout: Duration,
}

impl GpsBabel {
    pub fn new(config: &Config) -> Self {
        Self {
            program: config.gpsbabel.clone(),
            bitmap_dir: config.bitmap_dir.clone(),
            timeout: config.convert_timeout(),
        }
    }

    fn options(&self, job: &BrandJob) -> String {
        let mut options = vec!["garmin_gpi".to_string()];

        let bitmap = self.bitmap_dir.join(format!("{}.bmp", job.brand));
        let path = bitmap.display().to_string();
        if !bitmap.exists() {
            warn!("{job}: no bitmap at {path}, using the default icon");
        } else if path.contains(',') {
            // commas separate options
            warn!("{job}: bitmap path {path} contains a comma, using the default icon");
        } else {
            options.push(format!("bitmap={path}"));
        }

        options.push(format!("category={}", job.brand.replace(',', " ")));
        options.extend(["descr=1", "notes=1", "position=1", "unique=1"].map(String::from));
        options.iter().join(",")
    }

    pub fn args(&self, gpx: &Path, gpi: &Path, job: &BrandJob) -> Vec<OsString> {
        vec![
            "-w".into(),
            "-i".into(),
            "gpx".into(),
            "-f".into(),
            gpx.into(),
            "-o".into(),
            self.options(job).into(),
            "-F".into(),
            gpi.into(),
        ]
    }
}

impl Converter for GpsBabel {
    fn convert(&self, gpx: &Path, gpi: &Path, job: &BrandJob) -> Result<Conversion, ConvertError> {
        let args = self.args(gpx, gpi, job);
        debug!("{} {:?}", self.program.display(), args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        // a full pipe blocks the converter
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(x) = child.try_wait()? {
                break x;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConvertError::Timeout(self.timeout));
            }
            sleep(Duration::from_millis(50));
        };

        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;
        if !status.success() {
            return Err(ConvertError::Exit { status, stderr });
        }

        Ok(Conversion { stdout, stderr })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut x) = pipe {
            x.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(reader: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<String> {
    let buf = reader
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "pipe reader panicked"))??;
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}
