use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use crate::{
    config::Config,
    layout::Layout,
    overpass::Overpass,
    pipeline::Pipeline,
    render::{GpsBabel, GpxWriter},
    utils::progress_bar,
};

mod brands;
mod config;
mod layout;
mod overpass;
mod pipeline;
mod render;
mod utils;
mod waypoints;

/// Motorcycle dealers from OpenStreetMap as GPX, GPI and KML files.
#[derive(Debug, Parser)]
struct Cli {
    /// YAML file overriding the built-in settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_enum)]
    layout: Option<Layout>,
    /// Root directory for the finished files
    #[arg(long, global = true)]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Process every configured brand
    Run,
    /// Process a single brand
    Brand {
        brand: String,
        /// Garmin symbol for the GPX waypoints
        #[arg(long)]
        icon: Option<String>,
        /// Organic Maps placemark style
        #[arg(long)]
        style: Option<String>,
    },
    /// Print the overpass query for a brand
    Query { brand: String },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(x) = cli.layout {
        config.layout = x;
    }
    if let Some(x) = cli.output {
        config.output_root = x;
    }

    let jobs = match cli.command {
        Command::Run => config.brands.clone(),
        Command::Brand { brand, icon, style } => vec![brands::job(&brand, icon, style)],
        Command::Query { brand } => {
            print!("{}", overpass::query(&brands::job(&brand, None, None), &config));
            return Ok(());
        }
    };

    config.layout.prepare(&config.output_root)?;

    let source = Overpass::new(&config);
    let tracks = GpxWriter;
    let converter = GpsBabel::new(&config);
    let pipeline = Pipeline::new(&config, &source, &tracks, &converter);

    let pb = progress_bar(jobs.len() as u64);
    let mut failed = Vec::new();
    for job in &jobs {
        pb.set_message(job.brand.clone());
        match pipeline.run(job) {
            Ok(report) => {
                pb.suspend(|| report.log());
                if !report.is_complete() {
                    failed.push(job.brand.as_str());
                }
            }
            Err(e) => {
                pb.suspend(|| error!("{e:#}"));
                failed.push(job.brand.as_str());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if !failed.is_empty() {
        bail!(
            "{} of {} brands incomplete: {}",
            failed.len(),
            jobs.len(),
            failed.join(", ")
        );
    }

    info!(
        "Done, {} brands in {}",
        jobs.len(),
        config.output_root.display()
    );
    Ok(())
}
