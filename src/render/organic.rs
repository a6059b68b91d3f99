//! Organic Maps ignores inline icon styles but knows a fixed set of named
//! placemark styles. This pass flattens a KML file and adds a style reference
//! (and an empty snippet) after the name of every placemark.

use std::{fs, path::Path};

use anyhow::{Context, Result};

const PLACEMARK_START: &str = "<Placemark";
const PLACEMARK_END: &str = "</Placemark";
const NAME_START: &str = "<name>";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Outside,
    Inside,
}

pub fn rework(input: &str, style: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut scan = Scan::Outside;

    for line in input.lines() {
        let line = line.trim_start();
        output.push_str(line);
        output.push('\n');

        if line.contains(PLACEMARK_START) {
            scan = Scan::Inside;
        }
        if line.contains(PLACEMARK_END) {
            scan = Scan::Outside;
        }
        if scan == Scan::Inside && line.contains(NAME_START) {
            output.push_str("<Snippet maxLines=\"0\"/>\n");
            output.push_str(&format!("<styleUrl>#{style}</styleUrl>\n"));
        }
    }

    output
}

/// Rewrites `path` in place.
pub fn rework_file(path: &Path, style: &str) -> Result<()> {
    let input =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    fs::write(path, rework(&input, style))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
