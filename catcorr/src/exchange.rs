//! Textual exchange format shared with the external matching tools.
//!
//! One row per entry, whitespace separated:
//!
//! ```text
//! <id> <coord1> <coord2> <magnitude>  # origin=<key> [note]
//! ```
//!
//! Lines starting with `#` are comments. Everything after the first `#` on a
//! data row is the trailing comment field; its first token may be an origin
//! tag, the rest is free text. Missing magnitudes are written as
//! [`MISSING_MAGNITUDE`].

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use common::normalize_string::NormalizeString;
use glam::DVec2;

use crate::catalogue::{Catalogue, CoordSystem, Entry, Identifier, Position, DEFAULT_MAGNITUDE};
use crate::error::{Error, Result, ToolFailure};

/// Sentinel written for entries without the requested magnitude.
///
/// Only a value that reads back as exactly 99.0 means "missing". A real
/// magnitude that rounds to `99.0000` at the written precision is
/// indistinguishable from it.
pub const MISSING_MAGNITUDE: f64 = 99.0;

const ORIGIN_KEY: &str = "origin=";

/// Reference from a serialized row back to the working-copy entry it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OriginTag(pub u32);

impl fmt::Display for OriginTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ORIGIN_KEY, self.0)
    }
}

impl FromStr for OriginTag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let value = s
            .strip_prefix(ORIGIN_KEY)
            .ok_or_else(|| format!("'{s}' is not an origin tag"))?;
        value
            .parse::<u32>()
            .map(OriginTag)
            .map_err(|e| format!("bad origin tag '{s}': {e}"))
    }
}

/// One parsed or to-be-written table row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRow {
    pub id: Identifier,
    pub coords: DVec2,
    pub magnitude: Option<f64>,
    pub origin: Option<OriginTag>,
    pub note: String,
}

impl ExchangeRow {
    pub fn to_line(&self, system: CoordSystem) -> String {
        let precision = match system {
            CoordSystem::Pixel => 4,
            CoordSystem::Sky => 8,
        };
        let mut line = format!(
            "{:>8} {:>18.prec$} {:>18.prec$} {:>9.4}",
            self.id,
            self.coords.x,
            self.coords.y,
            self.magnitude.unwrap_or(MISSING_MAGNITUDE),
            prec = precision
        );

        if self.origin.is_some() || !self.note.is_empty() {
            line.push_str("  #");
            if let Some(origin) = self.origin {
                line.push(' ');
                line.push_str(&origin.to_string());
            }
            if !self.note.is_empty() {
                line.push(' ');
                line.push_str(&self.note);
            }
        }
        line
    }

    /// Parses a data row. Extra numeric columns after the magnitude are ignored.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let (data, comment) = match line.split_once('#') {
            Some((data, comment)) => (data, comment.trim()),
            None => (line, ""),
        };

        let columns: Vec<&str> = data.split_whitespace().collect();
        if columns.len() < 4 {
            return Err(format!("expected at least 4 columns, found {}", columns.len()));
        }

        let id = columns[0]
            .parse::<Identifier>()
            .map_err(|e| format!("bad identifier '{}': {e}", columns[0]))?;
        let number = |idx: usize| {
            columns[idx]
                .parse::<f64>()
                .map_err(|e| format!("bad number '{}' in column {}: {e}", columns[idx], idx + 1))
        };
        let coords = DVec2::new(number(1)?, number(2)?);
        let mag = number(3)?;
        let magnitude = (mag != MISSING_MAGNITUDE).then_some(mag);

        let (origin, note) = match comment.split_once(char::is_whitespace) {
            _ if !comment.starts_with(ORIGIN_KEY) => (None, comment.to_string()),
            Some((tag, rest)) => (Some(tag.parse::<OriginTag>()?), rest.trim().to_string()),
            None => (Some(comment.parse::<OriginTag>()?), String::new()),
        };

        Ok(Self {
            id,
            coords,
            magnitude,
            origin,
            note,
        })
    }
}

/// Writes rows (optionally preceded by `#` header lines) to `path`.
pub fn write_rows(
    path: &Path,
    system: CoordSystem,
    header: &[String],
    rows: &[ExchangeRow],
) -> std::result::Result<(), ToolFailure> {
    let mut text = String::new();
    for line in header {
        text.push_str("# ");
        text.push_str(line);
        text.push('\n');
    }
    for row in rows {
        text.push_str(&row.to_line(system));
        text.push('\n');
    }

    fs::write(path, text).map_err(|source| ToolFailure::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads every data row of a table, skipping comment and blank lines.
pub fn read_rows(path: &Path) -> std::result::Result<Vec<ExchangeRow>, ToolFailure> {
    let text = fs::read_to_string(path).map_err(|source| ToolFailure::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rows = Vec::new();
    for (idx, line) in text.normalize().lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = ExchangeRow::parse(line).map_err(|reason| ToolFailure::MalformedOutput {
            path: path.to_path_buf(),
            line: idx + 1,
            reason,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Writes a whole catalogue, identifiers and annotations included.
///
/// The header records the catalogue name, coordinate system and magnitude
/// label so [`read_catalogue`] can restore them.
pub fn write_catalogue(path: &Path, catalogue: &Catalogue, magnitude: &str) -> anyhow::Result<()> {
    let system = catalogue.coord_system().unwrap_or(CoordSystem::Pixel);
    let header = vec![
        format!("catalogue {}", catalogue.name()),
        format!("system {system}"),
        format!("magnitude {magnitude}"),
    ];
    let rows: Vec<ExchangeRow> = catalogue
        .iter()
        .map(|entry| ExchangeRow {
            id: entry.identifier,
            coords: entry.position.coords(),
            magnitude: entry.magnitude(magnitude),
            origin: None,
            // One row per entry: embedded line breaks would split it.
            note: entry.annotation.replace(['\n', '\r'], " "),
        })
        .collect();

    write_rows(path, system, &header, &rows)
        .with_context(|| format!("Failed to write catalogue '{}'", catalogue.name()))
}

/// Reads a catalogue written by [`write_catalogue`] or any table in the
/// exchange layout. Without a header the file is taken to be in pixel space
/// with `mag` magnitudes, named after the file stem.
pub fn read_catalogue(path: &Path) -> Result<Catalogue> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::InvalidInput(format!("cannot read {}: {e}", path.display())))?;

    let mut name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("catalogue")
        .to_string();
    let mut system = CoordSystem::Pixel;
    let mut magnitude = DEFAULT_MAGNITUDE.to_string();
    let mut catalogue_entries = Vec::new();

    for (idx, line) in text.data_lines().into_iter().enumerate() {
        if let Some(comment) = line.strip_prefix('#') {
            let comment = comment.trim();
            if let Some(value) = comment.strip_prefix("catalogue ") {
                name = value.trim().to_string();
            } else if let Some(value) = comment.strip_prefix("system ") {
                system = value.trim().parse().map_err(|_| {
                    Error::InvalidInput(format!(
                        "{}: unknown coordinate system '{}'",
                        path.display(),
                        value.trim()
                    ))
                })?;
            } else if let Some(value) = comment.strip_prefix("magnitude ") {
                magnitude = value.trim().to_string();
            }
            continue;
        }

        let row = ExchangeRow::parse(line).map_err(|reason| {
            Error::InvalidInput(format!("{} row {}: {reason}", path.display(), idx + 1))
        })?;
        let mut entry = Entry::new(row.id, Position::from_coords(system, row.coords))
            .with_annotation(row.note);
        if let Some(value) = row.magnitude {
            entry = entry.with_magnitude(magnitude.clone(), value);
        }
        catalogue_entries.push(entry);
    }

    Ok(Catalogue::from_entries(name, catalogue_entries))
}
