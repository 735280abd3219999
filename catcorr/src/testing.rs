//! Test doubles for the external matching tools.
//!
//! [`NearestNeighbourRunner`] stands in for both `match` and `offsetgrid`: it
//! reads the serialized tables named in the invocation, pairs rows greedily by
//! nearest neighbour within a tolerance and writes result tables in the layout
//! the real tool would produce.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use glam::DVec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{OffsetBackend, OffsetTuning, PatternBackend, PatternTuning};
use crate::catalogue::{Catalogue, Entry};
use crate::error::ToolFailure;
use crate::exchange::{self, ExchangeRow};
use crate::tool::{ToolInvocation, ToolOutput, ToolRunner, ToolStatus};

/// Origin key no working copy in these tests ever reaches.
pub const UNKNOWN_KEY: u32 = 9_999;

#[derive(Debug, Clone)]
pub struct NearestNeighbourRunner {
    tolerance: f64,
    unknown_row: bool,
    duplicate_row: bool,
    failure: Option<(ToolStatus, String)>,
    write_outputs: bool,
    available: bool,
}

impl NearestNeighbourRunner {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            unknown_row: false,
            duplicate_row: false,
            failure: None,
            write_outputs: true,
            available: true,
        }
    }

    /// Appends one result row referencing [`UNKNOWN_KEY`] on both sides.
    pub fn with_unknown_row(mut self) -> Self {
        self.unknown_row = true;
        self
    }

    /// Follows the first pair with a spurious row that pairs the first A
    /// source again, with the B source of the second pair.
    pub fn with_duplicate_row(mut self) -> Self {
        self.duplicate_row = true;
        self
    }

    /// Reports `status` with `stderr` instead of matching.
    pub fn failing(mut self, status: ToolStatus, stderr: &str) -> Self {
        self.failure = Some((status, stderr.to_string()));
        self
    }

    /// Exits successfully without writing result tables.
    pub fn without_outputs(mut self) -> Self {
        self.write_outputs = false;
        self
    }

    /// Behaves as if the executable were not installed.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    fn pair_rows(&self, rows_a: &[ExchangeRow], rows_b: &[ExchangeRow]) -> Vec<(usize, usize)> {
        let mut used = vec![false; rows_b.len()];
        let mut pairs = Vec::new();
        for (ia, row_a) in rows_a.iter().enumerate() {
            let best = rows_b
                .iter()
                .enumerate()
                .filter(|(ib, _)| !used[*ib])
                .map(|(ib, row_b)| (ib, row_a.coords.distance(row_b.coords)))
                .filter(|(_, dist)| *dist <= self.tolerance)
                .min_by(|x, y| x.1.total_cmp(&y.1));
            if let Some((ib, _)) = best {
                used[ib] = true;
                pairs.push((ia, ib));
            }
        }
        if self.duplicate_row && pairs.len() >= 2 {
            pairs.insert(1, (pairs[0].0, pairs[1].1));
        }
        pairs
    }

    fn run_pattern(&self, inv: &ToolInvocation, base: &str) -> Result<(), ToolFailure> {
        let path_a = arg_path(inv, 0)?;
        let path_b = arg_path(inv, 4)?;
        let rows_a = exchange::read_rows(&path_a)?;
        let rows_b = exchange::read_rows(&path_b)?;

        let brief = |row: &ExchangeRow| {
            format!(
                "{:6} {:10.2} {:10.2} {:6.2}\n",
                row.id,
                row.coords.x,
                row.coords.y,
                row.magnitude.unwrap_or(exchange::MISSING_MAGNITUDE)
            )
        };

        let mut out_a = String::new();
        let mut out_b = String::new();
        for (ia, ib) in self.pair_rows(&rows_a, &rows_b) {
            out_a.push_str(&brief(&rows_a[ia]));
            out_b.push_str(&brief(&rows_b[ib]));
        }
        if self.unknown_row {
            let line = format!("{UNKNOWN_KEY:6} 1.00 1.00 10.00\n");
            out_a.push_str(&line);
            out_b.push_str(&line);
        }

        write(&PathBuf::from(format!("{base}.mtA")), &out_a)?;
        write(&PathBuf::from(format!("{base}.mtB")), &out_b)?;
        write(&PathBuf::from(format!("{base}.unA")), "")?;
        write(&PathBuf::from(format!("{base}.unB")), "")
    }

    fn run_offset(&self, inv: &ToolInvocation, base: &str) -> Result<(), ToolFailure> {
        let keyword_path = |key: &str| {
            inv.keyword(key).map(PathBuf::from).ok_or_else(|| ToolFailure::NonZeroExit {
                status: format!("missing {key}= argument"),
            })
        };
        let path_a = keyword_path("ref")?;
        let path_b = keyword_path("in")?;
        let lines_a = data_lines(&path_a)?;
        let lines_b = data_lines(&path_b)?;
        let rows_a = exchange::read_rows(&path_a)?;
        let rows_b = exchange::read_rows(&path_b)?;

        // Echo each matched line with its id column renumbered.
        let renumber = |k: usize, line: &str| {
            let rest = line.split_once(char::is_whitespace).map_or("", |(_, rest)| rest);
            format!("{} {}\n", k + 1, rest.trim_start())
        };

        let mut out_a = String::new();
        let mut out_b = String::new();
        for (k, (ia, ib)) in self.pair_rows(&rows_a, &rows_b).into_iter().enumerate() {
            out_a.push_str(&renumber(k, &lines_a[ia]));
            out_b.push_str(&renumber(k, &lines_b[ib]));
        }
        if self.unknown_row {
            let line = format!("0 1.0 1.0 10.0  # origin={UNKNOWN_KEY}\n");
            out_a.push_str(&line);
            out_b.push_str(&line);
        }

        write(&PathBuf::from(format!("{base}.ref.match")), &out_a)?;
        write(&PathBuf::from(format!("{base}.in.match")), &out_b)
    }
}

impl ToolRunner for NearestNeighbourRunner {
    fn locate(&self, name: &str, _explicit_dir: Option<&Path>) -> Result<PathBuf, ToolFailure> {
        if self.available {
            Ok(PathBuf::from(name))
        } else {
            Err(ToolFailure::MissingExecutable {
                name: name.to_string(),
                searched: "nowhere".to_string(),
            })
        }
    }

    fn run(&self, inv: &ToolInvocation) -> Result<ToolOutput, ToolFailure> {
        write(&inv.stdout_path, "fake matcher\n")?;
        write(&inv.stderr_path, "")?;

        if let Some((status, stderr)) = &self.failure {
            return Ok(ToolOutput {
                status: status.clone(),
                stdout: String::new(),
                stderr: stderr.clone(),
                elapsed: Duration::ZERO,
            });
        }

        if self.write_outputs {
            if let Some(base) = inv.keyword("outfile") {
                self.run_pattern(inv, &base)?;
            } else if let Some(base) = inv.keyword("out") {
                self.run_offset(inv, &base)?;
            }
        }

        Ok(ToolOutput {
            status: ToolStatus::Success,
            stdout: "fake matcher\n".to_string(),
            stderr: String::new(),
            elapsed: Duration::from_millis(1),
        })
    }
}

fn arg_path(inv: &ToolInvocation, idx: usize) -> Result<PathBuf, ToolFailure> {
    inv.args
        .get(idx)
        .map(PathBuf::from)
        .ok_or_else(|| ToolFailure::NonZeroExit {
            status: format!("missing positional argument {idx}"),
        })
}

fn data_lines(path: &Path) -> Result<Vec<String>, ToolFailure> {
    let text = fs::read_to_string(path).map_err(|source| ToolFailure::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn write(path: &Path, text: &str) -> Result<(), ToolFailure> {
    fs::write(path, text).map_err(|source| ToolFailure::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn fake_pattern_backend(tolerance: f64) -> PatternBackend {
    PatternBackend::new(PatternTuning::default(), None)
        .with_runner(Box::new(NearestNeighbourRunner::new(tolerance)))
}

pub fn fake_offset_backend(tolerance: f64) -> OffsetBackend {
    OffsetBackend::new(OffsetTuning::default(), None)
        .with_runner(Box::new(NearestNeighbourRunner::new(tolerance)))
}

/// The two-catalogue scenario where only (10,10) and (10.2,9.9) coincide.
pub fn scenario_catalogues() -> (Catalogue, Catalogue) {
    let a = Catalogue::from_entries(
        "A",
        vec![
            Entry::pixel(1, 10.0, 10.0).with_mag(5.0),
            Entry::pixel(2, 50.0, 50.0).with_mag(6.0),
        ],
    );
    let b = Catalogue::from_entries(
        "B",
        vec![
            Entry::pixel(7, 10.2, 9.9).with_mag(5.1),
            Entry::pixel(9, 200.0, 200.0).with_mag(9.0),
        ],
    );
    (a, b)
}

/// Two catalogues sharing `common` sources (jittered by less than 0.05 px)
/// plus `extra` unrelated sources each, placed far apart so every shared
/// source has exactly one counterpart within 1 px.
pub fn fabricated_pair(seed: u64, common: usize, extra: usize) -> (Catalogue, Catalogue) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut a = Catalogue::new("fabricated-a");
    let mut b = Catalogue::new("fabricated-b");

    // Sources sit on a coarse grid so no two are ever within matching range.
    let mut cells: Vec<DVec2> = (0..(common + 2 * extra))
        .map(|i| DVec2::new((i % 50) as f64 * 20.0, (i / 50) as f64 * 20.0))
        .collect();
    for i in (1..cells.len()).rev() {
        let j = rng.random_range(0..=i);
        cells.swap(i, j);
    }

    let mut next_a = 100;
    let mut next_b = 500;
    for cell in cells.iter().take(common) {
        let mag = rng.random_range(8.0..16.0);
        a.push(Entry::pixel(next_a, cell.x, cell.y).with_mag(mag));
        let jitter = DVec2::new(rng.random_range(-0.03..0.03), rng.random_range(-0.03..0.03));
        b.push(Entry::pixel(next_b, cell.x + jitter.x, cell.y + jitter.y).with_mag(mag + 0.1));
        next_a += 1;
        next_b += 1;
    }
    for cell in cells.iter().skip(common).take(extra) {
        a.push(Entry::pixel(next_a, cell.x, cell.y).with_mag(rng.random_range(8.0..16.0)));
        next_a += 1;
    }
    for cell in cells.iter().skip(common + extra) {
        b.push(Entry::pixel(next_b, cell.x, cell.y).with_mag(rng.random_range(8.0..16.0)));
        next_b += 1;
    }
    (a, b)
}
