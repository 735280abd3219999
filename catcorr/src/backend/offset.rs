//! Offset-grid search through an `offsetgrid` executable.
//!
//! ```text
//! offsetgrid ref=<A> in=<B> out=<base> maxshift=.. step=.. sep=.. nmin=..
//! ```
//!
//! The tool scans a grid of trial translations up to `maxshift`, keeps the one
//! with the most pairs closer than `sep` and writes `<base>.ref.match` and
//! `<base>.in.match`. Each row echoes the matched input line verbatim, comment
//! included, but the id column is renumbered, so origins are recovered from
//! the `# origin=<key>` tag only.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::{
    run_external, ExternalMatcher, InputTables, MatchBackend, MatchMethod, ToolPlan, ToolSession,
};
use crate::catalogue::Catalogue;
use crate::config::SessionOptions;
use crate::error::{Error, Result};
use crate::exchange::{ExchangeRow, OriginTag};
use crate::scratch::ScratchDir;
use crate::tool::{ProcessRunner, ToolRunner};

pub const TOOL_NAME: &str = "offsetgrid";

/// Tuning parameters passed to `offsetgrid`, in catalogue units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetTuning {
    /// Largest translation searched along either axis.
    pub max_shift: f64,
    /// Grid spacing of trial translations.
    pub step: f64,
    /// Pair separation accepted after shifting.
    pub separation: f64,
    /// Fewest pairs for a trial offset to count as a solution.
    pub min_matches: usize,
}

impl Default for OffsetTuning {
    fn default() -> Self {
        Self {
            max_shift: 50.0,
            step: 1.0,
            separation: 2.0,
            min_matches: 3,
        }
    }
}

impl OffsetTuning {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_shift", self.max_shift),
            ("step", self.step),
            ("separation", self.separation),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::Configuration(format!(
                    "offset.{name} must be positive, got {value}"
                )));
            }
        }
        if self.step > self.max_shift {
            return Err(Error::Configuration(format!(
                "offset.step ({}) exceeds offset.max_shift ({})",
                self.step, self.max_shift
            )));
        }
        if self.min_matches == 0 {
            return Err(Error::Configuration(
                "offset.min_matches must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct OffsetBackend {
    tuning: OffsetTuning,
    session: ToolSession,
}

impl OffsetBackend {
    pub fn new(tuning: OffsetTuning, tool_dir: Option<PathBuf>) -> Self {
        Self {
            tuning,
            session: ToolSession::new(Box::new(ProcessRunner), tool_dir),
        }
    }

    pub fn with_runner(mut self, runner: Box<dyn ToolRunner>) -> Self {
        let tool_dir = self.session.tool_dir().map(PathBuf::from);
        self.session = ToolSession::new(runner, tool_dir);
        self
    }

    pub fn tuning(&self) -> &OffsetTuning {
        &self.tuning
    }
}

impl ExternalMatcher for OffsetBackend {
    fn tool_name(&self) -> &str {
        TOOL_NAME
    }

    fn session(&self) -> &ToolSession {
        &self.session
    }

    // offsetgrid reads a single magnitude column and expects the default label.
    fn selects_magnitudes(&self) -> bool {
        false
    }

    fn plan(&self, tables: &InputTables, scratch: &ScratchDir) -> ToolPlan {
        let keyword = |key: &str, value: &std::path::Path| {
            let mut arg = std::ffi::OsString::from(format!("{key}="));
            arg.push(value.as_os_str());
            arg
        };

        let args = vec![
            keyword("ref", &tables.a),
            keyword("in", &tables.b),
            keyword("out", &scratch.base()),
            format!("maxshift={}", self.tuning.max_shift).into(),
            format!("step={}", self.tuning.step).into(),
            format!("sep={}", self.tuning.separation).into(),
            format!("nmin={}", self.tuning.min_matches).into(),
        ];

        ToolPlan {
            args,
            output_a: scratch.artifact("ref.match"),
            output_b: scratch.artifact("in.match"),
        }
    }

    fn recover_origins(&self, rows: &[ExchangeRow]) -> Vec<Option<OriginTag>> {
        rows.iter().map(|row| row.origin).collect()
    }
}

impl MatchBackend for OffsetBackend {
    fn method(&self) -> MatchMethod {
        MatchMethod::Offset
    }

    fn check_available(&self) -> std::result::Result<(), String> {
        self.session
            .locate(TOOL_NAME)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn correlate(
        &self,
        a: &Catalogue,
        b: &Catalogue,
        options: &SessionOptions,
    ) -> Result<(Catalogue, Catalogue)> {
        self.tuning.validate()?;
        run_external(self, a, b, options)
    }
}
