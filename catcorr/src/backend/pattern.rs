//! Triangle pattern matching through a Richmond-style `match` executable.
//!
//! ```text
//! match <A> 1 2 3 <B> 1 2 3 id1=0 id2=0 outfile=<base> trirad=.. nobj=.. matchrad=..
//! ```
//!
//! The tool writes `<base>.mtA` and `<base>.mtB` with one row per match, the
//! same row in both files describing the same pair. Column 0 echoes the id
//! column of the input, which holds the working-copy origin tag.

use std::ffi::OsString;
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
use crate::tool::ToolRunner;

pub const TOOL_NAME: &str = "match";

const MIN_OBJECTS: usize = 3;
const MAX_DERIVED_OBJECTS: usize = 40;

/// Tuning parameters passed to `match`.
///
/// Radii are in the units of the catalogues being matched (pixels or degrees).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternTuning {
    /// Triangle-space matching radius.
    pub trirad: f64,
    /// Number of brightest objects used to build triangles. `None` derives it
    /// from the catalogue sizes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nobj: Option<usize>,
    /// Maximum separation of a matched pair after the transform is applied.
    pub matchrad: f64,
    /// Fixed scale factor between the catalogues, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Restrict the transform to a pure translation.
    pub trans_only: bool,
}

impl Default for PatternTuning {
    fn default() -> Self {
        Self {
            trirad: 0.002,
            nobj: None,
            matchrad: 5.0,
            scale: None,
            trans_only: false,
        }
    }
}

impl PatternTuning {
    pub fn validate(&self) -> Result<()> {
        if !(self.trirad > 0.0 && self.trirad.is_finite()) {
            return Err(Error::Configuration(format!(
                "pattern.trirad must be positive, got {}",
                self.trirad
            )));
        }
        if !(self.matchrad > 0.0 && self.matchrad.is_finite()) {
            return Err(Error::Configuration(format!(
                "pattern.matchrad must be positive, got {}",
                self.matchrad
            )));
        }
        if let Some(nobj) = self.nobj {
            if nobj < MIN_OBJECTS {
                return Err(Error::Configuration(format!(
                    "pattern.nobj must be at least {MIN_OBJECTS}, got {nobj}"
                )));
            }
        }
        if let Some(scale) = self.scale {
            if !(scale > 0.0 && scale.is_finite()) {
                return Err(Error::Configuration(format!(
                    "pattern.scale must be positive, got {scale}"
                )));
            }
        }
        Ok(())
    }

    /// Objects used for triangles: explicit, or half the larger catalogue
    /// within [3, 40].
    pub fn objects_for(&self, len_a: usize, len_b: usize) -> usize {
        self.nobj
            .unwrap_or_else(|| (len_a.max(len_b) / 2).clamp(MIN_OBJECTS, MAX_DERIVED_OBJECTS))
    }
}

#[derive(Debug, Default)]
pub struct PatternBackend {
    tuning: PatternTuning,
    session: ToolSession,
}

impl PatternBackend {
    pub fn new(tuning: PatternTuning, tool_dir: Option<PathBuf>) -> Self {
        Self {
            tuning,
            session: ToolSession::new(Box::new(crate::tool::ProcessRunner), tool_dir),
        }
    }

    /// Replaces the process runner, keeping the tool directory.
    pub fn with_runner(mut self, runner: Box<dyn ToolRunner>) -> Self {
        let tool_dir = self.session.tool_dir().map(PathBuf::from);
        self.session = ToolSession::new(runner, tool_dir);
        self
    }

    pub fn tuning(&self) -> &PatternTuning {
        &self.tuning
    }
}

impl ExternalMatcher for PatternBackend {
    fn tool_name(&self) -> &str {
        TOOL_NAME
    }

    fn session(&self) -> &ToolSession {
        &self.session
    }

    fn selects_magnitudes(&self) -> bool {
        true
    }

    fn plan(&self, tables: &InputTables, scratch: &ScratchDir) -> ToolPlan {
        let base = scratch.base();
        let columns = ["1", "2", "3"];

        let mut args: Vec<OsString> = Vec::new();
        args.push(tables.a.clone().into());
        args.extend(columns.iter().map(OsString::from));
        args.push(tables.b.clone().into());
        args.extend(columns.iter().map(OsString::from));
        args.push("id1=0".into());
        args.push("id2=0".into());

        let mut outfile = OsString::from("outfile=");
        outfile.push(base.as_os_str());
        args.push(outfile);

        args.push(format!("trirad={}", self.tuning.trirad).into());
        args.push(format!("nobj={}", self.tuning.objects_for(tables.len_a, tables.len_b)).into());
        args.push(format!("matchrad={}", self.tuning.matchrad).into());
        if let Some(scale) = self.tuning.scale {
            args.push(format!("scale={scale}").into());
        }
        if self.tuning.trans_only {
            args.push("transonly".into());
        }

        ToolPlan {
            args,
            output_a: scratch.artifact("mtA"),
            output_b: scratch.artifact("mtB"),
        }
    }

    fn recover_origins(&self, rows: &[ExchangeRow]) -> Vec<Option<OriginTag>> {
        rows.iter()
            .map(|row| {
                u32::try_from(row.id)
                    .ok()
                    .filter(|&key| key > 0)
                    .map(OriginTag)
            })
            .collect()
    }
}

impl MatchBackend for PatternBackend {
    fn method(&self) -> MatchMethod {
        MatchMethod::Pattern
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
