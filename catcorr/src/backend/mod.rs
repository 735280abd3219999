//! Matching backends.
//!
//! Every backend wraps one external point-matching program. The shared
//! driver [`run_external`] performs the steps common to all of them:
//!
//! 1. Validate the inputs and locate the executable
//! 2. Copy both catalogues into private working copies
//! 3. Serialize them into scratch storage
//! 4. Run the tool with backend-specific arguments
//! 5. Parse the two row-aligned result tables
//! 6. Reconcile origin tags back to fully-attributed entries
//! 7. Release scratch storage (on drop, on every path)
//!
//! A backend only supplies the tool-specific parts through [`ExternalMatcher`].

pub mod offset;
pub mod pattern;

use std::ffi::OsString;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use strum_macros::{Display, EnumIter, EnumString};

use crate::catalogue::{Catalogue, CoordSystem, DEFAULT_MAGNITUDE};
use crate::config::SessionOptions;
use crate::error::{Error, Result, ToolFailure};
use crate::exchange::{self, ExchangeRow, OriginTag};
use crate::scratch::ScratchDir;
use crate::tool::{ProcessRunner, ToolInvocation, ToolOutput, ToolRunner, ToolStatus};
use crate::working::{reconcile, WorkingCatalogue};

pub use offset::{OffsetBackend, OffsetTuning};
pub use pattern::{PatternBackend, PatternTuning};

/// Known matching methods. Parsing is case-insensitive and accepts aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum MatchMethod {
    /// Triangle pattern matching.
    #[strum(
        to_string = "pattern",
        serialize = "pattern-match",
        serialize = "triangle",
        serialize = "match"
    )]
    Pattern,
    /// Offset-grid search.
    #[strum(
        to_string = "offset",
        serialize = "grid-offset",
        serialize = "offsetgrid",
        serialize = "grid"
    )]
    Offset,
}

/// The matching contract every backend satisfies.
pub trait MatchBackend: Debug + Send + Sync {
    fn method(&self) -> MatchMethod;

    /// `Err(reason)` when the backend cannot run in the current environment.
    fn check_available(&self) -> std::result::Result<(), String>;

    /// Matches `a` against `b`. Both outputs have equal length and entry `i`
    /// of each carries identifier `i + 1`. The inputs are never modified.
    fn correlate(
        &self,
        a: &Catalogue,
        b: &Catalogue,
        options: &SessionOptions,
    ) -> Result<(Catalogue, Catalogue)>;
}

/// Tool handle owned by one backend instance: how to find and how to run it.
#[derive(Debug)]
pub struct ToolSession {
    runner: Box<dyn ToolRunner>,
    tool_dir: Option<PathBuf>,
}

impl Default for ToolSession {
    fn default() -> Self {
        Self::new(Box::new(ProcessRunner), None)
    }
}

impl ToolSession {
    pub fn new(runner: Box<dyn ToolRunner>, tool_dir: Option<PathBuf>) -> Self {
        Self { runner, tool_dir }
    }

    pub fn tool_dir(&self) -> Option<&Path> {
        self.tool_dir.as_deref()
    }

    pub fn locate(&self, tool: &str) -> std::result::Result<PathBuf, ToolFailure> {
        self.runner.locate(tool, self.tool_dir())
    }

    pub fn run(&self, invocation: &ToolInvocation) -> std::result::Result<ToolOutput, ToolFailure> {
        self.runner.run(invocation)
    }
}

/// Serialized input tables of one run.
#[derive(Debug, Clone)]
pub struct InputTables {
    pub a: PathBuf,
    pub b: PathBuf,
    pub len_a: usize,
    pub len_b: usize,
}

/// Arguments and result locations of one tool run.
#[derive(Debug, Clone)]
pub struct ToolPlan {
    pub args: Vec<OsString>,
    pub output_a: PathBuf,
    pub output_b: PathBuf,
}

/// Tool-specific half of a backend.
pub trait ExternalMatcher: Debug + Send + Sync {
    /// Executable file name.
    fn tool_name(&self) -> &str;

    fn session(&self) -> &ToolSession;

    /// Whether per-catalogue magnitude labels are honoured.
    fn selects_magnitudes(&self) -> bool;

    fn plan(&self, tables: &InputTables, scratch: &ScratchDir) -> ToolPlan;

    /// Origin tag of each result row; `None` for rows that carry no usable reference.
    fn recover_origins(&self, rows: &[ExchangeRow]) -> Vec<Option<OriginTag>>;
}

/// Checks the preconditions shared by all backends and returns the common
/// coordinate system.
pub fn validate_inputs(a: &Catalogue, b: &Catalogue) -> Result<CoordSystem> {
    let system_of = |cat: &Catalogue, label: &str| -> Result<CoordSystem> {
        if cat.is_empty() {
            return Err(Error::InvalidInput(format!(
                "catalogue {label} ('{}') is empty",
                cat.name()
            )));
        }
        let system = cat.coord_system().ok_or_else(|| {
            Error::InvalidInput(format!(
                "catalogue {label} ('{}') mixes pixel and sky positions",
                cat.name()
            ))
        })?;
        if let Some(entry) = cat.iter().find(|e| !e.position.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "catalogue {label} ('{}') entry {} has a non-finite position",
                cat.name(),
                entry.identifier
            )));
        }
        Ok(system)
    };

    let system_a = system_of(a, "A")?;
    let system_b = system_of(b, "B")?;
    if system_a != system_b {
        return Err(Error::InvalidInput(format!(
            "catalogues are not comparable: A is in {system_a} space, B in {system_b} space"
        )));
    }
    Ok(system_a)
}

fn magnitude_labels<M: ExternalMatcher + ?Sized>(
    matcher: &M,
    options: &SessionOptions,
) -> (String, String) {
    if matcher.selects_magnitudes() {
        return (options.magnitude_a.clone(), options.magnitude_b.clone());
    }
    if options.magnitude_a != DEFAULT_MAGNITUDE || options.magnitude_b != DEFAULT_MAGNITUDE {
        tracing::warn!(
            "{} ignores magnitude selection ({}, {}); using '{}'",
            matcher.tool_name(),
            options.magnitude_a,
            options.magnitude_b,
            DEFAULT_MAGNITUDE
        );
    }
    (DEFAULT_MAGNITUDE.to_string(), DEFAULT_MAGNITUDE.to_string())
}

/// Runs one full correlation through an external tool.
pub fn run_external<M: ExternalMatcher + ?Sized>(
    matcher: &M,
    a: &Catalogue,
    b: &Catalogue,
    options: &SessionOptions,
) -> Result<(Catalogue, Catalogue)> {
    let system = validate_inputs(a, b)?;
    let tool = matcher.tool_name();
    let session = matcher.session();
    let tool_error = |failure| Error::tool(tool, failure);

    // Resolved before anything touches the filesystem.
    let program = session.locate(tool).map_err(tool_error)?;

    let (mag_a, mag_b) = magnitude_labels(matcher, options);
    let mut work_a = WorkingCatalogue::new(a, system);
    let mut work_b = WorkingCatalogue::new(b, system);

    let scratch = ScratchDir::create(options.work_dir.as_deref(), options.keep_artifacts)
        .map_err(|source| {
            tool_error(ToolFailure::Io {
                path: options
                    .work_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir),
                source,
            })
        })?;

    let tables = InputTables {
        a: scratch.artifact("a.cat"),
        b: scratch.artifact("b.cat"),
        len_a: work_a.len(),
        len_b: work_b.len(),
    };
    exchange::write_rows(&tables.a, system, &[], &work_a.exchange_rows(&mag_a))
        .map_err(tool_error)?;
    exchange::write_rows(&tables.b, system, &[], &work_b.exchange_rows(&mag_b))
        .map_err(tool_error)?;
    tracing::debug!(
        "Serialized {} ({} rows, {}) and {} ({} rows, {})",
        work_a.name(),
        tables.len_a,
        mag_a,
        work_b.name(),
        tables.len_b,
        mag_b
    );

    let plan = matcher.plan(&tables, &scratch);
    let invocation = ToolInvocation {
        program,
        args: plan.args,
        working_dir: scratch.dir().to_path_buf(),
        stdout_path: scratch.artifact("stdout"),
        stderr_path: scratch.artifact("stderr"),
        timeout: options.timeout,
        expected_outputs: vec![plan.output_a.clone(), plan.output_b.clone()],
    };

    tracing::info!(
        "Running {} on {} x {} entries",
        tool,
        tables.len_a,
        tables.len_b
    );
    let output = session.run(&invocation).map_err(tool_error)?;

    if options.verbose {
        tracing::info!("{} output:\n{}", tool, output.stdout.trim_end());
    } else {
        tracing::debug!("{} output:\n{}", tool, output.stdout.trim_end());
    }

    match &output.status {
        ToolStatus::Success => {}
        ToolStatus::Failed(status) => {
            tracing::error!("{} failed ({}): {}", tool, status, output.diagnostics());
            return Err(Error::tool_with_diagnostics(
                tool,
                ToolFailure::NonZeroExit {
                    status: status.clone(),
                },
                output.diagnostics(),
            ));
        }
        ToolStatus::TimedOut(limit) => {
            tracing::error!("{} timed out after {:?}", tool, limit);
            return Err(Error::tool_with_diagnostics(
                tool,
                ToolFailure::TimedOut(*limit),
                output.diagnostics(),
            ));
        }
    }

    for path in &invocation.expected_outputs {
        if !path.is_file() {
            return Err(Error::tool_with_diagnostics(
                tool,
                ToolFailure::MissingOutput(path.clone()),
                output.diagnostics(),
            ));
        }
    }

    let rows_a = exchange::read_rows(&plan.output_a).map_err(tool_error)?;
    let rows_b = exchange::read_rows(&plan.output_b).map_err(tool_error)?;
    if rows_a.len() != rows_b.len() {
        return Err(tool_error(ToolFailure::MalformedOutput {
            path: plan.output_b.clone(),
            line: 0,
            reason: format!(
                "{} rows, but {} rows in {}",
                rows_b.len(),
                rows_a.len(),
                plan.output_a.display()
            ),
        }));
    }

    let tags_a = matcher.recover_origins(&rows_a);
    let tags_b = matcher.recover_origins(&rows_b);
    let (matched_a, matched_b, stats) = reconcile(&tags_a, &tags_b, &mut work_a, &mut work_b);

    tracing::info!(
        "{} matched {} pairs in {:.2?} ({} result rows, {} dropped)",
        tool,
        stats.matched,
        output.elapsed,
        stats.rows,
        stats.dropped
    );

    Ok((matched_a, matched_b))
}
