//! Session options and the YAML-backed correlator configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::normalize_string::NormalizeString;
use serde::{Deserialize, Serialize};

use crate::backend::offset::OffsetTuning;
use crate::backend::pattern::PatternTuning;
use crate::catalogue::DEFAULT_MAGNITUDE;
use crate::error::{Error, Result};

/// Default bound on one external tool run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Pass-through configuration for one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Magnitude label serialized for catalogue A.
    pub magnitude_a: String,
    /// Magnitude label serialized for catalogue B.
    pub magnitude_b: String,
    /// Directory for intermediate files. `None` allocates a fresh one per call.
    pub work_dir: Option<PathBuf>,
    /// Leave intermediate files in place after the call.
    pub keep_artifacts: bool,
    /// Log the tool's own output at info level.
    pub verbose: bool,
    /// Upper bound on the external tool's run time. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            magnitude_a: DEFAULT_MAGNITUDE.to_string(),
            magnitude_b: DEFAULT_MAGNITUDE.to_string(),
            work_dir: None,
            keep_artifacts: false,
            verbose: false,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

/// Full correlator configuration, usually loaded from YAML.
///
/// Every field has a default, so a partial file such as
///
/// ```yaml
/// method: pattern
/// keep_artifacts: true
/// pattern:
///   matchrad: 3.0
/// ```
///
/// is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    pub keep_artifacts: bool,
    pub verbose: bool,
    /// Seconds; `null` disables the bound.
    pub timeout_secs: Option<f64>,
    pub magnitude_a: String,
    pub magnitude_b: String,
    /// Directory searched for tool executables before `$CATCORR_TOOL_DIR` and `PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_dir: Option<PathBuf>,
    pub pattern: PatternTuning,
    pub offset: OffsetTuning,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            method: None,
            work_dir: None,
            keep_artifacts: false,
            verbose: false,
            timeout_secs: Some(DEFAULT_TIMEOUT.as_secs_f64()),
            magnitude_a: DEFAULT_MAGNITUDE.to_string(),
            magnitude_b: DEFAULT_MAGNITUDE.to_string(),
            tool_dir: None,
            pattern: PatternTuning::default(),
            offset: OffsetTuning::default(),
        }
    }
}

impl CorrelatorConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yml::from_str(yaml)
            .map_err(|e| Error::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> String {
        serde_yml::to_string(self)
            .expect("Failed to serialize correlator configuration to YAML")
            .normalize()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(secs) = self.timeout_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(Error::Configuration(format!(
                    "timeout_secs must be positive, got {secs}"
                )));
            }
            Duration::try_from_secs_f64(secs).map_err(|e| {
                Error::Configuration(format!("timeout_secs {secs} is out of range: {e}"))
            })?;
        }
        for (field, label) in [
            ("magnitude_a", &self.magnitude_a),
            ("magnitude_b", &self.magnitude_b),
        ] {
            if label.trim().is_empty() || label.contains(char::is_whitespace) {
                return Err(Error::Configuration(format!(
                    "{field} must be a non-empty label without whitespace, got '{label}'"
                )));
            }
        }
        if let Some(method) = &self.method {
            if method.trim().is_empty() {
                return Err(Error::Configuration("method must not be empty".into()));
            }
        }
        self.pattern.validate()?;
        self.offset.validate()?;
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            magnitude_a: self.magnitude_a.clone(),
            magnitude_b: self.magnitude_b.clone(),
            work_dir: self.work_dir.clone(),
            keep_artifacts: self.keep_artifacts,
            verbose: self.verbose,
            // Out-of-range values only get here unvalidated; treat them as unbounded.
            timeout: self
                .timeout_secs
                .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)),
        }
    }
}
