//! Top-level correlation entry point.
//!
//! [`Correlator`] holds the two input catalogues and the session settings,
//! resolves the requested method through its [`BackendRegistry`] and hands
//! everything to the backend. It makes no matching decisions of its own.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::MatchBackend;
use crate::catalogue::Catalogue;
use crate::config::{CorrelatorConfig, SessionOptions};
use crate::error::{Error, Result};
use crate::registry::BackendRegistry;

#[derive(Debug)]
pub struct Correlator {
    catalogue_a: Catalogue,
    catalogue_b: Catalogue,
    method: Option<String>,
    options: SessionOptions,
    registry: BackendRegistry,
}

impl Correlator {
    /// Correlator with default options and the built-in backends.
    pub fn new(catalogue_a: Catalogue, catalogue_b: Catalogue) -> Self {
        Self {
            catalogue_a,
            catalogue_b,
            method: None,
            options: SessionOptions::default(),
            registry: BackendRegistry::with_defaults(&CorrelatorConfig::default()),
        }
    }

    pub fn from_config(
        config: &CorrelatorConfig,
        catalogue_a: Catalogue,
        catalogue_b: Catalogue,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            catalogue_a,
            catalogue_b,
            method: config.method.clone(),
            options: config.session_options(),
            registry: BackendRegistry::with_defaults(config),
        })
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn catalogue_a(&self) -> &Catalogue {
        &self.catalogue_a
    }

    pub fn set_catalogue_a(&mut self, catalogue: Catalogue) {
        self.catalogue_a = catalogue;
    }

    pub fn catalogue_b(&self) -> &Catalogue {
        &self.catalogue_b
    }

    pub fn set_catalogue_b(&mut self, catalogue: Catalogue) {
        self.catalogue_b = catalogue;
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn set_method(&mut self, method: Option<String>) {
        self.method = method;
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: SessionOptions) {
        self.options = options;
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.options.work_dir.as_deref()
    }

    pub fn set_work_dir(&mut self, work_dir: Option<PathBuf>) {
        self.options.work_dir = work_dir;
    }

    pub fn verbose(&self) -> bool {
        self.options.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.options.verbose = verbose;
    }

    pub fn keep_artifacts(&self) -> bool {
        self.options.keep_artifacts
    }

    pub fn set_keep_artifacts(&mut self, keep: bool) {
        self.options.keep_artifacts = keep;
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.options.timeout
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.options.timeout = timeout;
    }

    /// Magnitude labels serialized for A and B. Only backends that select
    /// magnitudes honour them.
    pub fn magnitude_types(&self) -> (&str, &str) {
        (&self.options.magnitude_a, &self.options.magnitude_b)
    }

    pub fn set_magnitude_types(&mut self, a: impl Into<String>, b: impl Into<String>) {
        self.options.magnitude_a = a.into();
        self.options.magnitude_b = b.into();
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BackendRegistry {
        &mut self.registry
    }

    /// Correlates with the configured method.
    pub fn correlate(&self) -> Result<(Catalogue, Catalogue)> {
        let method = self
            .method
            .as_deref()
            .ok_or_else(|| Error::Configuration("no matching method set".into()))?;
        self.correlate_with(method)
    }

    /// Correlates with `method`, ignoring the configured one.
    pub fn correlate_with(&self, method: &str) -> Result<(Catalogue, Catalogue)> {
        let backend: &dyn MatchBackend = self.registry.resolve(method)?;

        tracing::info!(
            "Correlating '{}' ({} entries) with '{}' ({} entries) using {}",
            self.catalogue_a.name(),
            self.catalogue_a.len(),
            self.catalogue_b.name(),
            self.catalogue_b.len(),
            backend.method()
        );

        backend.correlate(&self.catalogue_a, &self.catalogue_b, &self.options)
    }
}
