//! Method-name to backend dispatch.

use std::str::FromStr;

use hashbrown::HashMap;
use strum::IntoEnumIterator;

use crate::backend::{MatchBackend, MatchMethod, OffsetBackend, PatternBackend};
use crate::config::CorrelatorConfig;
use crate::error::{Error, Result};

/// Registered backends, keyed by method.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: HashMap<MatchMethod, Box<dyn MatchBackend>>,
}

impl BackendRegistry {
    /// Registry with the built-in backends, tuned and located per `config`.
    pub fn with_defaults(config: &CorrelatorConfig) -> Self {
        let mut registry = Self::default();
        registry.register(Box::new(PatternBackend::new(
            config.pattern.clone(),
            config.tool_dir.clone(),
        )));
        registry.register(Box::new(OffsetBackend::new(
            config.offset.clone(),
            config.tool_dir.clone(),
        )));
        registry
    }

    /// Adds `backend` under its method, replacing any previous registration.
    pub fn register(&mut self, backend: Box<dyn MatchBackend>) -> Option<Box<dyn MatchBackend>> {
        self.backends.insert(backend.method(), backend)
    }

    pub fn unregister(&mut self, method: MatchMethod) -> Option<Box<dyn MatchBackend>> {
        self.backends.remove(&method)
    }

    /// Registered methods in declaration order.
    pub fn methods(&self) -> Vec<MatchMethod> {
        MatchMethod::iter()
            .filter(|method| self.backends.contains_key(method))
            .collect()
    }

    /// Resolves a case-insensitive method name to a backend that can run now.
    ///
    /// Unknown names, unregistered methods and backends whose executable
    /// cannot be found all fail with [`Error::MethodNotFound`].
    pub fn resolve(&self, name: &str) -> Result<&dyn MatchBackend> {
        let not_found = |reason: String| Error::MethodNotFound {
            method: name.to_string(),
            reason,
        };

        let method = MatchMethod::from_str(name.trim()).map_err(|_| {
            let known = MatchMethod::iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            not_found(format!("unknown method, expected one of: {known}"))
        })?;

        let backend = self
            .backends
            .get(&method)
            .ok_or_else(|| not_found(format!("no backend registered for '{method}'")))?;

        backend.check_available().map_err(not_found)?;

        tracing::debug!("Resolved matching method '{}' to {}", name, method);
        Ok(backend.as_ref())
    }
}
