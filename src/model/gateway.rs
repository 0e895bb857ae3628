//! Model resolution with fallback
//!
//! The gateway maps model names to the provider that serves them. Resolution
//! never calls the model: it only hands back a [`ModelHandle`] the step engine
//! can invoke later. Provider clients are built once and shared, so the only
//! memoization needed is the provider itself.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{LanguageModel, ModelError};
use crate::agent::{AgentProfile, TaskClass};
use crate::metrics::MODEL_FALLBACKS;

/// Fallback metric label for requested names outside the catalog
pub const UNCATALOGUED: &str = "uncatalogued";

/// A source of callable models
pub trait ModelProvider: Send + Sync {
    /// Provider name used in logs and errors (e.g. "ollama")
    fn name(&self) -> &str;

    /// Build a handle for `model`.
    ///
    /// Must not perform inference. Implementations may reject the name (not
    /// served, provider disabled) with a [`ModelError`].
    fn instantiate(
        &self,
        model: &str,
        task_class: TaskClass,
    ) -> Result<Arc<dyn LanguageModel>, ModelError>;
}

/// A resolved model ready to be called
#[derive(Clone)]
pub struct ModelHandle {
    /// The name that actually resolved
    pub name: String,
    pub task_class: TaskClass,
    /// True when the requested model could not be used
    pub fell_back: bool,
    pub model: Arc<dyn LanguageModel>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("task_class", &self.task_class)
            .field("fell_back", &self.fell_back)
            .finish()
    }
}

/// Every candidate model failed to resolve
#[derive(Debug, thiserror::Error)]
#[error("no model available (requested {requested:?}, default {default}): {reason}")]
pub struct ModelUnavailable {
    pub requested: Option<String>,
    pub default: String,
    pub reason: String,
}

/// Resolves model names to handles, falling back to the profile default
#[derive(Default, Clone)]
pub struct ModelGateway {
    catalog: HashMap<String, Arc<dyn ModelProvider>>,
}

impl ModelGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `models` resolvable through `provider`
    pub fn register<I, S>(&mut self, provider: Arc<dyn ModelProvider>, models: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for model in models {
            self.catalog.insert(model.into(), Arc::clone(&provider));
        }
    }

    /// Names of all models in the catalog, sorted
    pub fn models(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.catalog.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve the model for one request.
    ///
    /// Tries `requested` first, then the profile's default model for its task
    /// class. Fails only when both are unusable.
    pub fn resolve(
        &self,
        requested: Option<&str>,
        profile: &AgentProfile,
    ) -> Result<ModelHandle, ModelUnavailable> {
        let task_class = profile.task_class;
        let default = profile.default_model.as_str();
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());

        let mut last_error = None;
        if let Some(name) = requested {
            match self.instantiate(name, task_class) {
                Ok(model) => {
                    debug!(model = name, "Resolved requested model");
                    return Ok(ModelHandle {
                        name: name.to_string(),
                        task_class,
                        fell_back: false,
                        model,
                    });
                }
                Err(e) => {
                    warn!(requested = name, fallback = default, error = %e, "Requested model unavailable, falling back");
                    last_error = Some(e);
                }
            }
        }

        match self.instantiate(default, task_class) {
            Ok(model) => {
                if let Some(name) = requested {
                    MODEL_FALLBACKS
                        .with_label_values(&[self.metric_label(name), default])
                        .inc();
                }
                Ok(ModelHandle {
                    name: default.to_string(),
                    task_class,
                    fell_back: requested.is_some(),
                    model,
                })
            }
            Err(e) => {
                let reason = match last_error {
                    Some(first) => format!("{}; {}", first, e),
                    None => e.to_string(),
                };
                Err(ModelUnavailable {
                    requested: requested.map(str::to_string),
                    default: default.to_string(),
                    reason,
                })
            }
        }
    }

    /// Catalogued names are bounded by configuration; anything else the
    /// client sent shares one bucket.
    fn metric_label<'a>(&self, requested: &'a str) -> &'a str {
        if self.catalog.contains_key(requested) {
            requested
        } else {
            UNCATALOGUED
        }
    }

    fn instantiate(
        &self,
        name: &str,
        task_class: TaskClass,
    ) -> Result<Arc<dyn LanguageModel>, ModelError> {
        let provider = self
            .catalog
            .get(name)
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))?;
        provider.instantiate(name, task_class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::profiles;
    use crate::testing::ScriptedProvider;

    fn gateway_with(models: &[&str]) -> ModelGateway {
        let mut gateway = ModelGateway::new();
        gateway.register(Arc::new(ScriptedProvider::default()), models.iter().copied());
        gateway
    }

    fn developer() -> AgentProfile {
        profiles::builtin().get("developer").unwrap().as_ref().clone()
    }

    #[test]
    fn test_requested_model_wins_when_available() {
        let profile = developer();
        let gateway = gateway_with(&["qwen3", &profile.default_model]);
        let handle = gateway.resolve(Some("qwen3"), &profile).unwrap();
        assert_eq!(handle.name, "qwen3");
        assert!(!handle.fell_back);
    }

    #[test]
    fn test_unknown_model_falls_back_to_default() {
        let profile = developer();
        let gateway = gateway_with(&[&profile.default_model]);
        let handle = gateway.resolve(Some("gpt-imaginary"), &profile).unwrap();
        assert_eq!(handle.name, profile.default_model);
        assert!(handle.fell_back);
    }

    #[test]
    fn test_blank_request_uses_default_without_fallback_flag() {
        let profile = developer();
        let gateway = gateway_with(&[&profile.default_model]);
        let handle = gateway.resolve(Some("  "), &profile).unwrap();
        assert!(!handle.fell_back);
    }

    #[test]
    fn test_exhausted_fallback_is_model_unavailable() {
        let profile = developer();
        let gateway = gateway_with(&["something-else"]);
        let err = gateway.resolve(Some("also-missing"), &profile).unwrap_err();
        assert_eq!(err.requested.as_deref(), Some("also-missing"));
        assert_eq!(err.default, profile.default_model);
        assert!(err.reason.contains("also-missing"));
    }

    #[test]
    fn test_disabled_provider_is_skipped() {
        let profile = developer();
        let mut gateway = ModelGateway::new();
        gateway.register(Arc::new(ScriptedProvider::disabled()), ["flaky"]);
        gateway.register(
            Arc::new(ScriptedProvider::default()),
            [profile.default_model.clone()],
        );
        let handle = gateway.resolve(Some("flaky"), &profile).unwrap();
        assert_eq!(handle.name, profile.default_model);
    }

    #[test]
    fn test_fallback_metric_series_stay_bounded() {
        let profile = developer();
        let gateway = gateway_with(&[&profile.default_model]);
        for i in 0..200 {
            let name = format!("made-up-model-{}", i);
            assert!(gateway.resolve(Some(&name), &profile).unwrap().fell_back);
        }

        let exposition = crate::metrics::encode_metrics();
        let series: Vec<&str> = exposition
            .lines()
            .filter(|line| line.starts_with("sprintpilot_model_fallbacks_total{"))
            .collect();
        assert!(series.iter().all(|line| !line.contains("made-up-model-")));
        assert!(series
            .iter()
            .any(|line| line.contains(&format!("requested=\"{}\"", UNCATALOGUED))));
    }
}
