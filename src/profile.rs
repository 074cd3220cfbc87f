//! Metrics profiles
//!
//! A profile is the user-configurable side of the metric catalog: which
//! metrics are enabled, what their warning thresholds are, which parts of
//! the codebase are excluded from analysis, and which reference kinds the
//! dependency graph counts. Profiles are persisted as TOML documents.
//!
//! ## Profile file format
//!
//! ```toml
//! name = "strict"
//!
//! [analysis]
//! # Measured objects matching these patterns are skipped whole.
//! exclude = ["*.generated.*", "legacy.*"]
//!
//! [dependencies]
//! # Reference kinds counted by the dependency graph builder.
//! thrown_types = false
//!
//! [[metric]]
//! id = "statements_per_method"
//! upper_threshold = 30.0
//!
//! [[metric]]
//! id = "fan_in"
//! enabled = false
//! ```

use std::fs;
use std::path::Path;

use glob::Pattern;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::depgraph::DependencyPolicy;
use crate::metric::{Metric, MetricRepository};

/// Errors that can occur when loading or saving a profile
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read profile file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse profile file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize profile: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid exclude pattern: {0}")]
    PatternError(String),
}

/// A metric plus its user-configurable state.
///
/// Threshold values and their enabled flags are independent so a threshold
/// can be switched off without losing its value.
#[derive(Debug, Clone)]
pub struct MetricInstance {
    metric: Metric,
    pub enabled: bool,
    pub lower_threshold: f64,
    pub lower_enabled: bool,
    pub upper_threshold: f64,
    pub upper_enabled: bool,
}

impl MetricInstance {
    /// A fresh instance: enabled, no thresholds.
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            enabled: true,
            lower_threshold: 0.0,
            lower_enabled: false,
            upper_threshold: 0.0,
            upper_enabled: false,
        }
    }

    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    /// Whether a recorded value breaches an enabled threshold.
    pub fn breached_by(&self, value: f64) -> bool {
        (self.upper_enabled && value > self.upper_threshold)
            || (self.lower_enabled && value < self.lower_threshold)
    }

    /// Whether any threshold is enabled at all.
    pub fn has_thresholds(&self) -> bool {
        self.lower_enabled || self.upper_enabled
    }
}

/// Analysis scope settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Glob patterns over measured-object keys (package names, file names,
    /// qualified type names); matching units are skipped whole.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A named set of metric instances plus analysis settings.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    instances: Vec<MetricInstance>,
    pub analysis: AnalysisSettings,
    pub dependency_policy: DependencyPolicy,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: Vec::new(),
            analysis: AnalysisSettings::default(),
            dependency_policy: DependencyPolicy::default(),
        }
    }

    pub fn add_instance(&mut self, instance: MetricInstance) {
        self.instances.push(instance);
    }

    pub fn instances(&self) -> &[MetricInstance] {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut [MetricInstance] {
        &mut self.instances
    }

    /// The instance configuring the given metric, if the profile has one.
    pub fn instance_for(&self, metric_id: &str) -> Option<&MetricInstance> {
        self.instances.iter().find(|i| i.metric().id() == metric_id)
    }

    pub fn instance_for_mut(&mut self, metric_id: &str) -> Option<&mut MetricInstance> {
        self.instances
            .iter_mut()
            .find(|i| i.metric().id() == metric_id)
    }

    /// Instances that take part in a run.
    pub fn enabled_instances(&self) -> impl Iterator<Item = &MetricInstance> {
        self.instances.iter().filter(|i| i.enabled)
    }

    /// A copy under a new name, instances cloned.
    pub fn duplicate(&self, new_name: impl Into<String>) -> Self {
        Self {
            name: new_name.into(),
            ..self.clone()
        }
    }

    /// Compile the exclusion globs for use during a run.
    pub fn compile_scope(&self) -> Result<CompiledScope, ProfileError> {
        CompiledScope::from_patterns(&self.analysis.exclude)
    }

    /// Serialize to the TOML profile format.
    pub fn to_toml(&self) -> Result<String, ProfileError> {
        let doc = ProfileDoc {
            name: self.name.clone(),
            analysis: self.analysis.clone(),
            dependencies: self.dependency_policy.clone(),
            metric: self
                .instances
                .iter()
                .map(|instance| MetricInstanceDoc {
                    id: instance.metric().id().to_string(),
                    enabled: instance.enabled,
                    lower_threshold: instance.lower_enabled.then_some(instance.lower_threshold),
                    upper_threshold: instance.upper_enabled.then_some(instance.upper_threshold),
                })
                .collect(),
        };
        Ok(toml::to_string(&doc)?)
    }

    /// Parse the TOML profile format, resolving metric ids through the
    /// repository. Unknown ids are skipped with a warning: a stale profile
    /// should not make the whole catalog unusable.
    pub fn from_toml(content: &str, repository: &dyn MetricRepository) -> Result<Self, ProfileError> {
        let doc: ProfileDoc = toml::from_str(content)?;

        let mut profile = Profile::new(doc.name);
        profile.analysis = doc.analysis;
        profile.dependency_policy = doc.dependencies;
        for entry in doc.metric {
            let Some(metric) = repository.metric_for_id(&entry.id) else {
                warn!("profile references unknown metric '{}', skipping", entry.id);
                continue;
            };
            let mut instance = MetricInstance::new(metric);
            instance.enabled = entry.enabled;
            if let Some(lower) = entry.lower_threshold {
                instance.lower_threshold = lower;
                instance.lower_enabled = true;
            }
            if let Some(upper) = entry.upper_threshold {
                instance.upper_threshold = upper;
                instance.upper_enabled = true;
            }
            profile.add_instance(instance);
        }
        Ok(profile)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ProfileError> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn load_from_file(
        path: &Path,
        repository: &dyn MetricRepository,
    ) -> Result<Self, ProfileError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content, repository)
    }
}

/// Exclusion patterns compiled once per run.
#[derive(Debug, Default)]
pub struct CompiledScope {
    exclude_patterns: Vec<Pattern>,
}

impl CompiledScope {
    fn from_patterns(patterns: &[String]) -> Result<Self, ProfileError> {
        let exclude_patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| ProfileError::PatternError(format!("{}: {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { exclude_patterns })
    }

    /// Whether a unit with the given key is excluded from analysis.
    pub fn excludes(&self, key: &str) -> bool {
        self.exclude_patterns.iter().any(|p| p.matches(key))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileDoc {
    name: String,
    #[serde(default)]
    analysis: AnalysisSettings,
    #[serde(default)]
    dependencies: DependencyPolicy,
    #[serde(default)]
    metric: Vec<MetricInstanceDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetricInstanceDoc {
    id: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lower_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    upper_threshold: Option<f64>,
}

fn default_enabled() -> bool {
    true
}
