//! `pagewarden.yaml` model and the component builders derived from it.
//!
//! Every section is optional; anything left out falls back to the built-in
//! defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dismissal_cascade::{CascadeConfig, GuidedTour, DEFAULT_MONITOR_INTERVAL};
use dismissal_executor::{ExecutorTimeouts, SelectorCatalog, TourStep};
use knowledge_store::RetentionPolicy;
use obstruction_analyzer::{ContextRule, ContextRules, GENERIC_CONTEXT};
use selector_resolver::ResolverConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vision_oracle::OracleConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub knowledge: KnowledgeSection,
    pub timeouts: TimeoutSection,
    pub cascade: CascadeSection,
    pub catalog: SelectorCatalog,
    pub contexts: ContextSection,
    pub oracle: OracleSection,
    pub monitor: MonitorSection,
    pub browser: BrowserSection,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSection {
    pub path: PathBuf,
    pub retention: RetentionPolicy,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("DB/knowledge.json"),
            retention: RetentionPolicy::default(),
        }
    }
}

/// Per-operation limits in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSection {
    pub presence_ms: u64,
    pub visibility_ms: u64,
    pub enabled_ms: u64,
    pub click_ms: u64,
    pub settle_ms: u64,
    pub force_ms: u64,
    pub validation_ms: u64,
    pub multi_step_base_ms: u64,
    pub multi_step_increment_ms: u64,
    pub multi_step_max_ms: u64,
    pub inter_step_pause_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            presence_ms: 5_000,
            visibility_ms: 1_000,
            enabled_ms: 1_000,
            click_ms: 5_000,
            settle_ms: 500,
            force_ms: 10_000,
            validation_ms: 5_000,
            multi_step_base_ms: 5_000,
            multi_step_increment_ms: 1_000,
            multi_step_max_ms: 15_000,
            inter_step_pause_ms: 1_500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeSection {
    pub total_budget_ms: u64,
    /// `None` keeps the built-in match-page tour; an empty list disables tours.
    pub guided_tours: Option<Vec<TourSection>>,
}

impl Default for CascadeSection {
    fn default() -> Self {
        Self {
            total_budget_ms: 60_000,
            guided_tours: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TourSection {
    pub context: String,
    pub steps: Vec<TourStepSection>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TourStepSection {
    pub label: String,
    pub candidates: Vec<String>,
    #[serde(default)]
    pub pause_before_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    /// `None` keeps the built-in URL rules.
    pub rules: Option<Vec<ContextRule>>,
    pub fallback: String,
    /// Page text that confirms a context, matched case-insensitively.
    pub markers: BTreeMap<String, Vec<String>>,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            rules: None,
            fallback: GENERIC_CONTEXT.to_string(),
            markers: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub enabled: bool,
    pub api_base: String,
    pub model: String,
    /// Environment variable holding a comma-separated key list.
    pub api_keys_env: String,
    pub temperature: f32,
    pub timeout_ms: u64,
}

impl Default for OracleSection {
    fn default() -> Self {
        let defaults = OracleConfig::default();
        Self {
            enabled: false,
            api_base: defaults.api_base,
            model: defaults.model,
            api_keys_env: "PAGEWARDEN_ORACLE_KEYS".to_string(),
            temperature: defaults.temperature,
            timeout_ms: defaults.timeout.as_millis() as u64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub interval_ms: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_MONITOR_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
        }
    }
}

impl WardenConfig {
    pub fn from_yaml(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let config: WardenConfig =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let RetentionPolicy::InsertionOrder { cap: 0 } = self.knowledge.retention {
            return Err(ConfigError::Invalid(
                "knowledge.retention.cap must be at least 1".into(),
            ));
        }
        if self.cascade.total_budget_ms == 0 {
            return Err(ConfigError::Invalid(
                "cascade.total_budget_ms must be positive".into(),
            ));
        }
        if self.monitor.interval_ms == 0 {
            return Err(ConfigError::Invalid("monitor.interval_ms must be positive".into()));
        }
        if self.contexts.fallback.trim().is_empty() {
            return Err(ConfigError::Invalid("contexts.fallback must not be empty".into()));
        }
        if let Some(tours) = &self.cascade.guided_tours {
            if let Some(tour) = tours.iter().find(|tour| tour.steps.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "guided tour for '{}' has no steps",
                    tour.context
                )));
            }
        }
        Ok(())
    }

    pub fn executor_timeouts(&self) -> ExecutorTimeouts {
        let t = &self.timeouts;
        ExecutorTimeouts {
            presence: ms(t.presence_ms),
            visibility: ms(t.visibility_ms),
            enabled: ms(t.enabled_ms),
            click: ms(t.click_ms),
            settle: ms(t.settle_ms),
            force: ms(t.force_ms),
            multi_step_base: ms(t.multi_step_base_ms),
            multi_step_increment: ms(t.multi_step_increment_ms),
            multi_step_max: ms(t.multi_step_max_ms),
            inter_step_pause: ms(t.inter_step_pause_ms),
            ..ExecutorTimeouts::default()
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            validation_timeout: ms(self.timeouts.validation_ms),
        }
    }

    pub fn context_rules(&self) -> ContextRules {
        let base = match &self.contexts.rules {
            Some(rules) => ContextRules::new(rules.clone(), self.contexts.fallback.clone()),
            None => {
                let defaults = ContextRules::default();
                ContextRules::new(defaults.rules().to_vec(), self.contexts.fallback.clone())
            }
        };
        self.contexts
            .markers
            .iter()
            .fold(base, |rules, (context, markers)| {
                rules.with_markers(context.clone(), markers.clone())
            })
    }

    pub fn cascade_config(&self) -> CascadeConfig {
        let defaults = CascadeConfig::default();
        let guided_tours = match &self.cascade.guided_tours {
            Some(tours) => tours.iter().map(TourSection::to_tour).collect(),
            None => defaults.guided_tours,
        };
        CascadeConfig {
            total_budget: ms(self.cascade.total_budget_ms),
            guided_tours,
            monitor_interval: ms(self.monitor.interval_ms),
        }
    }

    /// Oracle settings when enabled and at least one key is available.
    pub fn oracle_config(&self) -> Option<OracleConfig> {
        if !self.oracle.enabled {
            return None;
        }
        let api_keys = std::env::var(&self.oracle.api_keys_env)
            .map(|raw| parse_key_list(&raw))
            .unwrap_or_default();
        if api_keys.is_empty() {
            return None;
        }
        Some(OracleConfig {
            api_keys,
            model: self.oracle.model.clone(),
            api_base: self.oracle.api_base.clone(),
            temperature: self.oracle.temperature,
            timeout: ms(self.oracle.timeout_ms),
        })
    }
}

impl TourSection {
    fn to_tour(&self) -> GuidedTour {
        GuidedTour::new(
            self.context.clone(),
            self.steps
                .iter()
                .map(|step| {
                    TourStep::new(step.label.clone(), step.candidates.iter().cloned())
                        .after(ms(step.pause_before_ms))
                })
                .collect(),
        )
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}
