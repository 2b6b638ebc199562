//! Declarative strategy configuration.
//!
//! A [`StrategyConfig`] describes a strategy (or a pipeline of them) as JSON:
//!
//! ```json
//! {
//!   "strategy": "pipeline",
//!   "token_budget": 100000,
//!   "stages": [
//!     { "strategy": "amortized_forgetting", "max_size": 200, "keep_first": 2 },
//!     { "strategy": "llm_summarizing", "max_size": 60, "keep_first": 2 }
//!   ]
//! }
//! ```
//!
//! Omitted fields take the same defaults as the constructors. Validation
//! happens in [`StrategyConfig::build`], so a bad window is reported with the
//! same [`ConfigError`] as direct construction.

use super::accounting::DEFAULT_TOKEN_BUDGET;
use super::summarizing::{DEFAULT_MAX_EVENT_LENGTH, DEFAULT_MAX_SUMMARY_TOKENS};
use super::window::{DEFAULT_KEEP_FIRST, DEFAULT_MAX_SIZE};
use super::{AmortizedForgetting, ContextManager, LlmSummarizing, Pipeline, RetentionWindow};
use crate::error::ConfigError;
use crate::model::ModelCaller;
use crate::tokens::TokenCounter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyConfig {
    AmortizedForgetting(AmortizedConfig),
    LlmSummarizing(SummarizingConfig),
    Pipeline(PipelineConfig),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AmortizedConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_keep_first")]
    pub keep_first: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SummarizingConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_keep_first")]
    pub keep_first: usize,
    #[serde(default = "default_max_event_length")]
    pub max_event_length: usize,
    #[serde(default = "default_max_summary_tokens")]
    pub max_summary_tokens: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    pub stages: Vec<StrategyConfig>,
}

fn default_token_budget() -> usize {
    DEFAULT_TOKEN_BUDGET
}

fn default_max_size() -> usize {
    DEFAULT_MAX_SIZE
}

fn default_keep_first() -> usize {
    DEFAULT_KEEP_FIRST
}

fn default_max_event_length() -> usize {
    DEFAULT_MAX_EVENT_LENGTH
}

fn default_max_summary_tokens() -> u32 {
    DEFAULT_MAX_SUMMARY_TOKENS
}

impl Default for AmortizedConfig {
    fn default() -> Self {
        Self {
            token_budget: DEFAULT_TOKEN_BUDGET,
            max_size: DEFAULT_MAX_SIZE,
            keep_first: DEFAULT_KEEP_FIRST,
        }
    }
}

impl Default for SummarizingConfig {
    fn default() -> Self {
        Self {
            token_budget: DEFAULT_TOKEN_BUDGET,
            max_size: DEFAULT_MAX_SIZE,
            keep_first: DEFAULT_KEEP_FIRST,
            max_event_length: DEFAULT_MAX_EVENT_LENGTH,
            max_summary_tokens: DEFAULT_MAX_SUMMARY_TOKENS,
        }
    }
}

impl StrategyConfig {
    /// Read a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: StrategyConfig =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded {} strategy config from {}", config.name(), path.display());
        Ok(config)
    }

    /// The `strategy` tag of this config.
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::AmortizedForgetting(_) => "amortized_forgetting",
            StrategyConfig::LlmSummarizing(_) => "llm_summarizing",
            StrategyConfig::Pipeline(_) => "pipeline",
        }
    }

    /// Whether building this config needs a model caller.
    pub fn needs_model(&self) -> bool {
        match self {
            StrategyConfig::AmortizedForgetting(_) => false,
            StrategyConfig::LlmSummarizing(_) => true,
            StrategyConfig::Pipeline(p) => p.stages.iter().any(StrategyConfig::needs_model),
        }
    }

    /// Construct the described strategy. Every stage shares `counter`, and
    /// every summarizing stage shares `model`.
    pub fn build(
        &self,
        counter: Arc<dyn TokenCounter>,
        model: Option<Arc<dyn ModelCaller>>,
    ) -> Result<Arc<dyn ContextManager>, ConfigError> {
        let manager: Arc<dyn ContextManager> = match self {
            StrategyConfig::AmortizedForgetting(c) => Arc::new(
                AmortizedForgetting::new(counter, RetentionWindow::new(c.max_size, c.keep_first)?)
                    .with_token_budget(c.token_budget),
            ),
            StrategyConfig::LlmSummarizing(c) => {
                let model = model.ok_or(ConfigError::MissingModel {
                    strategy: "llm_summarizing",
                })?;
                Arc::new(
                    LlmSummarizing::new(
                        model,
                        counter,
                        RetentionWindow::new(c.max_size, c.keep_first)?,
                    )
                    .with_token_budget(c.token_budget)
                    .with_max_event_length(c.max_event_length)
                    .with_max_summary_tokens(c.max_summary_tokens),
                )
            }
            StrategyConfig::Pipeline(c) => {
                let stages = c
                    .stages
                    .iter()
                    .map(|stage| stage.build(counter.clone(), model.clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Arc::new(Pipeline::new(counter, stages)?.with_token_budget(c.token_budget))
            }
        };
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentBlock;
    use crate::model::{FnModelCaller, GenerateRequest};
    use std::io::Write;

    fn counter() -> Arc<dyn TokenCounter> {
        Arc::new(|text: &str| text.len())
    }

    fn model() -> Arc<dyn ModelCaller> {
        Arc::new(FnModelCaller::new(|_req: &GenerateRequest| {
            Ok(vec![ContentBlock::result("summary")])
        }))
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let config: StrategyConfig =
            serde_json::from_str(r#"{"strategy": "amortized_forgetting"}"#).unwrap();
        assert_eq!(config, StrategyConfig::AmortizedForgetting(AmortizedConfig::default()));

        let config: StrategyConfig =
            serde_json::from_str(r#"{"strategy": "llm_summarizing", "keep_first": 3}"#).unwrap();
        match config {
            StrategyConfig::LlmSummarizing(c) => {
                assert_eq!(c.keep_first, 3);
                assert_eq!(c.max_size, DEFAULT_MAX_SIZE);
                assert_eq!(c.max_summary_tokens, 4000);
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn unknown_strategy_fails_to_parse() {
        assert!(serde_json::from_str::<StrategyConfig>(r#"{"strategy": "lru"}"#).is_err());
    }

    #[test]
    fn build_validates_window() {
        let config = StrategyConfig::AmortizedForgetting(AmortizedConfig {
            max_size: 10,
            keep_first: 5,
            ..Default::default()
        });
        assert!(matches!(
            config.build(counter(), None),
            Err(ConfigError::KeepFirstTooLarge { .. })
        ));
    }

    #[test]
    fn summarizing_needs_a_model() {
        let config = StrategyConfig::LlmSummarizing(SummarizingConfig::default());
        assert!(config.needs_model());
        assert!(matches!(
            config.build(counter(), None),
            Err(ConfigError::MissingModel { .. })
        ));
        let built = config.build(counter(), Some(model())).unwrap();
        assert_eq!(built.name(), "llm_summarizing");
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let config = StrategyConfig::Pipeline(PipelineConfig {
            token_budget: 10,
            stages: vec![],
        });
        assert!(matches!(
            config.build(counter(), None),
            Err(ConfigError::EmptyPipeline)
        ));
    }

    #[test]
    fn load_pipeline_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "strategy": "pipeline",
                "token_budget": 500,
                "stages": [
                    {{"strategy": "amortized_forgetting", "max_size": 40, "keep_first": 2}},
                    {{"strategy": "llm_summarizing", "max_size": 20}}
                ]
            }}"#
        )
        .unwrap();

        let config = StrategyConfig::load(file.path()).unwrap();
        assert_eq!(config.name(), "pipeline");
        assert!(config.needs_model());

        let built = config.build(counter(), Some(model())).unwrap();
        assert_eq!(built.name(), "pipeline");
        assert_eq!(built.token_budget(), 500);
    }

    #[test]
    fn load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = StrategyConfig::load(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("nope.json"));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            StrategyConfig::load(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }
}
