//! Routing configuration stored in `archon.toml`.
//!
//! Every constant the scorer, tool router and arbitrator use is a default
//! here, not a fixed requirement. Missing fields fall back to the defaults.

use std::collections::BTreeMap;
use std::path::Path;

use archon_core::ExternalTool;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, RoutingError};

const WEIGHT_EPSILON: f64 = 1e-6;

/// Top-level routing configuration (TOML).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RoutingConfig {
    /// Model scorer weights
    pub scoring: ScoringWeights,
    /// Model scorer penalties
    pub penalties: ScoringPenalties,
    /// Tool-vs-model routing
    pub tools: ToolRoutingConfig,
    /// Proposal arbitration
    pub arbitration: ArbitrationConfig,
}

impl RoutingConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        self.penalties.validate()?;
        self.tools.validate()?;
        self.arbitration.validate()?;
        Ok(())
    }
}

/// Weights of the model scoring dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Reasoning match
    pub reasoning: f64,
    /// Context adequacy
    pub context: f64,
    /// Speed match
    pub speed: f64,
    /// Cost efficiency
    pub cost: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            reasoning: 0.4,
            context: 0.2,
            speed: 0.2,
            cost: 0.2,
        }
    }
}

impl ScoringWeights {
    /// Weights must sum to 1.0.
    pub fn validate(&self) -> Result<()> {
        check_weights("scoring", &[self.reasoning, self.context, self.speed, self.cost])
    }
}

/// Scores used when an executor misses a hard requirement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPenalties {
    /// Context score when the window is too small
    pub context: f64,
    /// Cost score when over the ceiling
    pub cost: f64,
}

impl Default for ScoringPenalties {
    fn default() -> Self {
        Self { context: 0.5, cost: 0.3 }
    }
}

impl ScoringPenalties {
    /// Penalties must lie in [0, 1].
    pub fn validate(&self) -> Result<()> {
        check_unit("penalties.context", self.context)?;
        check_unit("penalties.cost", self.cost)
    }
}

/// Weights of the tool score components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolWeights {
    /// Trust in the tool's source
    pub trust: f64,
    /// Historical success rate
    pub success_rate: f64,
    /// Output quality
    pub performance: f64,
}

impl Default for ToolWeights {
    fn default() -> Self {
        Self {
            trust: 0.4,
            success_rate: 0.3,
            performance: 0.3,
        }
    }
}

/// Tool-vs-model routing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolRoutingConfig {
    /// How much better than the AI baseline a tool must be (0.2 = 20%)
    pub margin: f64,
    /// Baseline for task types without an entry in `baselines`
    pub default_baseline: f64,
    /// AI baseline score per task type
    pub baselines: BTreeMap<String, f64>,
    /// Tool score weights
    pub weights: ToolWeights,
    /// Known tools
    pub registry: Vec<ExternalTool>,
}

impl Default for ToolRoutingConfig {
    fn default() -> Self {
        let baselines = [
            ("system_design_diagram", 0.70),
            ("architecture_diagram", 0.68),
            ("infrastructure_provisioning", 0.60),
            ("e2e_testing", 0.75),
            ("static_analysis", 0.80),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            margin: 0.2,
            default_baseline: 0.70,
            baselines,
            weights: ToolWeights::default(),
            registry: default_tool_registry(),
        }
    }
}

impl ToolRoutingConfig {
    /// Check weights, baselines and the margin.
    pub fn validate(&self) -> Result<()> {
        check_weights(
            "tools.weights",
            &[self.weights.trust, self.weights.success_rate, self.weights.performance],
        )?;
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(RoutingError::InvalidValue {
                name: "tools.margin".to_string(),
                value: self.margin,
            });
        }
        check_unit("tools.default_baseline", self.default_baseline)?;
        for (task_type, baseline) in &self.baselines {
            check_unit(&format!("tools.baselines.{task_type}"), *baseline)?;
        }
        for tool in &self.registry {
            check_unit(&format!("{}.trust_score", tool.name), tool.trust_score)?;
            check_unit(&format!("{}.success_rate", tool.name), tool.success_rate)?;
            check_unit(&format!("{}.performance_score", tool.name), tool.performance_score)?;
        }
        Ok(())
    }
}

/// Weights of the arbitration criteria.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationWeights {
    /// Low risk
    pub risk: f64,
    /// Low (phase-weighted) complexity
    pub complexity: f64,
    /// Short duration
    pub duration: f64,
    /// Goal alignment placeholder
    pub alignment: f64,
}

impl Default for ArbitrationWeights {
    fn default() -> Self {
        Self {
            risk: 0.4,
            complexity: 0.3,
            duration: 0.2,
            alignment: 0.1,
        }
    }
}

/// Proposal arbitration settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Criterion weights
    pub weights: ArbitrationWeights,
    /// Duration (hours) at which the duration term halves
    pub duration_normalization_hours: f64,
    /// Fixed goal-alignment score applied to every proposal
    pub goal_alignment: f64,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            weights: ArbitrationWeights::default(),
            duration_normalization_hours: 10.0,
            goal_alignment: 1.0,
        }
    }
}

impl ArbitrationConfig {
    /// Check weights and constants.
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        check_weights("arbitration", &[w.risk, w.complexity, w.duration, w.alignment])?;
        if !self.duration_normalization_hours.is_finite() || self.duration_normalization_hours <= 0.0 {
            return Err(RoutingError::InvalidValue {
                name: "arbitration.duration_normalization_hours".to_string(),
                value: self.duration_normalization_hours,
            });
        }
        check_unit("arbitration.goal_alignment", self.goal_alignment)
    }
}

/// The tools known out of the box.
pub fn default_tool_registry() -> Vec<ExternalTool> {
    vec![
        ExternalTool {
            name: "eraser-cli".to_string(),
            description: "Generate system design diagrams".to_string(),
            task_types: vec![
                "system_design_diagram".to_string(),
                "architecture_diagram".to_string(),
                "sequence_diagram".to_string(),
            ],
            trust_score: 0.95,
            success_rate: 0.98,
            performance_score: 0.92,
            avg_execution_time_ms: 1500,
            sandbox_required: true,
            requires_credentials: false,
        },
        ExternalTool {
            name: "terraform".to_string(),
            description: "Infrastructure as code".to_string(),
            task_types: vec![
                "infrastructure_provisioning".to_string(),
                "cloud_deployment".to_string(),
            ],
            trust_score: 0.98,
            success_rate: 0.96,
            performance_score: 0.95,
            avg_execution_time_ms: 5000,
            sandbox_required: true,
            requires_credentials: true,
        },
        ExternalTool {
            name: "playwright".to_string(),
            description: "E2E testing framework".to_string(),
            task_types: vec!["e2e_testing".to_string(), "browser_automation".to_string()],
            trust_score: 0.97,
            success_rate: 0.93,
            performance_score: 0.94,
            avg_execution_time_ms: 10000,
            sandbox_required: true,
            requires_credentials: false,
        },
    ]
}

/// Load and validate config from a TOML file.
///
/// If the file is missing, returns `RoutingConfig::default()`.
pub fn load_config(path: &Path) -> Result<RoutingConfig> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(RoutingConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let config = parse_config(&raw)?;
    info!("Loaded routing config from {}", path.display());
    Ok(config)
}

/// Parse and validate config from TOML text.
pub fn parse_config(raw: &str) -> Result<RoutingConfig> {
    let config: RoutingConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

fn check_weights(name: &'static str, weights: &[f64]) -> Result<()> {
    let sum: f64 = weights.iter().sum();
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || (sum - 1.0).abs() > WEIGHT_EPSILON {
        return Err(RoutingError::InvalidWeights { name, sum });
    }
    Ok(())
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(RoutingError::InvalidValue {
            name: name.to_string(),
            value,
        });
    }
    Ok(())
}
