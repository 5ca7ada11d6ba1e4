//! Project phase context consumed by arbitration.

use serde::{Deserialize, Serialize};

/// Stage the project is in.
///
/// Early phases discount complexity so that faster, simpler proposals win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    /// Minimum viable product
    Mvp,
    /// Feature iteration on a working product
    #[default]
    Iteration,
    /// Hardening for production
    Production,
}

impl ProjectPhase {
    /// Default weight applied to proposal complexity in this phase.
    pub fn default_complexity_weight(&self) -> f64 {
        match self {
            Self::Mvp => 0.5,
            Self::Iteration => 0.8,
            Self::Production => 1.0,
        }
    }
}

impl std::fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Mvp => "mvp",
            Self::Iteration => "iteration",
            Self::Production => "production",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ProjectPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mvp" => Ok(Self::Mvp),
            "iteration" => Ok(Self::Iteration),
            "production" => Ok(Self::Production),
            other => Err(format!("unknown project phase: {other}")),
        }
    }
}

/// Externally supplied phase information for one arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PhaseContext {
    /// Current phase
    pub phase: ProjectPhase,

    /// Override for the phase's complexity weight
    #[serde(default)]
    pub complexity_weight: Option<f64>,
}

impl PhaseContext {
    /// Context for a phase with its default weight.
    pub fn new(phase: ProjectPhase) -> Self {
        Self { phase, complexity_weight: None }
    }

    /// Override the complexity weight.
    pub fn with_complexity_weight(mut self, weight: f64) -> Self {
        self.complexity_weight = Some(weight);
        self
    }

    /// Effective complexity weight.
    pub fn phase_weight(&self) -> f64 {
        self.complexity_weight
            .unwrap_or_else(|| self.phase.default_complexity_weight())
    }
}
