use crate::types::Difficulty;
use std::env;

/// Grader configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// Base wall-clock budget for each watchdog-wrapped step, in ms.
    /// Scaled by the exercise's difficulty multiplier.
    pub budget_ms: u64,
    /// Interpreter fuel limit (evaluation steps) per mount
    pub fuel_limit: u64,
    /// Path to the published exercise definitions
    pub exercises_path: String,
}

impl GraderConfig {
    pub fn from_env() -> Self {
        Self {
            budget_ms: env::var("PRAXIS_BUDGET_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2000),
            fuel_limit: env::var("PRAXIS_FUEL_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5_000_000),
            exercises_path: env::var("PRAXIS_EXERCISES_PATH")
                .unwrap_or_else(|_| "config/exercises.json".to_string()),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }

    /// Effective budget for one watchdog-wrapped step of an attempt
    pub fn budget_for(&self, difficulty: Difficulty) -> u64 {
        self.budget_ms * difficulty.budget_multiplier()
    }
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GraderConfig {
            budget_ms: 2000,
            fuel_limit: 5_000_000,
            exercises_path: "config/exercises.json".to_string(),
        };
        assert_eq!(config.budget_for(Difficulty::Easy), 2000);
        assert_eq!(config.budget_for(Difficulty::Medium), 4000);
        assert_eq!(config.budget_for(Difficulty::Hard), 6000);
    }
}
