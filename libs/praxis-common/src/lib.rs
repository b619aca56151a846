pub mod config;
pub mod types;

// Re-export commonly used types for convenience
pub use config::GraderConfig;
pub use types::{Difficulty, Exercise, Outcome, Verdict};
