// Exercise registry for the Praxis API
//
// Definitions load from a JSON file at boot and must pass the grading
// self-check before being served: an exercise whose reference solution
// does not grade as passing is rejected with a logged reason, never
// published.

use praxis_common::{Exercise, GraderConfig};
use praxis_engine::self_check;
use std::fs;

#[derive(Debug, serde::Deserialize)]
struct ExercisesFile {
    exercises: Vec<Exercise>,
}

pub struct ExerciseRegistry {
    exercises: Vec<Exercise>,
}

impl ExerciseRegistry {
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let file: ExercisesFile = serde_json::from_str(content)?;

        let mut exercises: Vec<Exercise> = Vec::new();
        for exercise in file.exercises {
            if exercises.iter().any(|e| e.slug == exercise.slug) {
                tracing::warn!(slug = %exercise.slug, "duplicate exercise slug, keeping the first");
                continue;
            }
            exercises.push(exercise);
        }

        Ok(Self { exercises })
    }

    /// Run the publishing gate over every definition, keeping only the
    /// exercises whose reference solution grades as passing.
    pub async fn verify(self, config: &GraderConfig) -> Self {
        let mut published = Vec::new();
        for exercise in self.exercises {
            match self_check(&exercise, config).await {
                Ok(_) => published.push(exercise),
                Err(err) => {
                    tracing::error!(
                        slug = %exercise.slug,
                        reason = %err,
                        "exercise failed its self-check and will not be served"
                    );
                }
            }
        }
        Self {
            exercises: published,
        }
    }

    pub fn get(&self, slug: &str) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.slug == slug)
    }

    pub fn published(&self) -> &[Exercise] {
        &self.exercises
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_common::Difficulty;

    const GOOD: &str = r#"{
        "exercises": [
            {
                "slug": "intro-heading",
                "title": "Your first heading",
                "starter_code": "export default fn App() { }",
                "solution_code": "export default fn App() { <div><h1>\"Hello, Praxis!\"</h1><p>\"Welcome to the course.\"</p></div> }",
                "test_script": "expect(text(\"h1\")).toBe(\"Hello, Praxis!\")\nexpect(count(\"p\")).toBe(1)",
                "difficulty": "easy",
                "point_value": 10
            }
        ]
    }"#;

    fn test_config() -> GraderConfig {
        GraderConfig {
            budget_ms: 500,
            fuel_limit: 1_000_000,
            exercises_path: String::new(),
        }
    }

    #[test]
    fn test_registry_parses_definitions() {
        let registry = ExerciseRegistry::from_json(GOOD).unwrap();
        assert_eq!(registry.len(), 1);
        let exercise = registry.get("intro-heading").unwrap();
        assert_eq!(exercise.difficulty, Difficulty::Easy);
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_registry_rejects_malformed_json() {
        assert!(ExerciseRegistry::from_json("{ not json").is_err());
    }

    #[tokio::test]
    async fn test_verify_drops_exercises_that_fail_self_check() {
        let mut registry = ExerciseRegistry::from_json(GOOD).unwrap();

        let mut broken = registry.exercises[0].clone();
        broken.slug = "broken".to_string();
        // Reference solution that cannot satisfy its own script.
        broken.solution_code = "export default fn App() { }".to_string();
        registry.exercises.push(broken);

        let verified = registry.verify(&test_config()).await;
        assert_eq!(verified.len(), 1);
        assert!(verified.get("intro-heading").is_some());
        assert!(verified.get("broken").is_none());
    }
}
