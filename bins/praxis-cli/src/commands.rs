// CLI commands for authoring and grading Praxis exercises
use anyhow::{bail, Context, Result};
use handlebars::Handlebars;
use praxis_common::{Exercise, GraderConfig};
use praxis_engine::{self_check, Grader, SelfCheckError};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const EXERCISE_TEMPLATE: &str = r#"{
  "slug": "{{slug}}",
  "title": "{{title}}",
  "starter_code": "export default fn App() { }",
  "solution_code": "export default fn App() { <h1>\"{{title}}\"</h1> }",
  "test_script": "expect(exists(\"h1\")).toBeTruthy()\nexpect(text(\"h1\")).toBe(\"{{title}}\")",
  "difficulty": "easy",
  "point_value": 10
}
"#;

/// Load a single exercise definition from a JSON file
fn load_exercise(path: &str) -> Result<Exercise> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read exercise file {}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse exercise file {}", path))
}

/// Check an exercise definition against the publishing gate
pub async fn check_exercise(exercise_path: &str) -> Result<()> {
    let exercise = load_exercise(exercise_path)?;
    let config = GraderConfig::from_env();

    println!("🔍 Checking exercise: {} ({})", exercise.title, exercise.slug);

    match self_check(&exercise, &config).await {
        Ok(verdict) => {
            println!(
                "✓ Reference solution passes ({} ms)",
                verdict.elapsed_ms
            );
        }
        Err(SelfCheckError::NotPassing { outcome }) => {
            println!("✗ Reference solution graded as `{}`", outcome.kind());
            bail!("exercise '{}' failed its self-check", exercise.slug);
        }
        Err(SelfCheckError::Grader(err)) => {
            bail!("grader error while checking '{}': {}", exercise.slug, err);
        }
    }

    // A starter that already satisfies the script means the exercise
    // asks nothing of the learner. Authors get a warning, not a failure.
    let grader = Grader::new(exercise.clone(), config);
    match grader.submit(exercise.starter_code.clone()).await {
        Ok(Some(verdict)) if verdict.passed() => {
            println!("⚠️  Starter code already passes the assertion script");
        }
        Ok(_) => {
            println!("✓ Starter code does not pass on its own");
        }
        Err(err) => {
            bail!("grader error while grading the starter: {}", err);
        }
    }

    println!("✅ Exercise '{}' is publishable", exercise.slug);
    Ok(())
}

/// Grade a submission file against an exercise
pub async fn grade_submission(exercise_path: &str, submission_path: &str) -> Result<()> {
    let exercise = load_exercise(exercise_path)?;
    let source = fs::read_to_string(submission_path)
        .with_context(|| format!("Failed to read submission file {}", submission_path))?;
    let config = GraderConfig::from_env();

    println!("📝 Grading submission against: {}", exercise.slug);

    let grader = Grader::new(exercise, config);
    let verdict = match grader.submit(source).await {
        Ok(Some(verdict)) => verdict,
        Ok(None) => bail!("the grader dropped the verdict"),
        Err(err) => bail!("grader error: {}", err),
    };

    if verdict.passed() {
        println!("✅ Passed ({} ms)", verdict.elapsed_ms);
    } else {
        println!(
            "❌ {} ({} ms)",
            verdict.outcome.kind(),
            verdict.elapsed_ms
        );
        for diagnostic in verdict.diagnostics() {
            println!("  → {}", diagnostic.message);
        }
    }

    Ok(())
}

/// Scaffold a new exercise definition
pub async fn init_exercise(path: &str, slug: &str, title: &str) -> Result<()> {
    if slug.is_empty() || title.is_empty() {
        bail!("Exercise slug and title cannot be empty");
    }

    let rendered = render_scaffold(slug, title)?;

    let out_dir = Path::new(path);
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create directory {}", path))?;
    let out_path = out_dir.join(format!("{}.json", slug));
    if out_path.exists() {
        bail!("{} already exists", out_path.display());
    }
    fs::write(&out_path, rendered)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;

    println!("✅ Scaffolded exercise at {}", out_path.display());
    println!("\n📋 Next steps:");
    println!("  1. Edit the starter code and assertion script");
    println!("  2. Verify it: praxis-cli check --exercise {}", out_path.display());

    Ok(())
}

fn render_scaffold(slug: &str, title: &str) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    // The output is JSON, not HTML.
    handlebars.register_escape_fn(handlebars::no_escape);

    let mut data = HashMap::new();
    data.insert("slug", slug);
    data.insert("title", title);

    handlebars
        .render_template(EXERCISE_TEMPLATE, &data)
        .context("Failed to render exercise template")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold_renders_valid_exercise_json() {
        let rendered = render_scaffold("my-first", "My First Exercise").unwrap();
        let exercise: Exercise = serde_json::from_str(&rendered).unwrap();
        assert_eq!(exercise.slug, "my-first");
        assert_eq!(exercise.title, "My First Exercise");
    }

    #[tokio::test]
    async fn test_scaffold_passes_its_own_check() {
        let rendered = render_scaffold("scaffold-check", "Scaffold Check").unwrap();
        let exercise: Exercise = serde_json::from_str(&rendered).unwrap();

        let config = GraderConfig {
            budget_ms: 500,
            fuel_limit: 1_000_000,
            exercises_path: String::new(),
        };
        let verdict = self_check(&exercise, &config).await.unwrap();
        assert!(verdict.passed());
    }

    #[tokio::test]
    async fn test_scaffold_starter_does_not_pass() {
        let rendered = render_scaffold("scaffold-starter", "Scaffold Starter").unwrap();
        let exercise: Exercise = serde_json::from_str(&rendered).unwrap();

        let config = GraderConfig {
            budget_ms: 500,
            fuel_limit: 1_000_000,
            exercises_path: String::new(),
        };
        let grader = Grader::new(exercise.clone(), config);
        let verdict = grader
            .submit(exercise.starter_code.clone())
            .await
            .unwrap()
            .unwrap();
        assert!(!verdict.passed());
    }
}
