//! Development plans and their JSON parser.

use serde::Deserialize;
use thiserror::Error;

use crate::llm::ProviderError;

const DEFAULT_PROJECT_NAME: &str = "project";

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan is not valid JSON: {0}")]
    Malformed(String),

    #[error("plan has no steps")]
    NoSteps,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Ordered development steps derived from one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub project_name: String,
    pub steps: Vec<String>,
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    project_name: Option<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStep {
    Text(String),
    Object {
        #[serde(alias = "step", alias = "title")]
        description: String,
    },
}

impl RawStep {
    fn into_text(self) -> String {
        match self {
            RawStep::Text(s) => s,
            RawStep::Object { description } => description,
        }
    }
}

impl Plan {
    /// Parse a generator reply of the form
    /// `{"project_name": "...", "steps": ["...", ...]}`.
    ///
    /// Tolerates a surrounding code fence or prose: the first object that
    /// parses is used and anything after it is ignored. Blank steps are
    /// dropped; a plan left with no steps is [`PlanError::NoSteps`].
    pub fn parse(raw: &str) -> Result<Self, PlanError> {
        let parsed = first_object(raw)?;

        let steps: Vec<String> = parsed
            .steps
            .into_iter()
            .map(|s| s.into_text().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if steps.is_empty() {
            return Err(PlanError::NoSteps);
        }

        let project_name = parsed
            .project_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());

        Ok(Self {
            project_name,
            steps,
        })
    }

    /// A plan whose only step is the request itself.
    pub fn single_step(request: &str) -> Self {
        Self {
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            steps: vec![request.trim().to_string()],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Deserialize the first JSON object in `raw`, trying each `{` in turn.
fn first_object(raw: &str) -> Result<RawPlan, PlanError> {
    let mut first_error = None;

    for (start, _) in raw.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<RawPlan>();
        match stream.next() {
            Some(Ok(plan)) => return Ok(plan),
            Some(Err(e)) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
            None => {}
        }
    }

    Err(PlanError::Malformed(
        first_error.unwrap_or_else(|| "no JSON object found".to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let plan = Plan::parse(r#"{"project_name":"todo","steps":["models","api","tests"]}"#)
            .unwrap();
        assert_eq!(plan.project_name, "todo");
        assert_eq!(plan.steps, vec!["models", "api", "tests"]);
    }

    #[test]
    fn test_parse_fenced_reply_with_prose() {
        let raw = "Here is the plan:\n```json\n{\n  \"steps\": [\"a\", \"b\"]\n}\n```\nGood luck!";
        let plan = Plan::parse(raw).unwrap();
        assert_eq!(plan.project_name, "project");
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_trailing_prose_with_braces_is_ignored() {
        let raw = "```json\n{\"project_name\":\"x\",\"steps\":[\"a\",\"b\"]}\n```\nEach step fills in `{name}` later.";
        let plan = Plan::parse(raw).unwrap();
        assert_eq!(plan.project_name, "x");
        assert_eq!(plan.steps, vec!["a", "b"]);
    }

    #[test]
    fn test_leading_prose_with_braces_is_skipped() {
        let raw = r#"Use {placeholders} freely. {"steps":["only"]}"#;
        assert_eq!(Plan::parse(raw).unwrap().steps, vec!["only"]);
    }

    #[test]
    fn test_parse_object_steps() {
        let raw = r#"{"steps":[{"description":"one"},{"step":"two"},{"title":"three"},"four"]}"#;
        let plan = Plan::parse(raw).unwrap();
        assert_eq!(plan.steps, vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn test_empty_steps_is_no_steps() {
        assert!(matches!(
            Plan::parse(r#"{"project_name":"x","steps":[]}"#),
            Err(PlanError::NoSteps)
        ));
        assert!(matches!(
            Plan::parse(r#"{"steps":["  ", ""]}"#),
            Err(PlanError::NoSteps)
        ));
        assert!(matches!(Plan::parse("{}"), Err(PlanError::NoSteps)));
    }

    #[test]
    fn test_non_json_is_malformed() {
        assert!(matches!(
            Plan::parse("I will build it step by step."),
            Err(PlanError::Malformed(_))
        ));
        assert!(matches!(
            Plan::parse("{ not json }"),
            Err(PlanError::Malformed(_))
        ));
        assert!(matches!(Plan::parse("} backwards {"), Err(PlanError::Malformed(_))));
    }

    #[test]
    fn test_single_step() {
        let plan = Plan::single_step("  add a CLI  ");
        assert_eq!(plan.steps, vec!["add a CLI"]);
    }
}
