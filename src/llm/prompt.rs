//! Prompt assembly.

const FILE_FORMAT_RULES: &str = "\
To create or edit a file, answer with one block per file:
### FILE: relative/path.ext
<full file content>
### END_FILE

Rules:
- Do not put ``` fences or markdown commentary inside a file block.
- Always return the whole file, never a diff or a fragment.
- Paths are relative to the project root.
- Keep explanations short.";

/// Chat prompt: file-block instructions, retrieved chunks, explicitly
/// attached files, the file the user is looking at, then the question.
pub fn build_context_prompt(
    question: &str,
    attached: &[(String, String)],
    active_file: Option<(&str, &str)>,
    rag_context: &[String],
) -> String {
    let mut parts = vec![
        "You are an AI coding agent working inside the user's project.".to_string(),
        "You can create and edit files.".to_string(),
        String::new(),
        FILE_FORMAT_RULES.to_string(),
    ];

    if let Some((name, _)) = active_file {
        parts.push(format!(
            "- When editing the active file, use its exact name: {}. Do not invent new file names for it.",
            name
        ));
    }

    if !rag_context.is_empty() {
        parts.push("\n=== RELEVANT PROJECT CODE ===".to_string());
        for chunk in rag_context {
            parts.push(format!("{}\n---", chunk));
        }
    }

    if !attached.is_empty() {
        parts.push("\n=== ATTACHED FILES ===".to_string());
        for (name, content) in attached {
            parts.push(format!("File: {}\n\n{}\n", name, content));
        }
    }

    if let Some((name, code)) = active_file.filter(|(_, code)| !code.is_empty()) {
        parts.push("\n=== ACTIVE FILE ===".to_string());
        parts.push(format!("Name: {}", name));
        parts.push("Content:".to_string());
        parts.push(format!("{}\n", code));
        parts.push(format!(
            "(If you change this code, return a ### FILE: {} block.)",
            name
        ));
    }

    parts.push(format!("\n=== QUESTION ===\n{}", question));
    parts.join("\n")
}

pub fn review_prompt(file_name: &str, code: &str) -> String {
    format!(
        "Review the following code from {}. Find bugs, security issues, performance \
         problems and style problems. Then propose a corrected version of the code.\n\n{}",
        file_name, code
    )
}

pub fn plan_prompt(request: &str) -> String {
    format!(
        "You are a senior developer planning work in an existing project.\n\
         Break the request below into a short ordered list of concrete development steps. \
         Each step must be implementable on its own by writing whole files.\n\n\
         Reply with JSON only, no prose:\n\
         {{\"project_name\": \"<short-name>\", \"steps\": [\"<step 1>\", \"<step 2>\"]}}\n\n\
         Request:\n{}",
        request
    )
}

pub fn step_prompt(step: &str, request: &str, context: &[String]) -> String {
    let mut prompt = format!(
        "You are implementing one step of a larger task.\n\n\
         Overall request:\n{}\n\n\
         Current step:\n{}\n\n{}",
        request, step, FILE_FORMAT_RULES
    );

    if !context.is_empty() {
        prompt.push_str("\n\n=== RELEVANT PROJECT CODE ===\n");
        prompt.push_str(&context.join("\n---\n"));
    }

    prompt
}

pub fn report_prompt(request: &str, steps: &[String], modified_files: &[String]) -> String {
    let steps = steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n");
    let files = if modified_files.is_empty() {
        "(none)".to_string()
    } else {
        modified_files
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Write a short markdown report for the user about the work just completed.\n\
         Summarize what was built, list the modified files and suggest next steps.\n\n\
         Request:\n{}\n\nSteps:\n{}\n\nModified files:\n{}",
        request, steps, files
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_prompt_sections_in_order() {
        let rag = vec!["File: a.py\nCode:\nx = 1".to_string()];
        let attached = vec![("notes.md".to_string(), "todo".to_string())];
        let prompt = build_context_prompt(
            "fix it",
            &attached,
            Some(("main.py", "print(1)")),
            &rag,
        );

        let rag_at = prompt.find("RELEVANT PROJECT CODE").unwrap();
        let attached_at = prompt.find("ATTACHED FILES").unwrap();
        let active_at = prompt.find("ACTIVE FILE ===").unwrap();
        let question_at = prompt.find("QUESTION").unwrap();
        assert!(rag_at < attached_at && attached_at < active_at && active_at < question_at);
        assert!(prompt.contains("### FILE: main.py block"));
        assert!(prompt.ends_with("fix it"));
    }

    #[test]
    fn test_context_prompt_minimal() {
        let prompt = build_context_prompt("hello", &[], None, &[]);
        assert!(prompt.contains("### END_FILE"));
        assert!(!prompt.contains("RELEVANT PROJECT CODE"));
        assert!(!prompt.contains("ACTIVE FILE ==="));
    }

    #[test]
    fn test_plan_prompt_is_valid_format_string() {
        let prompt = plan_prompt("make a todo app");
        assert!(prompt.contains(r#"{"project_name": "<short-name>""#));
        assert!(prompt.ends_with("make a todo app"));
    }

    #[test]
    fn test_report_prompt_lists_files() {
        let prompt = report_prompt(
            "req",
            &["a".to_string(), "b".to_string()],
            &["x.py".to_string()],
        );
        assert!(prompt.contains("1. a\n2. b"));
        assert!(prompt.contains("- x.py"));
        assert!(report_prompt("req", &[], &[]).contains("(none)"));
    }
}
