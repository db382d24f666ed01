use itertools::Itertools;

/// Returned instead of an answer when retrieval found nothing to ground it on
pub const NO_INFORMATION_ANSWER: &str = "I did not find any relevant information on this subject.";

const INSTRUCTIONS: &[&str] = &[
    "You are a technical assistant answering questions about the documentation below.",
    "Answer using only this documentation and never invent facts it does not contain.",
    "Organize the answer with Markdown headings for each important part.",
    "Use lists for steps or key points, blockquotes for notes or warnings and fenced code blocks for code.",
    "Be complete and precise, and prefer concrete implementation details over generic advice.",
    "Do not mention or cite the sources in the answer.",
];

/// A retrieved passage and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub text: String,
    pub source: String,
    pub section: Option<String>,
}

/// Assemble the grounded generation prompt. Without contexts this is the
/// fixed no-information answer rather than a prompt.
#[inline]
pub fn build_prompt(question: &str, contexts: &[PromptContext]) -> String {
    if contexts.is_empty() {
        return NO_INFORMATION_ANSWER.to_string();
    }

    let documentation = contexts.iter().map(render_context).join("\n\n");

    format!(
        "{}\n\nDocumentation:\n{}\n\nQuestion: {}\nAnswer:",
        INSTRUCTIONS.join("\n"),
        documentation,
        question
    )
}

fn render_context(context: &PromptContext) -> String {
    match &context.section {
        Some(section) if !section.is_empty() => format!(
            "Source: {}, section: {}\n{}",
            context.source, section, context.text
        ),
        _ => format!("Source: {}\n{}", context.source, context.text),
    }
}
