// LLM prompts for the matching module.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

/// Résumés are cut to this many characters before being sent for role extraction.
const MAX_RESUME_CHARS: usize = 8000;

pub fn role_extraction_system() -> String {
    format!(
        "You are an experienced technical recruiter. \
        You read résumés and name the job titles the candidate is best suited for. {JSON_ONLY_SYSTEM}"
    )
}

/// Role extraction prompt template. Replace `{resume_text}` before sending.
const ROLE_EXTRACTION_PROMPT_TEMPLATE: &str = r#"Read the résumé below and list the job titles this candidate would most plausibly apply for.

Return a JSON object with this EXACT schema (no extra fields):
{
  "roles": ["Senior Backend Engineer", "Platform Engineer"]
}

Rules:
- At most 3 titles, most relevant first.
- Use conventional job-board titles (seniority + domain + role), not sentences.
- Only use titles supported by the résumé's experience.

RÉSUMÉ:
{resume_text}"#;

pub fn build_role_extraction_prompt(resume_text: &str) -> String {
    let truncated: String = resume_text.chars().take(MAX_RESUME_CHARS).collect();
    ROLE_EXTRACTION_PROMPT_TEMPLATE.replace("{resume_text}", &truncated)
}
