//! Query enhancement for résumé search: role titles are pulled out of the résumé and
//! repeated ahead of it, so the pooled query vector leans toward what the candidate
//! does rather than everything else a résumé mentions.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm_client::LlmClient;
use crate::matching::prompts::{build_role_extraction_prompt, role_extraction_system};

/// Distinct roles prepended to the query.
pub const MAX_ROLES: usize = 3;
/// Times each role is repeated.
pub const ROLE_REPEAT: usize = 3;

const ROLE_PATTERN: &str = concat!(
    r"(?i)\b",
    // seniority
    r"(?:(?:senior|sr\.?|junior|jr\.?|lead|principal|staff|head|chief|mid-level|entry-level)\s+)?",
    // up to two domain words
    r"(?:[a-z0-9][a-z0-9.+#/-]*\s+){0,2}",
    r"(?:developer|engineer|architect|designer|analyst|scientist|manager|administrator|consultant)s?\b",
);

/// Leading words a match can pick up from the surrounding sentence.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "as", "and", "or", "with", "for", "of", "to", "in", "at", "on", "i",
    "am", "was", "is", "my", "our", "worked", "working",
];

#[async_trait]
pub trait QueryEnhancer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the text to embed for `resume_text`. Never fails; an enhancer with
    /// nothing to add returns the input unchanged.
    async fn enhance(&self, resume_text: &str) -> String;
}

/// Prepends each role `ROLE_REPEAT` times ahead of `text`.
pub fn prepend_roles(roles: &[String], text: &str) -> String {
    if roles.is_empty() {
        return text.to_string();
    }
    let mut parts: Vec<&str> = Vec::with_capacity(roles.len() * ROLE_REPEAT + 1);
    for role in roles {
        parts.extend(std::iter::repeat(role.as_str()).take(ROLE_REPEAT));
    }
    parts.push(text);
    parts.join("\n")
}

/// Up to `MAX_ROLES` entries, distinct ignoring case, first occurrence wins.
fn distinct_roles<I>(candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: Vec<String> = Vec::new();
    let mut roles = Vec::new();
    for role in candidates {
        let key = role.to_lowercase();
        if role.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        roles.push(role);
        if roles.len() == MAX_ROLES {
            break;
        }
    }
    roles
}

// ────────────────────────────────────────────────────────────────────────────
// Regex
// ────────────────────────────────────────────────────────────────────────────

/// Matches `<seniority>? <domain words> <role noun>` phrases.
pub struct RoleKeywordEnhancer {
    pattern: Regex,
}

impl RoleKeywordEnhancer {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(ROLE_PATTERN).expect("role pattern is a valid regex"),
        }
    }

    pub fn extract_roles(&self, text: &str) -> Vec<String> {
        distinct_roles(
            self.pattern
                .find_iter(text)
                .map(|m| normalize_role(m.as_str())),
        )
    }
}

impl Default for RoleKeywordEnhancer {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_role(raw: &str) -> String {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    while words.len() > 1 && STOP_WORDS.contains(&words[0].to_lowercase().as_str()) {
        words.remove(0);
    }
    words.join(" ")
}

#[async_trait]
impl QueryEnhancer for RoleKeywordEnhancer {
    fn name(&self) -> &'static str {
        "regex"
    }

    async fn enhance(&self, resume_text: &str) -> String {
        let roles = self.extract_roles(resume_text);
        debug!("Extracted roles from résumé: {roles:?}");
        prepend_roles(&roles, resume_text)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LLM
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RoleTitles {
    roles: Vec<String>,
}

/// Asks the LLM for role titles. Any LLM failure falls back to the regex enhancer.
pub struct LlmQueryEnhancer {
    llm: LlmClient,
    fallback: RoleKeywordEnhancer,
}

impl LlmQueryEnhancer {
    pub fn new(llm: LlmClient) -> Self {
        Self {
            llm,
            fallback: RoleKeywordEnhancer::new(),
        }
    }
}

#[async_trait]
impl QueryEnhancer for LlmQueryEnhancer {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn enhance(&self, resume_text: &str) -> String {
        let prompt = build_role_extraction_prompt(resume_text);
        let system = role_extraction_system();

        match self.llm.call_json::<RoleTitles>(&prompt, &system).await {
            Ok(titles) => {
                let roles = distinct_roles(titles.roles.into_iter().map(|r| r.trim().to_string()));
                debug!("LLM extracted roles: {roles:?}");
                prepend_roles(&roles, resume_text)
            }
            Err(e) => {
                warn!("LLM role extraction failed, using keyword extraction: {e}");
                self.fallback.enhance(resume_text).await
            }
        }
    }
}
