//! Built-in personalizers.

use async_trait::async_trait;

use crate::errors::PersonalizeError;
use crate::model::{LearnerContext, LookupResponse};
use crate::store::Personalizer;

/// Leaves the response untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPersonalizer;

#[async_trait]
impl Personalizer for NoopPersonalizer {
    async fn personalize(
        &self,
        _context: &LearnerContext,
        response: LookupResponse,
    ) -> Result<LookupResponse, PersonalizeError> {
        Ok(response)
    }
}

/// Adds a short learner-facing note built from the learner's level, native
/// language, and interests.
#[derive(Clone, Copy, Debug, Default)]
pub struct LearnerNotePersonalizer;

impl LearnerNotePersonalizer {
    fn compose(context: &LearnerContext, response: &LookupResponse) -> Option<String> {
        let headword = response.entry.headword.as_str();
        let mut lines = Vec::new();
        if let Some(level) = context.level.as_deref().filter(|l| !l.trim().is_empty()) {
            lines.push(format!(
                "Pitched for a {} learner: start with definition 1 of \"{headword}\".",
                level.trim()
            ));
        }
        if let Some(native) = context
            .native_language
            .as_deref()
            .filter(|l| !l.trim().is_empty())
        {
            lines.push(format!(
                "Think of how you would say \"{headword}\" in {}; note where the meanings differ.",
                native.trim()
            ));
        }
        for interest in &context.interests {
            let needle = interest.to_lowercase();
            if needle.trim().is_empty() {
                continue;
            }
            if let Some(example) = response
                .entry
                .examples
                .iter()
                .find(|e| e.to_lowercase().contains(&needle))
            {
                lines.push(format!("Connected to your interest in {interest}: {example}"));
            }
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

#[async_trait]
impl Personalizer for LearnerNotePersonalizer {
    async fn personalize(
        &self,
        context: &LearnerContext,
        mut response: LookupResponse,
    ) -> Result<LookupResponse, PersonalizeError> {
        if response.entry.headword.trim().is_empty() {
            return Err(PersonalizeError("response has no headword".into()));
        }
        if let Some(note) = Self::compose(context, &response) {
            response.personal_note = Some(note);
        }
        Ok(response)
    }
}
