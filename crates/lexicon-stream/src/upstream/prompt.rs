use lexicon_core::LearnerContext;

use crate::request::LookupRequest;
use crate::sentinel::COMPLETION_MARKER;

/// Instructions that pin the model to the markdown entry layout.
pub fn system_prompt(language: &str, flavor: &str) -> String {
    format!(
        "You are a dictionary editor writing a {flavor} entry in language `{language}`.\n\
         Answer in markdown only, using this layout:\n\
         # <headword>\n\
         /<pronunciation>/\n\n\
         ## Part of speech\n\
         <comma-separated list>\n\n\
         ## Definitions\n\
         1. <definition>\n\n\
         ## Examples\n\
         - <example sentence>\n\n\
         ## Synonyms\n\
         <comma-separated list>\n\n\
         ## Antonyms\n\
         <comma-separated list>\n\n\
         ## Etymology\n\
         <one paragraph>\n\n\
         Omit sections that do not apply. When the entry is complete, write \
         {COMPLETION_MARKER} on its own line and nothing after it."
    )
}

pub fn user_prompt(request: &LookupRequest) -> String {
    let mut prompt = format!("Look up: {}", request.term.trim());
    if let Some(learner) = request.learner.as_ref().filter(|l| !l.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(&learner_hint(learner));
    }
    prompt
}

fn learner_hint(learner: &LearnerContext) -> String {
    let mut parts = Vec::new();
    if let Some(level) = &learner.level {
        parts.push(format!("proficiency level {level}"));
    }
    if let Some(native) = &learner.native_language {
        parts.push(format!("native language {native}"));
    }
    if !learner.interests.is_empty() {
        parts.push(format!("interested in {}", learner.interests.join(", ")));
    }
    format!("The reader has {}.", parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_marker_and_flavor() {
        let prompt = system_prompt("fr", "simple");
        assert!(prompt.contains("<END>"));
        assert!(prompt.contains("simple entry"));
        assert!(prompt.contains("`fr`"));
        assert!(prompt.contains("## Definitions"));
    }

    #[test]
    fn user_prompt_mentions_learner_only_when_present() {
        let bare = user_prompt(&LookupRequest::new("  tree "));
        assert_eq!(bare, "Look up: tree");

        let with_learner = user_prompt(&LookupRequest::new("tree").learner(LearnerContext {
            native_language: Some("de".into()),
            level: Some("B1".into()),
            interests: vec!["forestry".into()],
        }));
        assert!(with_learner.contains("proficiency level B1"));
        assert!(with_learner.contains("native language de"));
        assert!(with_learner.contains("forestry"));
    }
}
