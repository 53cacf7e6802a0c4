//! Structured dictionary entry and its markdown form.
//!
//! Models answer with a markdown document shaped like:
//!
//! ```text
//! # serendipity
//! /ˌsɛr.ənˈdɪp.ɪ.ti/
//!
//! ## Part of speech
//! noun
//!
//! ## Definitions
//! 1. The occurrence of events by chance in a happy way.
//!
//! ## Examples
//! - Finding that book was pure serendipity.
//!
//! ## Synonyms
//! chance, fluke
//! ```
//!
//! Section headings are matched loosely (case-insensitive keywords); unknown
//! sections are kept verbatim in `extra_sections`.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

use crate::errors::EntryParseError;

/// Section that is not part of the fixed entry shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySection {
    pub title: String,
    pub body: Vec<String>,
}

/// Dictionary entry parsed from a finished transcript.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEntry {
    pub headword: String,
    #[serde(default)]
    pub pronunciation: Option<String>,
    #[serde(default)]
    pub parts_of_speech: Vec<String>,
    #[serde(default)]
    pub definitions: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub antonyms: Vec<String>,
    #[serde(default)]
    pub etymology: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub extra_sections: Vec<EntrySection>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Preamble,
    Pronunciation,
    PartsOfSpeech,
    Definitions,
    Examples,
    Synonyms,
    Antonyms,
    Etymology,
    Notes,
    Extra,
}

fn classify_heading(title: &str) -> Section {
    let lower = title.to_lowercase();
    let has = |needle: &str| lower.contains(needle);
    if has("pronunciation") || has("phonetic") {
        Section::Pronunciation
    } else if has("part of speech") || has("parts of speech") || has("word class") {
        Section::PartsOfSpeech
    } else if has("definition") || has("meaning") || has("sense") {
        Section::Definitions
    } else if has("example") {
        Section::Examples
    } else if has("synonym") {
        Section::Synonyms
    } else if has("antonym") || has("opposite") {
        Section::Antonyms
    } else if has("etymology") || has("origin") {
        Section::Etymology
    } else if has("note") || has("usage") {
        Section::Notes
    } else {
        Section::Extra
    }
}

fn split_terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split([',', ';'])
        .map(|part| part.trim().trim_end_matches('.').trim())
        .filter(|part| !part.is_empty())
        .map(ToOwned::to_owned)
}

fn join_optional(slot: &mut Option<String>, text: String) {
    match slot {
        Some(existing) => {
            existing.push(' ');
            existing.push_str(&text);
        }
        None => *slot = Some(text),
    }
}

struct EntryBuilder {
    entry: ParsedEntry,
    section: Section,
    saw_headword: bool,
}

impl EntryBuilder {
    fn new() -> Self {
        Self {
            entry: ParsedEntry::default(),
            section: Section::Preamble,
            saw_headword: false,
        }
    }

    fn heading(&mut self, level: HeadingLevel, title: String) {
        if level == HeadingLevel::H1 && !self.saw_headword {
            self.entry.headword = title;
            self.saw_headword = true;
            self.section = Section::Preamble;
            return;
        }
        self.section = classify_heading(&title);
        if self.section == Section::Extra {
            self.entry.extra_sections.push(EntrySection {
                title,
                body: Vec::new(),
            });
        }
    }

    fn list_item(&mut self, text: String) {
        let entry = &mut self.entry;
        match self.section {
            Section::Definitions => entry.definitions.push(text),
            Section::Examples => entry.examples.push(text),
            Section::Synonyms => entry.synonyms.extend(split_terms(&text)),
            Section::Antonyms => entry.antonyms.extend(split_terms(&text)),
            Section::PartsOfSpeech => entry.parts_of_speech.extend(split_terms(&text)),
            Section::Pronunciation => join_optional(&mut entry.pronunciation, text),
            Section::Etymology => join_optional(&mut entry.etymology, text),
            Section::Notes | Section::Preamble => entry.notes.push(text),
            Section::Extra => self.push_extra(text),
        }
    }

    fn paragraph(&mut self, text: String) {
        let entry = &mut self.entry;
        match self.section {
            Section::Preamble => {
                let looks_phonetic = (text.starts_with('/') && text.ends_with('/'))
                    || (text.starts_with('[') && text.ends_with(']'));
                if looks_phonetic && entry.pronunciation.is_none() {
                    entry.pronunciation = Some(text);
                } else {
                    entry.notes.push(text);
                }
            }
            Section::Definitions => entry.definitions.push(text),
            Section::Examples => entry.examples.push(text),
            _ => self.list_item(text),
        }
    }

    fn push_extra(&mut self, text: String) {
        if let Some(section) = self.entry.extra_sections.last_mut() {
            section.body.push(text);
        }
    }

    fn finish(self) -> Result<ParsedEntry, EntryParseError> {
        if !self.saw_headword || self.entry.headword.trim().is_empty() {
            return Err(EntryParseError::MissingHeadword);
        }
        if self.entry.definitions.is_empty() {
            return Err(EntryParseError::MissingDefinitions {
                headword: self.entry.headword,
            });
        }
        Ok(self.entry)
    }

    fn finish_lenient(mut self, term: &str) -> Result<ParsedEntry, EntryParseError> {
        if !self.saw_headword || self.entry.headword.trim().is_empty() {
            self.entry.headword = term.trim().to_string();
            self.saw_headword = true;
        }
        if self.entry.definitions.is_empty() {
            self.entry.definitions = std::mem::take(&mut self.entry.notes);
        }
        self.finish()
    }
}

impl ParsedEntry {
    /// Parses a finished markdown transcript into an entry.
    ///
    /// Requires a level-one heading (the headword) and at least one definition.
    pub fn parse_markdown(markdown: &str) -> Result<Self, EntryParseError> {
        collect(markdown)?.finish()
    }

    /// Best-effort parse of a streamed transcript for `term`.
    ///
    /// A missing headword falls back to `term`, and free-standing paragraphs
    /// stand in for a missing definitions section. Only blank input (or a
    /// blank `term` with no heading) is rejected outright.
    pub fn parse_transcript(markdown: &str, term: &str) -> Result<Self, EntryParseError> {
        collect(markdown)?.finish_lenient(term)
    }

    /// Renders the entry back to the canonical markdown layout.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n", self.headword);
        if let Some(pronunciation) = &self.pronunciation {
            out.push_str(&format!("\n## Pronunciation\n{pronunciation}\n"));
        }
        if !self.parts_of_speech.is_empty() {
            out.push_str(&format!(
                "\n## Part of speech\n{}\n",
                self.parts_of_speech.join(", ")
            ));
        }
        push_numbered(&mut out, "Definitions", &self.definitions);
        push_bulleted(&mut out, "Examples", &self.examples);
        if !self.synonyms.is_empty() {
            out.push_str(&format!("\n## Synonyms\n{}\n", self.synonyms.join(", ")));
        }
        if !self.antonyms.is_empty() {
            out.push_str(&format!("\n## Antonyms\n{}\n", self.antonyms.join(", ")));
        }
        if let Some(etymology) = &self.etymology {
            out.push_str(&format!("\n## Etymology\n{etymology}\n"));
        }
        push_bulleted(&mut out, "Notes", &self.notes);
        for section in &self.extra_sections {
            push_bulleted(&mut out, &section.title, &section.body);
        }
        out
    }
}

fn collect(markdown: &str) -> Result<EntryBuilder, EntryParseError> {
    if markdown.trim().is_empty() {
        return Err(EntryParseError::Empty);
    }

    let mut builder = EntryBuilder::new();
    let mut heading: Option<(HeadingLevel, String)> = None;
    let mut items: Vec<String> = Vec::new();
    let mut paragraph = String::new();

    for event in Parser::new_ext(markdown, Options::empty()) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => heading = Some((level, String::new())),
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, title)) = heading.take() {
                    builder.heading(level, title.trim().to_string());
                }
            }
            Event::Start(Tag::Item) => items.push(String::new()),
            Event::End(TagEnd::Item) => {
                if let Some(text) = items.pop() {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        builder.list_item(text);
                    }
                }
            }
            Event::Start(Tag::Paragraph) if items.is_empty() => paragraph.clear(),
            Event::End(TagEnd::Paragraph) if items.is_empty() => {
                let text = paragraph.trim().to_string();
                paragraph.clear();
                if !text.is_empty() {
                    builder.paragraph(text);
                }
            }
            Event::Text(text) | Event::Code(text) => {
                let target = if let Some((_, title)) = heading.as_mut() {
                    title
                } else if let Some(item) = items.last_mut() {
                    item
                } else {
                    &mut paragraph
                };
                target.push_str(&text);
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(item) = items.last_mut() {
                    item.push(' ');
                } else if heading.is_none() {
                    paragraph.push('\n');
                }
            }
            _ => {}
        }
    }

    Ok(builder)
}

fn push_numbered(out: &mut String, title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {title}\n"));
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&format!("{}. {line}\n", i + 1));
    }
}

fn push_bulleted(out: &mut String, title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {title}\n"));
    for line in lines {
        out.push_str(&format!("- {line}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Serendipity\n/ˌsɛr.ənˈdɪp.ɪ.ti/\n\n## Part of speech\nnoun\n\n## Definitions\n1. The occurrence of events by chance in a happy way.\n2. A fortunate *accident*.\n\n## Examples\n- Finding that book was pure serendipity.\n\n## Synonyms\nchance, fluke; luck\n\n## Etymology\nCoined by Horace Walpole in 1754.\n\n## Cultural context\n- Popular in product design talks.\n";

    #[test]
    fn parses_all_known_sections() {
        let entry = ParsedEntry::parse_markdown(SAMPLE).expect("parse");
        assert_eq!(entry.headword, "Serendipity");
        assert_eq!(entry.pronunciation.as_deref(), Some("/ˌsɛr.ənˈdɪp.ɪ.ti/"));
        assert_eq!(entry.parts_of_speech, vec!["noun"]);
        assert_eq!(entry.definitions.len(), 2);
        assert_eq!(entry.definitions[1], "A fortunate accident.");
        assert_eq!(entry.examples, vec!["Finding that book was pure serendipity."]);
        assert_eq!(entry.synonyms, vec!["chance", "fluke", "luck"]);
        assert_eq!(
            entry.etymology.as_deref(),
            Some("Coined by Horace Walpole in 1754.")
        );
        assert_eq!(entry.extra_sections.len(), 1);
        assert_eq!(entry.extra_sections[0].title, "Cultural context");
    }

    #[test]
    fn missing_headword_is_rejected() {
        let err = ParsedEntry::parse_markdown("## Definitions\n- a thing\n").unwrap_err();
        assert_eq!(err, EntryParseError::MissingHeadword);
    }

    #[test]
    fn missing_definitions_is_rejected() {
        let err = ParsedEntry::parse_markdown("# word\n\n## Examples\n- hi\n").unwrap_err();
        assert!(matches!(err, EntryParseError::MissingDefinitions { headword } if headword == "word"));
    }

    #[test]
    fn transcript_parse_falls_back_to_term_and_paragraphs() {
        let entry = ParsedEntry::parse_transcript("Hello ", "hello").expect("lenient parse");
        assert_eq!(entry.headword, "hello");
        assert_eq!(entry.definitions, vec!["Hello"]);
        assert!(entry.notes.is_empty());
    }

    #[test]
    fn transcript_parse_keeps_structured_entries_intact() {
        let strict = ParsedEntry::parse_markdown(SAMPLE).expect("parse");
        let lenient = ParsedEntry::parse_transcript(SAMPLE, "other").expect("lenient parse");
        assert_eq!(strict, lenient);
    }

    #[test]
    fn transcript_parse_still_rejects_blank_input() {
        assert_eq!(
            ParsedEntry::parse_transcript("\n\n", "tree").unwrap_err(),
            EntryParseError::Empty
        );
    }

    #[test]
    fn blank_input_is_empty_error() {
        assert_eq!(
            ParsedEntry::parse_markdown("  \n").unwrap_err(),
            EntryParseError::Empty
        );
    }

    #[test]
    fn canonical_markdown_parses_back_to_same_entry() {
        let entry = ParsedEntry::parse_markdown(SAMPLE).expect("parse");
        let again = ParsedEntry::parse_markdown(&entry.to_markdown()).expect("reparse");
        assert_eq!(entry, again);
    }
}
