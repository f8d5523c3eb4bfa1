//! Dictionary lookup tool backed by a small built-in word list.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AgentError;
use crate::tools::{string_arg, ArgKind, ArgumentSchema, Tool, ToolOutput};

const DEFINITIONS: [(&str, &str); 10] = [
    ("ephemeral", "Lasting for a very short time; transient."),
    ("resilient", "Able to withstand or recover quickly from difficult conditions."),
    ("ubiquitous", "Present, appearing, or found everywhere."),
    ("paradigm", "A typical example or pattern of something; a model."),
    ("serendipity", "The occurrence of events by chance in a happy or beneficial way."),
    ("eloquent", "Fluent or persuasive in speaking or writing."),
    ("ambiguous", "Open to more than one interpretation; not having one obvious meaning."),
    ("diligent", "Having or showing care in one's work or duties."),
    ("verbose", "Using more words than needed; wordy."),
    ("conundrum", "A confusing and difficult problem or question."),
];

/// `lookup_word(word)`.
pub struct LookupWordTool;

impl LookupWordTool {
    /// Definition of `word`, ignoring case and surrounding quotes.
    pub fn define(word: &str) -> Option<&'static str> {
        let key = word.trim().trim_matches(|c| c == '\'' || c == '"').to_lowercase();
        DEFINITIONS
            .iter()
            .find(|(entry, _)| *entry == key)
            .map(|(_, definition)| *definition)
    }
}

#[async_trait]
impl Tool for LookupWordTool {
    fn name(&self) -> &str {
        "lookup_word"
    }

    fn description(&self) -> &str {
        "Look up the definition of a word in the dictionary."
    }

    fn schema(&self) -> ArgumentSchema {
        ArgumentSchema::new().required("word", ArgKind::String, "The word to look up in the dictionary.")
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolOutput, AgentError> {
        let word = string_arg(self.name(), &arguments, "word")?;
        let content = match Self::define(word) {
            Some(definition) => format!("Definition of '{}': {}", word, definition),
            None => format!(
                "Word '{}' not found in dictionary. Please try another word.",
                word
            ),
        };
        Ok(ToolOutput::text(content))
    }
}
