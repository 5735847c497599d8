//! Static phrase → handler bindings

/// Errors building a command table
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    #[error("duplicate command phrase: {0:?}")]
    DuplicatePhrase(String),

    #[error("empty command phrase")]
    EmptyPhrase,
}

/// Immutable list of canonical phrases and their handlers.
///
/// Phrases are stored lowercased with single spaces and are unique.
/// Iteration follows declaration order, which also decides match ties.
#[derive(Debug, Clone)]
pub struct CommandTable<H> {
    entries: Vec<(String, H)>,
}

impl<H> CommandTable<H> {
    pub fn new<S: Into<String>>(entries: Vec<(S, H)>) -> Result<Self, TableError> {
        let mut table = Vec::with_capacity(entries.len());

        for (phrase, handler) in entries {
            let phrase = canonical(&phrase.into());
            if phrase.is_empty() {
                return Err(TableError::EmptyPhrase);
            }
            if table.iter().any(|(existing, _)| *existing == phrase) {
                return Err(TableError::DuplicatePhrase(phrase));
            }
            table.push((phrase, handler));
        }

        Ok(Self { entries: table })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &H)> {
        self.entries.iter().map(|(phrase, handler)| (phrase.as_str(), handler))
    }

    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(phrase, _)| phrase.as_str())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn canonical(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
