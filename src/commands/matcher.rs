//! Fuzzy matching of transcripts against the command table
//!
//! Transcripts are normalized (lowercased, filler words dropped, whitespace
//! collapsed) and scored against every phrase with a Ratcliff/Obershelp
//! similarity ratio. The best phrase wins if it clears the cutoff.

use tracing::info;

use super::table::CommandTable;

/// Default minimum similarity for a match
pub const DEFAULT_CUTOFF: f64 = 0.6;

/// Politeness and hesitation words that carry no command meaning
const FILLERS: &[&str] = &["please", "can you", "could you", "would you", "um"];

/// The winning phrase for a transcript
#[derive(Debug)]
pub struct CommandMatch<'a, H> {
    pub phrase: &'a str,
    pub handler: &'a H,
    pub score: f64,
}

/// Maps free-form transcripts onto command table entries
pub struct CommandMatcher<H> {
    table: CommandTable<H>,
    /// Filler phrases, pre-split into words
    fillers: Vec<Vec<String>>,
    cutoff: f64,
}

impl<H> CommandMatcher<H> {
    /// Build a matcher; `wake_aliases` are stripped from transcripts like fillers
    pub fn new(table: CommandTable<H>, wake_aliases: &[String], cutoff: f64) -> Self {
        let fillers = FILLERS
            .iter()
            .copied()
            .chain(wake_aliases.iter().map(String::as_str))
            .map(|phrase| words(&phrase.to_lowercase()))
            .filter(|words| !words.is_empty())
            .collect();

        Self {
            table,
            fillers,
            cutoff,
        }
    }

    pub fn table(&self) -> &CommandTable<H> {
        &self.table
    }

    /// Lowercase, drop filler words and collapse whitespace.
    ///
    /// Removal repeats until no filler is left, so dropping one filler
    /// cannot expose another and the result is a fixed point.
    pub fn normalize(&self, raw: &str) -> String {
        let mut tokens = words(&raw.to_lowercase());

        loop {
            let mut kept = Vec::with_capacity(tokens.len());
            let mut removed = false;
            let mut i = 0;

            while i < tokens.len() {
                match self.fillers.iter().find(|f| tokens[i..].starts_with(f)) {
                    Some(filler) => {
                        i += filler.len();
                        removed = true;
                    }
                    None => {
                        kept.push(std::mem::take(&mut tokens[i]));
                        i += 1;
                    }
                }
            }

            tokens = kept;
            if !removed {
                break;
            }
        }

        tokens.join(" ")
    }

    /// Highest-scoring phrase regardless of the cutoff.
    ///
    /// Ties go to the phrase declared first in the table.
    pub fn best_match(&self, normalized: &str) -> Option<CommandMatch<'_, H>> {
        let mut best: Option<CommandMatch<'_, H>> = None;

        for (phrase, handler) in self.table.iter() {
            let score = similarity(normalized, phrase);
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(CommandMatch {
                    phrase,
                    handler,
                    score,
                });
            }
        }

        best
    }

    /// Find the command a transcript refers to, if any clears the cutoff
    pub fn match_command(&self, raw: &str) -> Option<CommandMatch<'_, H>> {
        let normalized = self.normalize(raw);

        match self.best_match(&normalized) {
            Some(found) if found.score >= self.cutoff => {
                info!(
                    input = raw,
                    normalized = %normalized,
                    phrase = found.phrase,
                    score = found.score,
                    "matched command"
                );
                Some(found)
            }
            best => {
                info!(
                    input = raw,
                    normalized = %normalized,
                    best = best.as_ref().map(|b| b.phrase),
                    score = best.as_ref().map(|b| b.score),
                    "no matching command"
                );
                None
            }
        }
    }
}

/// Lowercase, strip punctuation around words and collapse whitespace
pub fn canonical_words(text: &str) -> String {
    words(&text.to_lowercase()).join(" ")
}

/// Split into words, trimming punctuation other than apostrophes
fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation() && c != '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Ratcliff/Obershelp similarity: twice the matched characters over the
/// total length of both strings, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Sum of the longest common block plus, recursively, the blocks on
/// either side of it
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, size) = longest_common_block(a, b);
    if size == 0 {
        return 0;
    }

    size + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + size..], &b[j + size..])
}

/// Longest common substring as `(start_a, start_b, len)`, earliest in `a`
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };

            let len = cur[j + 1];
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    best
}
