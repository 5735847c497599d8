//! Command table, fuzzy matcher and built-in command handlers

mod handlers;
mod matcher;
mod table;

pub use handlers::{CommandContext, CommandHandler, CommandKind, Outcome};
pub use matcher::{canonical_words, CommandMatcher, DEFAULT_CUTOFF};
