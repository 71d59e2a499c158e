//! Merge-conflict resolution.
//!
//! The pipeline for one file:
//! 1. **Parsing** -- [`parser`] extracts conflict regions with context.
//! 2. **Prompting** -- [`prompt`] renders the LLM request for a region.
//! 3. **Validation** -- [`validator`] turns the reply into a [`Suggestion`].
//! 4. **Deciding** -- [`engine`] runs the interactive per-region state machine.
//! 5. **Applying** -- [`mutator`] rewrites the file once, bottom-up.
//!
//! [`session`] strings these together and hands off to VCS integration.

pub mod engine;
pub mod log;
pub mod mutator;
pub mod parser;
pub mod prompt;
pub mod session;
pub mod validator;

pub use engine::{Outcome, Replacement, ResolutionEngine, ResolutionMethod, ResolutionResult};
pub use log::{ResolutionLog, ResolutionLogEntry};
pub use mutator::{Document, Mutation, Summary};
pub use parser::{parse, parse_file, ConflictRegion};
pub use prompt::PromptBuilder;
pub use session::{ResolveSession, SessionOptions, SessionOutcome, SessionReport};
pub use validator::Suggestion;
