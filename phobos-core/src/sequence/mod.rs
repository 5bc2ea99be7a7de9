//! Step sequences: the building blocks out of which all instruction behavior is composed.
//!
//! A [`Step`] is a small tagged function over the machine state. Steps are grouped into
//! [`StepSequence`]s, one per pipeline role (fetch, translate, execute, ...) and one per decoded
//! static instruction. Sequences are linked through their continuation, and the
//! [`SequenceArena`] runner walks them one at a time, handing the next sequence back to its caller.

mod arena;
mod list;
mod runner;
mod step;

pub use arena::{SequenceArena, SequenceId, SequenceRef};
pub use list::StepSequence;
pub use runner::{Cursor, Exit};
pub use step::{Step, StepBody, StepContext, StepOutcome, StepResult, StepTag};

use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum SequenceError {
    #[error("no step tagged {tag} in sequence \"{sequence}\"")]
    TagNotFound { sequence: String, tag: StepTag },
    #[error("sequence id does not refer to a live sequence")]
    UnknownSequence,
}
