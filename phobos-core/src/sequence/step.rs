use super::{SequenceArena, SequenceRef};
use crate::SimError;
use std::fmt;

/// Classification of a [`Step`], used only to locate steps inside a sequence.
///
/// Tags never select behavior: the step's body does. They exist so that owners can address "the
/// translation step" or "the execute step" of a sequence when rewiring it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StepTag {
    Fetch,
    InstTranslate,
    Decode,
    ComputeAddress,
    DataTranslate,
    Execute,
    Exception,
    Finish,
    PreExecute,
    PostExecute,
    PreException,
    StopSim,
}

impl fmt::Display for StepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "FETCH",
            Self::InstTranslate => "INST_TRANSLATE",
            Self::Decode => "DECODE",
            Self::ComputeAddress => "COMPUTE_ADDRESS",
            Self::DataTranslate => "DATA_TRANSLATE",
            Self::Execute => "EXECUTE",
            Self::Exception => "EXCEPTION",
            Self::Finish => "FINISH",
            Self::PreExecute => "PRE_EXECUTE",
            Self::PostExecute => "POST_EXECUTE",
            Self::PreException => "PRE_EXCEPTION",
            Self::StopSim => "STOP_SIM",
        })
    }
}

/// What the runner should do after a step returns.
pub enum StepOutcome<S: 'static> {
    /// Move on to the next step, or to the sequence's continuation if this was the last one.
    Advance,
    /// Stop here and invoke this same step again the next time the sequence is run.
    Repeat,
    /// Abandon the remaining steps (of this and every enclosing sequence) and continue at the
    /// given sequence.
    Divert(SequenceRef<S>),
}

impl<S> fmt::Debug for StepOutcome<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advance => f.write_str("Advance"),
            Self::Repeat => f.write_str("Repeat"),
            Self::Divert(target) => f.debug_tuple("Divert").field(target).finish(),
        }
    }
}

pub type StepResult<S> = Result<StepOutcome<S>, SimError>;

/// Everything a step gets to know about where it is running.
pub struct StepContext<'a, S: 'static> {
    /// Index of the step inside the sequence being run.
    pub position: usize,
    /// Read-only view of all unit-owned sequences, for steps that call into another unit.
    pub sequences: &'a SequenceArena<S>,
}

impl<S> Clone for StepContext<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for StepContext<'_, S> {}

pub type StepBody<S> = fn(&mut S, StepContext<'_, S>) -> StepResult<S>;

/// The atomic unit of work in a sequence: a tagged function over the machine state.
pub struct Step<S: 'static> {
    name: &'static str,
    tag: StepTag,
    body: StepBody<S>,
}

impl<S> Step<S> {
    pub const fn new(name: &'static str, tag: StepTag, body: StepBody<S>) -> Self {
        Self { name, tag, body }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn tag(&self) -> StepTag {
        self.tag
    }

    /// Invokes the step's body.
    pub fn invoke(&self, state: &mut S, context: StepContext<'_, S>) -> StepResult<S> {
        (self.body)(state, context)
    }
}

impl<S> Clone for Step<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Step<S> {}

impl<S> fmt::Debug for Step<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .finish()
    }
}
