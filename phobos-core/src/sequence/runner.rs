use super::{SequenceArena, SequenceId, SequenceRef, StepContext, StepOutcome};
use crate::SimError;
use log::trace;
use std::fmt;

/// Resume point of a sequence, held by whoever drives the runner.
///
/// Keeping the position outside of the sequence means the same (possibly shared) sequence can be
/// suspended in several places at once without the positions aliasing.
pub struct Cursor<S: 'static> {
    suspended: Option<(SequenceRef<S>, usize)>,
}

impl<S> Default for Cursor<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Cursor<S> {
    pub fn new() -> Self {
        Self { suspended: None }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    /// Position of the step that asked to be repeated, if it belongs to `target`.
    pub fn position_in(&self, target: &SequenceRef<S>) -> Option<usize> {
        match &self.suspended {
            Some((sequence, position)) if sequence.same_as(target) => Some(*position),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.suspended = None;
    }
}

impl<S> fmt::Debug for Cursor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("suspended", &self.suspended)
            .finish()
    }
}

/// How a single [`run`](SequenceArena::run) ended.
pub enum Exit<S: 'static> {
    /// Every step advanced; carries the sequence's continuation.
    FellThrough(Option<SequenceRef<S>>),
    /// A step diverted to another sequence.
    Diverted(SequenceRef<S>),
    /// A step asked to be repeated; running the carried sequence again resumes at that step.
    Suspended(SequenceRef<S>),
}

impl<S> fmt::Debug for Exit<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FellThrough(next) => f.debug_tuple("FellThrough").field(next).finish(),
            Self::Diverted(target) => f.debug_tuple("Diverted").field(target).finish(),
            Self::Suspended(target) => f.debug_tuple("Suspended").field(target).finish(),
        }
    }
}

impl<S> Exit<S> {
    /// The sequence to run next, or `None` if execution should stop here.
    pub fn next(self) -> Option<SequenceRef<S>> {
        match self {
            Self::FellThrough(next) => next,
            Self::Diverted(target) | Self::Suspended(target) => Some(target),
        }
    }
}

impl<S> SequenceArena<S> {
    /// Runs `target` from its entry point, or from the step `cursor` was suspended on.
    ///
    /// Steps run strictly in order. A step returning [`StepOutcome::Repeat`] suspends the run and
    /// records its position in `cursor`; a step returning [`StepOutcome::Divert`] ends the run
    /// immediately. Errors returned by a step abort the run and are passed on unchanged.
    pub fn run(
        &self,
        target: &SequenceRef<S>,
        state: &mut S,
        cursor: &mut Cursor<S>,
    ) -> Result<Exit<S>, SimError> {
        let sequence = self.resolve(target)?;
        let mut position = cursor.position_in(target).unwrap_or(0);
        cursor.clear();

        while let Some(step) = sequence.steps().get(position) {
            trace!("{}[{}]: {}", sequence.name(), position, step.name());
            let context = StepContext {
                position,
                sequences: self,
            };
            match step.invoke(state, context)? {
                StepOutcome::Advance => position += 1,
                StepOutcome::Repeat => {
                    cursor.suspended = Some((target.clone(), position));
                    return Ok(Exit::Suspended(target.clone()));
                }
                StepOutcome::Divert(to) => {
                    trace!("{}[{}]: diverted to {:?}", sequence.name(), position, to);
                    return Ok(Exit::Diverted(to));
                }
            }
        }
        Ok(Exit::FellThrough(
            sequence.continuation().map(SequenceRef::Id),
        ))
    }

    /// Runs the unit sequence `id` to completion on behalf of another step.
    ///
    /// Repeats are honored immediately rather than yielding to the outer driver, so the caller
    /// only ever sees a fall-through or a diversion.
    pub fn run_nested(&self, id: SequenceId<S>, state: &mut S) -> Result<Exit<S>, SimError> {
        let target = SequenceRef::Id(id);
        let mut cursor = Cursor::new();
        loop {
            match self.run(&target, state, &mut cursor)? {
                Exit::Suspended(_) => continue,
                exit => return Ok(exit),
            }
        }
    }
}
