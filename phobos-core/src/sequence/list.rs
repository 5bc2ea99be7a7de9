use super::{SequenceError, SequenceId, Step, StepTag};
use log::trace;
use std::fmt;

/// An ordered list of [`Step`]s with a single entry point (the first step), and the sequence to
/// continue with when the last step advances.
///
/// Steps are located by [`StepTag`]. Every tag-addressed operation resolves to the *first* step
/// carrying the tag and fails with [`SequenceError::TagNotFound`] when there is none, in which case
/// the sequence is left untouched.
pub struct StepSequence<S: 'static> {
    name: String,
    steps: Vec<Step<S>>,
    continuation: Option<SequenceId<S>>,
}

impl<S> StepSequence<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            continuation: None,
        }
    }

    pub fn with_steps(
        name: impl Into<String>,
        steps: impl IntoIterator<Item = Step<S>>,
        continuation: Option<SequenceId<S>>,
    ) -> Self {
        Self {
            name: name.into(),
            steps: steps.into_iter().collect(),
            continuation,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step<S>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn continuation(&self) -> Option<SequenceId<S>> {
        self.continuation
    }

    pub fn set_continuation(&mut self, continuation: Option<SequenceId<S>>) {
        trace!("{}: continuation relinked", self.name);
        self.continuation = continuation;
    }

    /// Returns `true` if the **first** step carries `tag`.
    ///
    /// This answers "what is this sequence configured to start with", not "does any step have
    /// this tag"; use [`count_tag`](Self::count_tag) for the latter.
    pub fn has_tag(&self, tag: StepTag) -> bool {
        self.steps.first().is_some_and(|step| step.tag() == tag)
    }

    pub fn count_tag(&self, tag: StepTag) -> usize {
        self.steps.iter().filter(|step| step.tag() == tag).count()
    }

    pub fn push(&mut self, step: Step<S>) {
        self.steps.push(step);
    }

    pub fn insert_front(&mut self, step: Step<S>) {
        self.steps.insert(0, step);
    }

    /// Inserts `step` right before the first step tagged `tag`.
    pub fn insert_before(&mut self, step: Step<S>, tag: StepTag) -> Result<(), SequenceError> {
        let index = self.position_of(tag)?;
        trace!("{}: inserting {} before {}", self.name, step.name(), tag);
        self.steps.insert(index, step);
        Ok(())
    }

    /// Inserts `step` right after the first step tagged `tag`.
    pub fn insert_after(&mut self, step: Step<S>, tag: StepTag) -> Result<(), SequenceError> {
        let index = self.position_of(tag)?;
        trace!("{}: inserting {} after {}", self.name, step.name(), tag);
        self.steps.insert(index + 1, step);
        Ok(())
    }

    /// Removes every step tagged `tag`, returning how many were removed.
    pub fn remove(&mut self, tag: StepTag) -> Result<usize, SequenceError> {
        self.position_of(tag)?;
        let before = self.steps.len();
        self.steps.retain(|step| step.tag() != tag);
        trace!("{}: removed {} step(s) tagged {}", self.name, before - self.steps.len(), tag);
        Ok(before - self.steps.len())
    }

    /// Replaces the first step tagged `tag` with `step`, returning the step that was replaced.
    pub fn replace(&mut self, tag: StepTag, step: Step<S>) -> Result<Step<S>, SequenceError> {
        let index = self.position_of(tag)?;
        trace!("{}: replacing {} with {}", self.name, self.steps[index].name(), step.name());
        Ok(std::mem::replace(&mut self.steps[index], step))
    }

    fn position_of(&self, tag: StepTag) -> Result<usize, SequenceError> {
        self.steps
            .iter()
            .position(|step| step.tag() == tag)
            .ok_or_else(|| SequenceError::TagNotFound {
                sequence: self.name.clone(),
                tag,
            })
    }
}

impl<S> fmt::Debug for StepSequence<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSequence")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("continuation", &self.continuation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{StepContext, StepOutcome, StepResult};
    use proptest::prelude::*;

    fn nop(_: &mut (), _: StepContext<'_, ()>) -> StepResult<()> {
        Ok(StepOutcome::Advance)
    }

    fn step(name: &'static str, tag: StepTag) -> Step<()> {
        Step::new(name, tag, nop)
    }

    fn names(sequence: &StepSequence<()>) -> Vec<&'static str> {
        sequence.steps().iter().map(|step| step.name()).collect()
    }

    fn sample() -> StepSequence<()> {
        StepSequence::with_steps(
            "sample",
            [
                step("compute", StepTag::ComputeAddress),
                step("translate", StepTag::DataTranslate),
                step("execute", StepTag::Execute),
            ],
            None,
        )
    }

    #[test]
    fn test_insert_before_and_after() {
        let mut sequence = sample();
        sequence
            .insert_before(step("pre", StepTag::PreExecute), StepTag::Execute)
            .unwrap();
        sequence
            .insert_after(step("post", StepTag::PostExecute), StepTag::Execute)
            .unwrap();
        sequence.insert_front(step("fetch", StepTag::Fetch));
        assert_eq!(
            vec!["fetch", "compute", "translate", "pre", "execute", "post"],
            names(&sequence)
        );
    }

    #[test]
    fn test_insert_resolves_first_occurrence() {
        let mut sequence = sample();
        sequence.push(step("execute2", StepTag::Execute));
        sequence
            .insert_after(step("post", StepTag::PostExecute), StepTag::Execute)
            .unwrap();
        assert_eq!(
            vec!["compute", "translate", "execute", "post", "execute2"],
            names(&sequence)
        );
    }

    #[test]
    fn test_replace() {
        let mut sequence = sample();
        let old = sequence
            .replace(StepTag::DataTranslate, step("sv39", StepTag::DataTranslate))
            .unwrap();
        assert_eq!("translate", old.name());
        assert_eq!(vec!["compute", "sv39", "execute"], names(&sequence));
    }

    #[test]
    fn test_remove_all_occurrences() {
        let mut sequence = sample();
        sequence.push(step("compute2", StepTag::ComputeAddress));
        assert_eq!(2, sequence.remove(StepTag::ComputeAddress).unwrap());
        assert_eq!(vec!["translate", "execute"], names(&sequence));
    }

    #[test]
    fn test_missing_tag_leaves_sequence_unmodified() {
        let mut sequence = sample();
        let expected = names(&sequence);
        let missing = StepTag::StopSim;
        assert!(matches!(
            sequence.remove(missing),
            Err(SequenceError::TagNotFound { tag: StepTag::StopSim, .. })
        ));
        assert!(sequence.replace(missing, step("x", missing)).is_err());
        assert!(sequence.insert_before(step("x", missing), missing).is_err());
        assert!(sequence.insert_after(step("x", missing), missing).is_err());
        assert_eq!(expected, names(&sequence));
    }

    #[test]
    fn test_has_tag_checks_first_step_only() {
        let sequence = sample();
        assert!(sequence.has_tag(StepTag::ComputeAddress));
        assert!(!sequence.has_tag(StepTag::Execute));
        assert_eq!(1, sequence.count_tag(StepTag::Execute));
        assert!(!StepSequence::<()>::new("empty").has_tag(StepTag::Execute));
    }

    const TAGS: [StepTag; 4] = [
        StepTag::ComputeAddress,
        StepTag::DataTranslate,
        StepTag::Execute,
        StepTag::PostExecute,
    ];

    const NAMES: [&str; 8] = ["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7"];

    proptest! {
        #[test]
        fn property_remove_keeps_remaining_order(
            tags in proptest::collection::vec(0..TAGS.len(), 1..NAMES.len()),
            target in 0..TAGS.len(),
        ) {
            let mut sequence = StepSequence::new("prop");
            for (i, &tag) in tags.iter().enumerate() {
                sequence.push(step(NAMES[i], TAGS[tag]));
            }
            let tag = TAGS[target];
            let present = sequence.count_tag(tag);
            let expected: Vec<_> = sequence
                .steps()
                .iter()
                .filter(|step| step.tag() != tag)
                .map(|step| step.name())
                .collect();
            let before = names(&sequence);

            match sequence.remove(tag) {
                Ok(removed) => {
                    prop_assert!(present > 0);
                    prop_assert_eq!(present, removed);
                    prop_assert_eq!(0, sequence.count_tag(tag));
                    prop_assert_eq!(expected, names(&sequence));
                }
                Err(_) => {
                    prop_assert_eq!(0, present);
                    prop_assert_eq!(before, names(&sequence));
                }
            }
        }
    }
}
