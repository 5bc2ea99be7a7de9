use super::{SequenceError, StepSequence};
use generational_arena::{Arena, Index};
use std::any::type_name;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

/// Stable handle of a unit-owned [`StepSequence`] stored in a [`SequenceArena`].
pub struct SequenceId<S> {
    index: Index,
    _phan: PhantomData<fn() -> S>,
}

impl<S> SequenceId<S> {
    fn new(index: Index) -> Self {
        Self {
            index,
            _phan: PhantomData,
        }
    }
}

impl<S> Debug for SequenceId<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceId")
            .field("index", &self.index)
            .field("state", &type_name::<S>())
            .finish()
    }
}

impl<S> Clone for SequenceId<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for SequenceId<S> {}

impl<S> PartialEq for SequenceId<S> {
    fn eq(&self, other: &Self) -> bool {
        self.index.eq(&other.index)
    }
}

impl<S> Eq for SequenceId<S> {}

impl<S> Hash for SequenceId<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

/// Reference to a sequence that can be run: either a mutable, unit-owned sequence living in the
/// arena, or an immutable sequence shared by all dynamic instances of one static instruction.
pub enum SequenceRef<S: 'static> {
    Id(SequenceId<S>),
    Shared(Rc<StepSequence<S>>),
}

impl<S> SequenceRef<S> {
    /// Returns `true` if both refer to the very same sequence.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Id(a), Self::Id(b)) => a == b,
            (Self::Shared(a), Self::Shared(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn id(&self) -> Option<SequenceId<S>> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Shared(_) => None,
        }
    }
}

impl<S> Clone for SequenceRef<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Id(id) => Self::Id(*id),
            Self::Shared(sequence) => Self::Shared(Rc::clone(sequence)),
        }
    }
}

impl<S> From<SequenceId<S>> for SequenceRef<S> {
    fn from(id: SequenceId<S>) -> Self {
        Self::Id(id)
    }
}

impl<S> From<Rc<StepSequence<S>>> for SequenceRef<S> {
    fn from(sequence: Rc<StepSequence<S>>) -> Self {
        Self::Shared(sequence)
    }
}

impl<S> Debug for SequenceRef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => f.debug_tuple("Id").field(id).finish(),
            Self::Shared(sequence) => f.debug_tuple("Shared").field(&sequence.name()).finish(),
        }
    }
}

/// Owner of all unit sequences.
///
/// Running a sequence borrows the arena immutably (see [`run`](Self::run)), while every
/// structural change goes through [`get_mut`](Self::get_mut). The borrow checker therefore rules
/// out mutating any sequence while one is being run.
pub struct SequenceArena<S: 'static> {
    sequences: Arena<StepSequence<S>>,
}

impl<S> Default for SequenceArena<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SequenceArena<S> {
    pub fn new() -> Self {
        Self {
            sequences: Arena::new(),
        }
    }

    pub fn insert(&mut self, sequence: StepSequence<S>) -> SequenceId<S> {
        SequenceId::new(self.sequences.insert(sequence))
    }

    pub fn remove(&mut self, id: SequenceId<S>) -> Result<StepSequence<S>, SequenceError> {
        self.sequences
            .remove(id.index)
            .ok_or(SequenceError::UnknownSequence)
    }

    pub fn get(&self, id: SequenceId<S>) -> Result<&StepSequence<S>, SequenceError> {
        self.sequences
            .get(id.index)
            .ok_or(SequenceError::UnknownSequence)
    }

    pub fn get_mut(&mut self, id: SequenceId<S>) -> Result<&mut StepSequence<S>, SequenceError> {
        self.sequences
            .get_mut(id.index)
            .ok_or(SequenceError::UnknownSequence)
    }

    /// Resolves a [`SequenceRef`] into the sequence it points at.
    pub fn resolve<'a>(
        &'a self,
        target: &'a SequenceRef<S>,
    ) -> Result<&'a StepSequence<S>, SequenceError> {
        match target {
            SequenceRef::Id(id) => self.get(*id),
            SequenceRef::Shared(sequence) => Ok(sequence),
        }
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

impl<S> Debug for SequenceArena<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.sequences.iter().map(|(_, sequence)| sequence.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_id() {
        let mut arena = SequenceArena::<()>::new();
        let id = arena.insert(StepSequence::new("a"));
        assert_eq!("a", arena.get(id).unwrap().name());
        arena.remove(id).unwrap();
        assert!(matches!(arena.get(id), Err(SequenceError::UnknownSequence)));
        let other = arena.insert(StepSequence::new("b"));
        assert_ne!(id, other);
        assert!(arena.get(id).is_err());
    }

    #[test]
    fn test_same_as() {
        let mut arena = SequenceArena::<()>::new();
        let a = arena.insert(StepSequence::new("a"));
        let b = arena.insert(StepSequence::new("b"));
        let shared = Rc::new(StepSequence::<()>::new("shared"));
        let x = SequenceRef::from(Rc::clone(&shared));
        assert!(SequenceRef::from(a).same_as(&SequenceRef::from(a)));
        assert!(!SequenceRef::from(a).same_as(&SequenceRef::from(b)));
        assert!(x.same_as(&SequenceRef::Shared(shared)));
        assert!(!x.same_as(&SequenceRef::Shared(Rc::new(StepSequence::new("shared")))));
        assert_eq!(Some(a), SequenceRef::from(a).id());
        assert_eq!(None, x.id());
    }
}
