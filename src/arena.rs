use crate::model::{DebugIr, InsnKind, Instruction};
use core::fmt::{self, Display};
use core::ops::{Index, IndexMut};

/// A stable handle to an instruction node. Handles stay valid for the lifetime of the arena, even
/// after the node has been detached from every instruction list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InsnId(pub u32);

// Every method owns a single arena holding both the raw instructions produced by the list builder
// and everything synthesized by later passes. Rewrites replace nodes in place (`arena[id] = ...`)
// instead of patching parents, which is what keeps `DupLoad -> DupStore` links and field
// initializer values valid across passes.
//
// Each node is assumed to be referenced from a single place, with `DupStore` being the only
// exception: it's shared by its `DupLoad`s via its ID.
#[derive(Clone, Debug, Default)]
pub struct Arena {
    elements: Vec<Instruction>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, insn: Instruction) -> InsnId {
        let id = InsnId(
            self.elements
                .len()
                .try_into()
                .expect("instruction ID overflow"),
        );
        self.elements.push(insn);
        id
    }

    /// Allocates a node inheriting the position of `origin`.
    pub fn alloc_at(&mut self, origin: InsnId, kind: InsnKind) -> InsnId {
        let Instruction {
            offset,
            line_number,
            ..
        } = self[origin];
        self.alloc(Instruction {
            offset,
            line_number,
            kind,
        })
    }

    /// Replaces the payload of `id`, keeping its offset and line number.
    pub fn replace_kind(&mut self, id: InsnId, kind: InsnKind) -> InsnKind {
        core::mem::replace(&mut self[id].kind, kind)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn debug<'a, T: DebugIr + ?Sized>(&'a self, value: &'a T) -> impl Display + 'a {
        struct IrDisplay<'a, T: ?Sized> {
            value: &'a T,
            arena: &'a Arena,
        }

        impl<T: DebugIr + ?Sized> Display for IrDisplay<'_, T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                T::fmt(self.value, f, self.arena)
            }
        }

        IrDisplay { value, arena: self }
    }
}

impl Index<InsnId> for Arena {
    type Output = Instruction;

    fn index(&self, id: InsnId) -> &Self::Output {
        &self.elements[id.0 as usize]
    }
}

impl IndexMut<InsnId> for Arena {
    fn index_mut(&mut self, id: InsnId) -> &mut Self::Output {
        self.elements
            .get_mut(id.0 as usize)
            .expect("non-existing instruction ID")
    }
}
