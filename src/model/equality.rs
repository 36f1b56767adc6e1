use super::InsnKind;
use crate::arena::{Arena, InsnId};

/// Compares two instruction trees of the same method for semantic equality. Offsets and line
/// numbers are ignored.
pub fn compare(arena: &Arena, x: InsnId, y: InsnId) -> bool {
    Checker {
        x_arena: arena,
        y_arena: arena,
    }
    .compare(x, y)
}

/// Compares trees living in different arenas, e.g. the bodies of two constructors. Both methods
/// must belong to the same class, so that constant pool indices are comparable.
pub fn compare_across(x_arena: &Arena, x: InsnId, y_arena: &Arena, y: InsnId) -> bool {
    Checker { x_arena, y_arena }.compare(x, y)
}

struct Checker<'a> {
    x_arena: &'a Arena,
    y_arena: &'a Arena,
}

impl Checker<'_> {
    fn compare(&self, x: InsnId, y: InsnId) -> bool {
        if core::ptr::eq(self.x_arena, self.y_arena) && x == y {
            return true;
        }
        self.compare_kinds(&self.x_arena[x].kind, &self.y_arena[y].kind)
    }

    fn compare_all(&self, x: &[InsnId], y: &[InsnId]) -> bool {
        x.len() == y.len() && x.iter().zip(y).all(|(x, y)| self.compare(*x, *y))
    }

    fn compare_opt(&self, x: Option<InsnId>, y: Option<InsnId>) -> bool {
        match (x, y) {
            (None, None) => true,
            (Some(x), Some(y)) => self.compare(x, y),
            _ => false,
        }
    }

    fn compare_kinds(&self, x: &InsnKind, y: &InsnKind) -> bool {
        use InsnKind::*;
        match (x, y) {
            (Load { ty, index }, Load { ty: ty2, index: index2 }) => ty == ty2 && index == index2,
            (ExceptionLoad { class_index }, ExceptionLoad { class_index: c2 }) => {
                class_index == c2
            }
            (IConst(a), IConst(b)) => a == b,
            (LConst(a), LConst(b)) => a == b,
            (FConst(a), FConst(b)) => a.to_bits() == b.to_bits(),
            (DConst(a), DConst(b)) => a.to_bits() == b.to_bits(),
            (AConstNull, AConstNull) => true,
            (Ldc { index }, Ldc { index: i2 }) => index == i2,
            (GetStatic { index }, GetStatic { index: i2 }) => index == i2,
            (GetField { index, object }, GetField { index: i2, object: o2 }) => {
                index == i2 && self.compare(*object, *o2)
            }
            (
                ArrayLoad { ty, array, index },
                ArrayLoad {
                    ty: ty2,
                    array: a2,
                    index: i2,
                },
            ) => ty == ty2 && self.compare(*array, *a2) && self.compare(*index, *i2),
            (ArrayLength { array }, ArrayLength { array: a2 }) => self.compare(*array, *a2),
            (BinaryOp { op, lhs, rhs }, BinaryOp { op: op2, lhs: l2, rhs: r2 }) => {
                op == op2 && self.compare(*lhs, *l2) && self.compare(*rhs, *r2)
            }
            (UnaryOp { op, value }, UnaryOp { op: op2, value: v2 }) => {
                op == op2 && self.compare(*value, *v2)
            }
            (Convert { to, value }, Convert { to: to2, value: v2 }) => {
                to == to2 && self.compare(*value, *v2)
            }
            (
                CheckCast {
                    class_index,
                    object,
                },
                CheckCast {
                    class_index: c2,
                    object: o2,
                },
            )
            | (
                InstanceOf {
                    class_index,
                    object,
                },
                InstanceOf {
                    class_index: c2,
                    object: o2,
                },
            ) => class_index == c2 && self.compare(*object, *o2),
            (
                Invoke {
                    kind,
                    index,
                    object,
                    args,
                },
                Invoke {
                    kind: k2,
                    index: i2,
                    object: o2,
                    args: a2,
                },
            ) => {
                kind == k2 && index == i2 && self.compare_opt(*object, *o2) && self.compare_all(args, a2)
            }
            (New { class_index }, New { class_index: c2 }) => class_index == c2,
            (InvokeNew { index, args }, InvokeNew { index: i2, args: a2 }) => {
                index == i2 && self.compare_all(args, a2)
            }
            (NewArray { ty, length }, NewArray { ty: ty2, length: l2 }) => {
                ty == ty2 && self.compare(*length, *l2)
            }
            (
                ANewArray {
                    class_index,
                    length,
                },
                ANewArray {
                    class_index: c2,
                    length: l2,
                },
            ) => class_index == c2 && self.compare(*length, *l2),
            (
                MultiANewArray {
                    class_index,
                    dimensions,
                },
                MultiANewArray {
                    class_index: c2,
                    dimensions: d2,
                },
            ) => class_index == c2 && self.compare_all(dimensions, d2),
            (InitArray { new_array, values }, InitArray { new_array: n2, values: v2 }) => {
                self.compare(*new_array, *n2) && self.compare_all(values, v2)
            }
            // Two loads of a duplicated value are equal when they load equal values. Within one
            // arena this degenerates to store identity for the common case.
            (DupLoad { store }, DupLoad { store: s2 }) => {
                (core::ptr::eq(self.x_arena, self.y_arena) && store == s2)
                    || self.compare(*store, *s2)
            }
            (DupStore { value }, DupStore { value: v2 }) => self.compare(*value, *v2),
            (OuterThis { class_index }, OuterThis { class_index: c2 }) => class_index == c2,
            (
                Ternary {
                    condition,
                    branches,
                },
                Ternary {
                    condition: c2,
                    branches: b2,
                },
            ) => self.compare(*condition, *c2) && self.compare_all(branches, b2),
            (Assignment { op, target, value }, Assignment { op: op2, target: t2, value: v2 }) => {
                op == op2 && self.compare(*target, *t2) && self.compare(*value, *v2)
            }
            (
                Inc {
                    position,
                    target,
                    delta,
                },
                Inc {
                    position: p2,
                    target: t2,
                    delta: d2,
                },
            ) => position == p2 && delta == d2 && self.compare(*target, *t2),
            (If { cmp, value, .. }, If { cmp: c2, value: v2, .. })
            | (IfNull { cmp, value, .. }, IfNull { cmp: c2, value: v2, .. }) => {
                cmp == c2 && self.compare(*value, *v2)
            }
            (IfCmp { cmp, lhs, rhs, .. }, IfCmp { cmp: c2, lhs: l2, rhs: r2, .. }) => {
                cmp == c2 && self.compare(*lhs, *l2) && self.compare(*rhs, *r2)
            }
            (Store { ty, index, value }, Store { ty: ty2, index: i2, value: v2 }) => {
                ty == ty2 && index == i2 && self.compare(*value, *v2)
            }
            (PutStatic { index, value }, PutStatic { index: i2, value: v2 }) => {
                index == i2 && self.compare(*value, *v2)
            }
            (
                PutField {
                    index,
                    object,
                    value,
                },
                PutField {
                    index: i2,
                    object: o2,
                    value: v2,
                },
            ) => index == i2 && self.compare(*object, *o2) && self.compare(*value, *v2),
            (
                ArrayStore {
                    ty,
                    array,
                    index,
                    value,
                },
                ArrayStore {
                    ty: ty2,
                    array: a2,
                    index: i2,
                    value: v2,
                },
            ) => {
                ty == ty2
                    && self.compare(*array, *a2)
                    && self.compare(*index, *i2)
                    && self.compare(*value, *v2)
            }
            (IInc { index, delta }, IInc { index: i2, delta: d2 }) => index == i2 && delta == d2,
            (Pop { value }, Pop { value: v2 })
            | (XReturn { value }, XReturn { value: v2 })
            | (AThrow { value }, AThrow { value: v2 }) => self.compare(*value, *v2),
            (Return, Return) => true,
            // Control flow is never compared.
            _ => false,
        }
    }
}
