// `a + b` on strings compiles to
//
//     new StringBuilder().append(a).append(b).toString()
//
// (`StringBuffer` before Java 5, and `new StringBuilder(String.valueOf(a))` with some compilers).
// The chain is folded back into a left-associative `+`. Java only treats `+` as concatenation if
// one of the first two operands is a `String`, so a `""` is prepended when neither is known to be.

use super::PassContext;
use crate::MethodAnalysisError;
use crate::arena::{Arena, InsnId};
use crate::model::{
    BinOp, Code, ConstantPool, InsnKind, InvokeKind, PoolError, iterate::post_order,
    signature::parameter_descriptors,
};
use tracing::trace;

const STRING: &str = "Ljava/lang/String;";

struct Operand {
    id: InsnId,
    is_string: bool,
}

pub fn reconstruct(cx: &mut PassContext<'_>, code: &mut Code) -> Result<(), MethodAnalysisError> {
    let Code {
        arena, fast_nodes, ..
    } = code;

    for id in post_order(arena, fast_nodes) {
        let Some(operands) = concatenation(cx.pool(), arena, id)? else {
            continue;
        };

        let needs_prefix = match &operands[..] {
            [] => true,
            [first] => !first.is_string,
            [first, second, ..] => !first.is_string && !second.is_string,
        };
        let mut operands: Vec<InsnId> = operands.into_iter().map(|operand| operand.id).collect();
        if needs_prefix {
            let empty = cx.pool_mut().add_string("")?;
            operands.insert(0, arena.alloc_at(id, InsnKind::Ldc { index: empty }));
        }

        let kind = match &operands[..] {
            [single] => arena[*single].kind.clone(),
            [first, rest @ .., last] => {
                let lhs = rest.iter().fold(*first, |lhs, rhs| {
                    arena.alloc_at(
                        id,
                        InsnKind::BinaryOp {
                            op: BinOp::Add,
                            lhs,
                            rhs: *rhs,
                        },
                    )
                });
                InsnKind::BinaryOp {
                    op: BinOp::Add,
                    lhs,
                    rhs: *last,
                }
            }
            [] => continue,
        };
        arena.replace_kind(id, kind);
        trace!("Folded a string concatenation at offset {}", arena[id].offset);
    }
    Ok(())
}

fn is_builder(class_name: &str) -> bool {
    matches!(class_name, "java/lang/StringBuilder" | "java/lang/StringBuffer")
}

/// Recognizes `builder.toString()` and returns the concatenated operands in source order.
fn concatenation(
    pool: &ConstantPool,
    arena: &Arena,
    id: InsnId,
) -> Result<Option<Vec<Operand>>, PoolError> {
    let InsnKind::Invoke {
        kind: InvokeKind::Virtual,
        index,
        object: Some(mut object),
        ref args,
    } = arena[id].kind
    else {
        return Ok(None);
    };
    let member = pool.member_ref(index)?;
    if !args.is_empty() || !is_builder(member.class_name) || member.name != "toString" {
        return Ok(None);
    }

    let mut operands = Vec::new();
    loop {
        match arena[object].kind {
            InsnKind::Invoke {
                kind: InvokeKind::Virtual,
                index,
                object: Some(inner),
                ref args,
            } => {
                let member = pool.member_ref(index)?;
                let [arg] = args[..] else {
                    return Ok(None);
                };
                if !is_builder(member.class_name) || member.name != "append" {
                    return Ok(None);
                }
                operands.push(Operand {
                    id: arg,
                    is_string: parameter_descriptors(member.descriptor) == [STRING],
                });
                object = inner;
            }
            InsnKind::InvokeNew { index, ref args } => {
                let member = pool.member_ref(index)?;
                if !is_builder(member.class_name) || member.name != "<init>" {
                    return Ok(None);
                }
                match (member.descriptor, &args[..]) {
                    ("()V", []) => {}
                    ("(Ljava/lang/String;)V", [arg]) => {
                        operands.push(initial_operand(pool, arena, *arg)?);
                    }
                    _ => return Ok(None),
                }
                break;
            }
            _ => return Ok(None),
        }
    }
    operands.reverse();
    Ok(Some(operands))
}

/// The operand passed to the builder constructor, unwrapping `String.valueOf(x)`.
fn initial_operand(pool: &ConstantPool, arena: &Arena, id: InsnId) -> Result<Operand, PoolError> {
    if let InsnKind::Invoke {
        kind: InvokeKind::Static,
        index,
        object: None,
        ref args,
    } = arena[id].kind
        && let [arg] = args[..]
    {
        let member = pool.member_ref(index)?;
        if member.class_name == "java/lang/String" && member.name == "valueOf" {
            return Ok(Operand {
                id: arg,
                is_string: parameter_descriptors(member.descriptor) == [STRING],
            });
        }
    }
    Ok(Operand {
        id,
        is_string: true,
    })
}
