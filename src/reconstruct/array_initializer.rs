// `new int[] { a, b }` compiles to an allocation followed by one store per element:
//
//     dup := new int[2];  dup[0] = a;  dup[1] = b;  ... dup ...
//
// Nested initializers are folded inner-first by the backward scan, so by the time an outer array is
// matched, its element values are already `InitArray`s.

use super::{PassContext, Splice, dup_loads, is_dup_load_of};
use crate::MethodAnalysisError;
use crate::arena::{Arena, InsnId};
use crate::model::{Code, InsnKind};
use tracing::trace;

pub fn reconstruct(_cx: &mut PassContext<'_>, code: &mut Code) -> Result<(), MethodAnalysisError> {
    let Code {
        arena, fast_nodes, ..
    } = code;
    let mut splice = Splice::new(fast_nodes);

    for position in (0..fast_nodes.len()).rev() {
        if splice.is_live(position) {
            fold(arena, fast_nodes, &mut splice, position);
        }
    }

    splice.apply(fast_nodes);
    Ok(())
}

fn fold(arena: &mut Arena, list: &[InsnId], splice: &mut Splice, position: usize) {
    let store = list[position];
    let InsnKind::DupStore { value: new_array } = arena[store].kind else {
        return;
    };
    let (InsnKind::NewArray { length, .. } | InsnKind::ANewArray { length, .. }) =
        arena[new_array].kind
    else {
        return;
    };
    let InsnKind::IConst(length) = arena[length].kind else {
        return;
    };
    let Ok(length) = usize::try_from(length) else {
        return;
    };
    // Every element needs a store of its own after the allocation.
    if length == 0 || length > list.len() - position - 1 {
        return;
    }

    let mut values = Vec::with_capacity(length);
    let mut element_positions = Vec::with_capacity(length);
    let mut current = position;
    while values.len() < length {
        let Some(next) = splice.next(current) else {
            return;
        };
        let InsnKind::ArrayStore {
            array,
            index,
            value,
            ..
        } = arena[list[next]].kind
        else {
            return;
        };
        if !is_dup_load_of(arena, array, store)
            || !matches!(arena[index].kind, InsnKind::IConst(k) if usize::try_from(k) == Ok(values.len()))
        {
            return;
        }
        values.push(value);
        element_positions.push(next);
        current = next;
    }

    let uses: Vec<(usize, InsnId)> = dup_loads(arena, list, splice, store)
        .into_iter()
        .filter(|(position, _)| !element_positions.contains(position))
        .collect();
    let [(_, use_)] = uses[..] else {
        return;
    };

    arena.replace_kind(use_, InsnKind::InitArray { new_array, values });
    splice.remove(position);
    for element in element_positions {
        splice.remove(element);
    }
    trace!("Folded an array initializer at offset {}", arena[store].offset);
}
