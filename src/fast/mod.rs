//! Structuring of the flat statement list into nested fast statements.
//!
//! The reconstructed list still contains raw branches addressing bytecode offsets. The builder
//! recovers `if`/`else`, the loop forms, `switch` and `try` from those offsets and from the
//! exception table, replaces jumps out of loops and switches with `break` and `continue`, and marks
//! the first store to every local variable as its declaration. A few cosmetic cleanups follow.

mod builder;
mod declarations;

use self::builder::Builder;
use self::declarations::declare_locals;
use crate::arena::{Arena, InsnId};
use crate::config::Config;
use crate::model::{ClassFile, Code, InsnKind, InvokeKind, Method, PoolError, signature};
use crate::{MethodAnalysisError, flag_method};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FastBuildError {
    #[error("Exception handler at offset {handler_pc} lies outside of the enclosing block")]
    HandlerOutOfRange { handler_pc: u32 },

    #[error("Exception handler at offset {handler_pc} lies inside the block it protects")]
    HandlerInsideBody { handler_pc: u32 },
}

/// Structures the body of every method of `class` that earlier stages did not flag.
pub fn build_fast_instructions(class: &mut ClassFile, config: &Config) {
    for index in 0..class.methods.len() {
        if class.methods[index].contains_error {
            continue;
        }
        let Some(mut code) = class.methods[index].code.take() else {
            continue;
        };
        let result = build_method(class, &class.methods[index], &mut code, config);
        class.methods[index].code = Some(code);
        if let Err(error) = result {
            flag_method(class, index, &error);
        }
    }
}

fn build_method(
    class: &ClassFile,
    method: &Method,
    code: &mut Code,
    config: &Config,
) -> Result<(), MethodAnalysisError> {
    let descriptor = class.method_descriptor(method)?;
    debug!("Structuring {}{descriptor}", class.method_name(method)?);

    let Code {
        arena,
        fast_nodes,
        exception_handlers,
        max_locals,
        ..
    } = code;
    let mut list = Builder::new(arena, fast_nodes, exception_handlers, *max_locals).build()?;

    if config.remove_default_super_call && method.is_constructor(&class.constant_pool) {
        remove_default_super_call(class, arena, &mut list)?;
    }
    if config.remove_trailing_return
        && list
            .last()
            .is_some_and(|stmt| matches!(arena[*stmt].kind, InsnKind::Return))
    {
        list.pop();
    }

    declare_locals(arena, &list, first_local(method.access_flags.is_static(), descriptor));
    *fast_nodes = list;
    Ok(())
}

/// The first slot past `this` and the parameters.
fn first_local(is_static: bool, descriptor: &str) -> u16 {
    let parameters: usize = signature::parameter_descriptors(descriptor)
        .into_iter()
        .map(|parameter| if matches!(parameter, "J" | "D") { 2 } else { 1 })
        .sum();
    u16::try_from(parameters + usize::from(!is_static)).unwrap_or(u16::MAX)
}

fn remove_default_super_call(
    class: &ClassFile,
    arena: &Arena,
    list: &mut Vec<InsnId>,
) -> Result<(), PoolError> {
    let Some(super_name) = class.super_name()? else {
        return Ok(());
    };
    let Some(position) = list.iter().position(|stmt| {
        let InsnKind::Invoke {
            kind: InvokeKind::Special,
            index,
            object: Some(object),
            ref args,
        } = arena[*stmt].kind
        else {
            return false;
        };
        args.is_empty()
            && matches!(arena[object].kind, InsnKind::Load { index: 0, .. })
            && class.constant_pool.member_ref(index).is_ok_and(|callee| {
                callee.name == "<init>" && callee.class_name == super_name
            })
    }) else {
        return Ok(());
    };
    list.remove(position);
    Ok(())
}
