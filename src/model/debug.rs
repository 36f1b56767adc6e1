use super::{IncPosition, InsnKind, Instruction};
use crate::arena::{Arena, InsnId};
use core::fmt;

// A compact, pool-index based rendering of instruction trees for diagnostics and test failures.
// Constant pool references are printed as `#index`; resolving them is the printer's business.

pub trait DebugIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, arena: &Arena) -> fmt::Result;
}

impl<T: DebugIr + ?Sized> DebugIr for &T {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, arena: &Arena) -> fmt::Result {
        T::fmt(self, f, arena)
    }
}

impl DebugIr for [InsnId] {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, arena: &Arena) -> fmt::Result {
        for stmt in self {
            writeln!(f, "{}", arena.debug(stmt))?;
        }
        Ok(())
    }
}

impl DebugIr for Vec<InsnId> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, arena: &Arena) -> fmt::Result {
        DebugIr::fmt(self.as_slice(), f, arena)
    }
}

impl DebugIr for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, arena: &Arena) -> fmt::Result {
        DebugIr::fmt(&arena[*self], f, arena)
    }
}

fn d<'a>(arena: &'a Arena, id: &'a InsnId) -> impl fmt::Display + 'a {
    arena.debug(id)
}

fn list(f: &mut fmt::Formatter<'_>, arena: &Arena, items: &[InsnId]) -> fmt::Result {
    if let Some(first) = items.first() {
        write!(f, "{}", arena.debug(first))?;
        for item in &items[1..] {
            write!(f, ", {}", arena.debug(item))?;
        }
    }
    Ok(())
}

fn block(f: &mut fmt::Formatter<'_>, arena: &Arena, body: &[InsnId]) -> fmt::Result {
    writeln!(f, "{{")?;
    DebugIr::fmt(body, f, arena)?;
    write!(f, "}}")
}

impl DebugIr for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, arena: &Arena) -> fmt::Result {
        match &self.kind {
            InsnKind::Load { index, .. } => write!(f, "local{index}"),
            InsnKind::ExceptionLoad { class_index } => write!(f, "exception #{class_index}"),
            InsnKind::IConst(n) => write!(f, "{n}"),
            InsnKind::LConst(n) => write!(f, "{n}L"),
            InsnKind::FConst(n) => write!(f, "{n}F"),
            InsnKind::DConst(n) => write!(f, "{n}D"),
            InsnKind::AConstNull => write!(f, "null"),
            InsnKind::Ldc { index } => write!(f, "ldc #{index}"),
            InsnKind::GetStatic { index } => write!(f, "static #{index}"),
            InsnKind::GetField { index, object } => write!(f, "({}).#{index}", d(arena, object)),
            InsnKind::ArrayLoad { array, index, .. } => write!(f, "({})[{}]", d(arena, array), d(arena, index)),
            InsnKind::ArrayLength { array } => write!(f, "({}).length", d(arena, array)),
            InsnKind::BinaryOp { op, lhs, rhs } => write!(f, "({}) {op} ({})", d(arena, lhs), d(arena, rhs)),
            InsnKind::UnaryOp { op, value } => write!(f, "{op}({})", d(arena, value)),
            InsnKind::Convert { to, value } => write!(f, "({to})({})", d(arena, value)),
            InsnKind::CheckCast {
                class_index,
                object,
            } => write!(f, "(#{class_index})({})", d(arena, object)),
            InsnKind::InstanceOf {
                class_index,
                object,
            } => write!(f, "({}) instanceof #{class_index}", d(arena, object)),
            InsnKind::Invoke {
                kind,
                index,
                object,
                args,
            } => {
                if let Some(object) = object {
                    write!(f, "({}).", d(arena, object))?;
                }
                write!(f, "{kind} #{index}(")?;
                list(f, arena, args)?;
                write!(f, ")")
            }
            InsnKind::New { class_index } => write!(f, "new uninitialized #{class_index}"),
            InsnKind::InvokeNew { index, args } => {
                write!(f, "new #{index}(")?;
                list(f, arena, args)?;
                write!(f, ")")
            }
            InsnKind::NewArray { ty, length } => write!(f, "new {ty}[{}]", d(arena, length)),
            InsnKind::ANewArray {
                class_index,
                length,
            } => write!(f, "new #{class_index}[{}]", d(arena, length)),
            InsnKind::MultiANewArray {
                class_index,
                dimensions,
            } => {
                write!(f, "new #{class_index}")?;
                for dimension in dimensions {
                    write!(f, "[{}]", d(arena, dimension))?;
                }
                Ok(())
            }
            InsnKind::InitArray { new_array, values } => {
                write!(f, "{} {{", d(arena, new_array))?;
                list(f, arena, values)?;
                write!(f, "}}")
            }
            InsnKind::DupStore { value } => write!(f, "dup{} := {}", self.offset, d(arena, value)),
            InsnKind::DupLoad { store } => write!(f, "dup{}", arena[*store].offset),
            InsnKind::OuterThis { class_index } => write!(f, "#{class_index}.this"),
            InsnKind::Ternary {
                condition,
                branches: [if_true, if_false],
            } => write!(
                f,
                "({}) ? ({}) : ({})",
                d(arena, condition),
                d(arena, if_true),
                d(arena, if_false)
            ),
            InsnKind::TernaryOpStore {
                value,
                second_value_offset,
            } => write!(f, "ternary {} | @{second_value_offset}", d(arena, value)),
            InsnKind::Assignment { op, target, value } => {
                write!(f, "{} {op} {}", d(arena, target), d(arena, value))
            }
            InsnKind::Inc {
                position,
                target,
                delta,
            } => {
                let op = if *delta > 0 { "++" } else { "--" };
                match position {
                    IncPosition::Pre => write!(f, "{op}{}", d(arena, target)),
                    IncPosition::Post => write!(f, "{}{op}", d(arena, target)),
                }
            }
            InsnKind::If { cmp, value, target } => {
                write!(f, "if (({}) {cmp} 0) goto @{target}", d(arena, value))
            }
            InsnKind::IfCmp {
                cmp,
                lhs,
                rhs,
                target,
            } => write!(f, "if (({}) {cmp} ({})) goto @{target}", d(arena, lhs), d(arena, rhs)),
            InsnKind::IfNull { cmp, value, target } => {
                write!(f, "if (({}) {cmp} null) goto @{target}", d(arena, value))
            }
            InsnKind::Goto { target } => write!(f, "goto @{target}"),
            InsnKind::Switch {
                key,
                default,
                cases,
            } => {
                write!(f, "switch ({}) ", d(arena, key))?;
                for (value, target) in cases {
                    write!(f, "{value} -> @{target}, ")?;
                }
                write!(f, "default -> @{default}")
            }
            InsnKind::Store { index, value, .. } => write!(f, "local{index} = {}", d(arena, value)),
            InsnKind::PutStatic { index, value } => write!(f, "static #{index} = {}", d(arena, value)),
            InsnKind::PutField {
                index,
                object,
                value,
            } => write!(f, "({}).#{index} = {}", d(arena, object), d(arena, value)),
            InsnKind::ArrayStore {
                array,
                index,
                value,
                ..
            } => write!(f, "({})[{}] = {}", d(arena, array), d(arena, index), d(arena, value)),
            InsnKind::IInc { index, delta } => write!(f, "local{index} += {delta}"),
            InsnKind::Pop { value } => write!(f, "{};", d(arena, value)),
            InsnKind::Return => write!(f, "return;"),
            InsnKind::XReturn { value } => write!(f, "return {};", d(arena, value)),
            InsnKind::AThrow { value } => write!(f, "throw {};", d(arena, value)),
            InsnKind::MonitorEnter { object } => write!(f, "lock {};", d(arena, object)),
            InsnKind::MonitorExit { object } => write!(f, "unlock {};", d(arena, object)),
            InsnKind::FastIf {
                condition,
                then,
                else_,
            } => {
                write!(f, "if [{}] ", d(arena, condition))?;
                block(f, arena, then)?;
                if !else_.is_empty() {
                    write!(f, " else ")?;
                    block(f, arena, else_)?;
                }
                Ok(())
            }
            InsnKind::FastWhile { condition, body } => {
                write!(f, "while [{}] ", d(arena, condition))?;
                block(f, arena, body)
            }
            InsnKind::FastDoWhile { condition, body } => {
                write!(f, "do ")?;
                block(f, arena, body)?;
                write!(f, " while [{}];", d(arena, condition))
            }
            InsnKind::FastFor {
                init,
                condition,
                update,
                body,
            } => {
                write!(f, "for ({}; [{}]; {}) ", d(arena, init), d(arena, condition), d(arena, update))?;
                block(f, arena, body)
            }
            InsnKind::FastInfiniteLoop { body } => {
                write!(f, "loop ")?;
                block(f, arena, body)
            }
            InsnKind::FastSwitch { key, arms } => {
                writeln!(f, "switch ({}) {{", d(arena, key))?;
                for arm in arms {
                    for value in &arm.values {
                        write!(f, "case {value}: ")?;
                    }
                    if arm.is_default {
                        write!(f, "default: ")?;
                    }
                    block(f, arena, &arm.body)?;
                    writeln!(f)?;
                }
                write!(f, "}}")
            }
            InsnKind::FastTry {
                body,
                catches,
                finally,
            } => {
                write!(f, "try ")?;
                block(f, arena, body)?;
                for catch in catches {
                    write!(f, " catch (#{} local{}) ", catch.class_index, catch.local_index)?;
                    block(f, arena, &catch.body)?;
                }
                if !finally.is_empty() {
                    write!(f, " finally ")?;
                    block(f, arena, finally)?;
                }
                Ok(())
            }
            InsnKind::FastDeclaration { index, value } => match value {
                Some(value) => write!(f, "var local{index} = {};", d(arena, value)),
                None => write!(f, "var local{index};"),
            },
            InsnKind::FastBreak => write!(f, "break;"),
            InsnKind::FastContinue => write!(f, "continue;"),
        }
    }
}
