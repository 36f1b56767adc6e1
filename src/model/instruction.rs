use crate::arena::InsnId;
use core::fmt::{self, Display};
use displaydoc::Display;

/// A single node of a method body. Raw nodes mirror bytecode operations after the stack has been
/// folded into expression trees; synthesized nodes are produced by the reconstructors and the fast
/// instruction builder.
///
/// `offset` and `line_number` always describe the bytecode the node originates from, and
/// synthesized nodes inherit them from the node they replace.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub offset: u32,
    pub line_number: Option<u32>,
    pub kind: InsnKind,
}

impl Instruction {
    pub fn new(offset: u32, line_number: Option<u32>, kind: InsnKind) -> Self {
        Self {
            offset,
            line_number,
            kind,
        }
    }
}

#[derive(Clone, Debug)]
pub enum InsnKind {
    // Values
    Load {
        ty: ValueType,
        index: u16,
    },
    /// The exception object at the start of a catch handler. `class_index` is 0 for catch-any.
    ExceptionLoad {
        class_index: u16,
    },
    IConst(i32),
    LConst(i64),
    FConst(f32),
    DConst(f64),
    AConstNull,
    /// `Integer`, `Float`, `String` or `Class` constant.
    Ldc {
        index: u16,
    },
    GetStatic {
        index: u16,
    },
    GetField {
        index: u16,
        object: InsnId,
    },
    ArrayLoad {
        ty: ValueType,
        array: InsnId,
        index: InsnId,
    },
    ArrayLength {
        array: InsnId,
    },
    BinaryOp {
        op: BinOp,
        lhs: InsnId,
        rhs: InsnId,
    },
    UnaryOp {
        op: UnaryOp,
        value: InsnId,
    },
    Convert {
        to: ValueType,
        value: InsnId,
    },
    CheckCast {
        class_index: u16,
        object: InsnId,
    },
    InstanceOf {
        class_index: u16,
        object: InsnId,
    },
    Invoke {
        kind: InvokeKind,
        index: u16,
        // `None` for static calls
        object: Option<InsnId>,
        args: Vec<InsnId>,
    },
    New {
        class_index: u16,
    },
    /// `new C(args)`; `index` is the `Methodref` of the constructor.
    InvokeNew {
        index: u16,
        args: Vec<InsnId>,
    },
    NewArray {
        ty: ValueType,
        length: InsnId,
    },
    ANewArray {
        class_index: u16,
        length: InsnId,
    },
    MultiANewArray {
        class_index: u16,
        dimensions: Vec<InsnId>,
    },
    /// `new T[] { values }`
    InitArray {
        new_array: InsnId,
        values: Vec<InsnId>,
    },
    /// Captures a duplicated stack value once. Referenced by `DupLoad`s through its own ID.
    DupStore {
        value: InsnId,
    },
    DupLoad {
        store: InsnId,
    },
    /// `Outer.this`; `class_index` names the outer class.
    OuterThis {
        class_index: u16,
    },
    Ternary {
        condition: InsnId,
        branches: [InsnId; 2], // [if_true, if_false]
    },
    /// The first operand of a not yet reconstructed `?:`, left on the stack across a `goto`. The
    /// second operand is the node at `second_value_offset` inside the statement after the `goto`.
    TernaryOpStore {
        value: InsnId,
        second_value_offset: u32,
    },
    Assignment {
        op: AssignOp,
        target: InsnId,
        value: InsnId,
    },
    Inc {
        position: IncPosition,
        target: InsnId,
        delta: i32,
    },

    // Branches. When used as a condition of a synthesized node, `target` is meaningless.
    If {
        cmp: CmpOp,
        value: InsnId,
        target: u32,
    },
    IfCmp {
        cmp: CmpOp,
        lhs: InsnId,
        rhs: InsnId,
        target: u32,
    },
    IfNull {
        cmp: CmpOp,
        value: InsnId,
        target: u32,
    },
    Goto {
        target: u32,
    },
    Switch {
        key: InsnId,
        default: u32,
        cases: Vec<(i32, u32)>,
    },

    // Statements
    Store {
        ty: ValueType,
        index: u16,
        value: InsnId,
    },
    PutStatic {
        index: u16,
        value: InsnId,
    },
    PutField {
        index: u16,
        object: InsnId,
        value: InsnId,
    },
    ArrayStore {
        ty: ValueType,
        array: InsnId,
        index: InsnId,
        value: InsnId,
    },
    IInc {
        index: u16,
        delta: i32,
    },
    Pop {
        value: InsnId,
    },
    Return,
    XReturn {
        value: InsnId,
    },
    AThrow {
        value: InsnId,
    },
    MonitorEnter {
        object: InsnId,
    },
    MonitorExit {
        object: InsnId,
    },

    // Fast (structured) statements
    FastIf {
        condition: InsnId,
        then: Vec<InsnId>,
        else_: Vec<InsnId>,
    },
    FastWhile {
        condition: InsnId,
        body: Vec<InsnId>,
    },
    FastDoWhile {
        condition: InsnId,
        body: Vec<InsnId>,
    },
    FastFor {
        init: InsnId,
        condition: InsnId,
        update: InsnId,
        body: Vec<InsnId>,
    },
    FastInfiniteLoop {
        body: Vec<InsnId>,
    },
    FastSwitch {
        key: InsnId,
        arms: Vec<SwitchArm>,
    },
    FastTry {
        body: Vec<InsnId>,
        catches: Vec<FastCatch>,
        finally: Vec<InsnId>,
    },
    /// The first store to a local variable slot.
    FastDeclaration {
        index: u16,
        value: Option<InsnId>,
    },
    FastBreak,
    FastContinue,
}

impl InsnKind {
    /// The jump target of a raw branch.
    pub fn branch_target(&self) -> Option<u32> {
        match *self {
            Self::If { target, .. }
            | Self::IfCmp { target, .. }
            | Self::IfNull { target, .. }
            | Self::Goto { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_conditional_branch(&self) -> bool {
        matches!(self, Self::If { .. } | Self::IfCmp { .. } | Self::IfNull { .. })
    }

    /// Whether control never falls through to the next statement.
    pub fn is_divergent(&self) -> bool {
        matches!(
            self,
            Self::Goto { .. }
                | Self::Return
                | Self::XReturn { .. }
                | Self::AThrow { .. }
                | Self::FastBreak
                | Self::FastContinue
        )
    }

    /// Inverts the comparison of a conditional branch in place.
    pub fn negate_condition(&mut self) {
        if let Self::If { cmp, .. } | Self::IfCmp { cmp, .. } | Self::IfNull { cmp, .. } = self {
            *cmp = cmp.negate();
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// int
    Int,
    /// long
    Long,
    /// float
    Float,
    /// double
    Double,
    /// Object
    Reference,
    /// byte
    Byte,
    /// char
    Char,
    /// short
    Short,
    /// boolean
    Boolean,
}

impl ValueType {
    /// Maps a field or method descriptor to a value type, ignoring array dimensions.
    pub fn from_descriptor(descriptor: &str) -> Self {
        match descriptor.as_bytes().first() {
            Some(b'I') => Self::Int,
            Some(b'J') => Self::Long,
            Some(b'F') => Self::Float,
            Some(b'D') => Self::Double,
            Some(b'B') => Self::Byte,
            Some(b'C') => Self::Char,
            Some(b'S') => Self::Short,
            Some(b'Z') => Self::Boolean,
            _ => Self::Reference,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
    /// `lcmp`, `fcmpl` and friends.
    Compare,
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::Div => write!(f, "/"),
            Self::Rem => write!(f, "%"),
            Self::And => write!(f, "&"),
            Self::Or => write!(f, "|"),
            Self::Xor => write!(f, "^"),
            Self::Shl => write!(f, "<<"),
            Self::Shr => write!(f, ">>"),
            Self::UShr => write!(f, ">>>"),
            Self::Compare => write!(f, "<=>"),
        }
    }
}

impl BinOp {
    /// Whether `a = a op b` can be written as `a op= b`.
    pub fn has_compound_form(self) -> bool {
        !matches!(self, Self::Compare)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neg => write!(f, "-"),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// ==
    Eq,
    /// !=
    Ne,
    /// <
    Lt,
    /// >=
    Ge,
    /// >
    Gt,
    /// <=
    Le,
}

impl CmpOp {
    pub fn negate(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Ge => Self::Lt,
            Self::Gt => Self::Le,
            Self::Le => Self::Gt,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    Compound(BinOp),
}

impl Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign => write!(f, "="),
            Self::Compound(op) => write!(f, "{op}="),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// invokestatic
    Static,
    /// invokevirtual
    Virtual,
    /// invokespecial
    Special,
    /// invokeinterface
    Interface,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IncPosition {
    Pre,
    Post,
}

#[derive(Clone, Debug)]
pub struct SwitchArm {
    // Empty for the `default` arm
    pub values: Vec<i32>,
    pub is_default: bool,
    pub body: Vec<InsnId>,
}

#[derive(Clone, Debug)]
pub struct FastCatch {
    // 0 for catch-any
    pub class_index: u16,
    pub local_index: u16,
    pub body: Vec<InsnId>,
}
