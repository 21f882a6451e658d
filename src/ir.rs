/// Intermediate representation for a parsed JVM class.
#[derive(Clone, Debug)]
pub(crate) struct Class {
    /// Internal (slash-separated) class name.
    pub(crate) name: String,
    pub(crate) methods: Vec<Method>,
    pub(crate) artifact_index: i64,
}

/// A method body and the member references it makes.
#[derive(Clone, Debug)]
pub(crate) struct Method {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) line_numbers: Vec<LineNumber>,
    pub(crate) references: Vec<MemberRef>,
}

impl Method {
    /// Line of the method itself: the LineNumberTable entry with the lowest `start_pc`.
    pub(crate) fn first_line(&self) -> Option<u32> {
        self.line_numbers
            .iter()
            .min_by_key(|entry| entry.start_pc)
            .map(|entry| entry.line)
    }
}

/// LineNumberTable entry, sorted by `start_pc`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct LineNumber {
    pub(crate) start_pc: u32,
    pub(crate) line: u32,
}

/// Method or field reference extracted from bytecode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MemberRef {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) kind: RefKind,
    pub(crate) offset: u32,
}

/// Instruction family that produced a reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RefKind {
    Invoke(CallKind),
    Field(FieldOp),
}

impl RefKind {
    /// JVM mnemonic of the instruction.
    pub(crate) fn mnemonic(self) -> &'static str {
        match self {
            RefKind::Invoke(CallKind::Virtual) => "invokevirtual",
            RefKind::Invoke(CallKind::Interface) => "invokeinterface",
            RefKind::Invoke(CallKind::Special) => "invokespecial",
            RefKind::Invoke(CallKind::Static) => "invokestatic",
            RefKind::Field(FieldOp::GetStatic) => "getstatic",
            RefKind::Field(FieldOp::PutStatic) => "putstatic",
            RefKind::Field(FieldOp::GetField) => "getfield",
            RefKind::Field(FieldOp::PutField) => "putfield",
        }
    }
}

/// Call opcode classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum CallKind {
    Virtual,
    Interface,
    Special,
    Static,
}

/// Field access opcode classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum FieldOp {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}
