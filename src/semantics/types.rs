//! Shared compile-time types: value types, segments, instructions and
//! the symbol tables that make up a compilation result.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of an addressable memory cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// Heap-allocated string
    Str,
    /// Boolean
    Bool,
    /// Address of another cell, resolved at runtime
    Pointer,
}

impl ValueType {
    /// All cell types, in the order segments lay out their sub-ranges
    pub const ALL: [ValueType; 5] = [
        ValueType::Int,
        ValueType::Float,
        ValueType::Str,
        ValueType::Bool,
        ValueType::Pointer,
    ];
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "string",
            ValueType::Bool => "bool",
            ValueType::Pointer => "pointer",
        };
        write!(f, "{}", name)
    }
}

/// Declared return type of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    /// No return value
    Void,
    /// Integer return
    Int,
    /// Float return
    Float,
    /// String return
    Str,
    /// Boolean return
    Bool,
}

impl ReturnType {
    /// The cell type a non-void return occupies, if any
    pub fn as_value_type(self) -> Option<ValueType> {
        match self {
            ReturnType::Void => None,
            ReturnType::Int => Some(ValueType::Int),
            ReturnType::Float => Some(ValueType::Float),
            ReturnType::Str => Some(ValueType::Str),
            ReturnType::Bool => Some(ValueType::Bool),
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_value_type() {
            Some(vt) => write!(f, "{}", vt),
            None => write!(f, "void"),
        }
    }
}

/// Memory segment, in program-lifetime order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    /// Program-lifetime storage, one instance
    Global,
    /// Per-activation named variables
    Local,
    /// Per-activation expression intermediates
    Temporal,
    /// Read-only literal storage, frozen after compilation
    Constant,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Segment::Global => "global",
            Segment::Local => "local",
            Segment::Temporal => "temporal",
            Segment::Constant => "constant",
        };
        write!(f, "{}", name)
    }
}

/// Binary operator, as pushed on the operator stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `=`
    Assign,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Assign => "=",
        };
        write!(f, "{}", text)
    }
}

/// Quadruple operation code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Addition (also string concatenation)
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division, always float
    Div,
    /// Less than
    Lt,
    /// Greater than
    Gt,
    /// Less or equal
    Le,
    /// Greater or equal
    Ge,
    /// Equality
    Eq,
    /// Inequality
    Ne,
    /// Logical and
    And,
    /// Logical or
    Or,
    /// Assignment: copy `lhs` into `result`
    Assign,
    /// Unconditional jump to `result`
    Goto,
    /// Jump to `result` when `lhs` is false
    GotoF,
    /// Jump to `result` when `lhs` is true
    GotoT,
    /// Jump into the render body
    GotoRender,
    /// Stage an activation record for the function named at `lhs`
    Era,
    /// Copy argument `lhs` into staged parameter slot `result`
    Param,
    /// Activate the staged record, jumping to `result`
    Gosub,
    /// Tear down the active frame and resume the caller
    EndFunc,
    /// Copy `result` into the return slot, then tear down the frame
    Return,
    /// Bounds-check index `lhs` against the literal bound at `result`
    Verify,
    /// Append the value at `lhs` to the print log
    Print,
    /// Emit a render operation (tag id in `lhs`)
    RenderOp,
    /// Halt execution
    EndProg,
}

impl From<Operator> for Operation {
    fn from(op: Operator) -> Self {
        match op {
            Operator::Add => Operation::Add,
            Operator::Sub => Operation::Sub,
            Operator::Mul => Operation::Mul,
            Operator::Div => Operation::Div,
            Operator::Lt => Operation::Lt,
            Operator::Gt => Operation::Gt,
            Operator::Le => Operation::Le,
            Operator::Ge => Operation::Ge,
            Operator::Eq => Operation::Eq,
            Operator::Ne => Operation::Ne,
            Operator::And => Operation::And,
            Operator::Or => Operation::Or,
            Operator::Assign => Operation::Assign,
        }
    }
}

/// Virtual address, or the `-1` "no operand" sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Addr(pub i32);

impl Addr {
    /// The "no operand" sentinel
    pub const NONE: Addr = Addr(-1);

    /// True when this slot carries no address
    pub fn is_none(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One quadruple: operation plus up to three address fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Operation code
    pub operation: Operation,
    /// Left operand address
    pub lhs: Addr,
    /// Right operand address
    pub rhs: Addr,
    /// Result address or jump target
    pub result: Addr,
}

impl Instruction {
    /// Builds a quadruple
    pub fn new(operation: Operation, lhs: Addr, rhs: Addr, result: Addr) -> Self {
        Instruction {
            operation,
            lhs,
            rhs,
            result,
        }
    }
}

/// What a variable entry stands for beyond a plain scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VarKind {
    /// One-dimensional array
    Array,
    /// Two-dimensional matrix
    Matrix,
    /// Global slot holding a function's return value
    FuncReturn,
}

/// Variable table entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarEntry {
    /// Declared element type
    pub value_type: ValueType,
    /// Array/matrix/return-slot marker, `None` for scalars
    pub kind: Option<VarKind>,
    /// Declared dimension sizes, empty for scalars
    pub dims: Vec<usize>,
    /// Base virtual address
    pub addr: Addr,
}

impl VarEntry {
    /// Total number of cells the entry occupies
    pub fn cell_count(&self) -> usize {
        self.dims.iter().product::<usize>().max(1)
    }
}

/// Per-type cell counts for one segment instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSizes {
    /// Integer cells
    pub ints: usize,
    /// Float cells
    pub floats: usize,
    /// String cells
    pub strings: usize,
    /// Boolean cells
    pub bools: usize,
    /// Pointer cells
    pub pointers: usize,
}

impl SegmentSizes {
    /// Same capacity for every type
    pub fn uniform(cells: usize) -> Self {
        SegmentSizes {
            ints: cells,
            floats: cells,
            strings: cells,
            bools: cells,
            pointers: cells,
        }
    }

    /// Capacity recorded for one type
    pub fn get(&self, vt: ValueType) -> usize {
        match vt {
            ValueType::Int => self.ints,
            ValueType::Float => self.floats,
            ValueType::Str => self.strings,
            ValueType::Bool => self.bools,
            ValueType::Pointer => self.pointers,
        }
    }

    /// Sets the capacity for one type
    pub fn set(&mut self, vt: ValueType, cells: usize) {
        match vt {
            ValueType::Int => self.ints = cells,
            ValueType::Float => self.floats = cells,
            ValueType::Str => self.strings = cells,
            ValueType::Bool => self.bools = cells,
            ValueType::Pointer => self.pointers = cells,
        }
    }
}

/// Memory footprint of one activation record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    /// Named locals (parameters first)
    pub local: SegmentSizes,
    /// Expression intermediates
    pub temporal: SegmentSizes,
}

/// Function table entry
///
/// The reserved `global` entry records the global segment footprint in
/// `size.local`; its other optional fields stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncEntry {
    /// Declared return type
    pub return_type: ReturnType,
    /// Parameter types in declaration order
    pub params: Vec<ValueType>,
    /// Per-function variable table, dropped when the body ends
    pub vars: Option<HashMap<String, VarEntry>>,
    /// Index of the first body instruction
    pub func_start: Option<usize>,
    /// Frame footprint, recorded when the body ends
    pub size: Option<FrameSize>,
    /// Global slot the return value is copied into
    pub return_addr: Option<Addr>,
}

impl FuncEntry {
    /// Fresh entry with an open variable table
    pub fn new(return_type: ReturnType) -> Self {
        FuncEntry {
            return_type,
            params: Vec::new(),
            vars: Some(HashMap::new()),
            func_start: None,
            size: None,
            return_addr: None,
        }
    }
}

/// Function directory, keyed by name
pub type FuncTable = HashMap<String, FuncEntry>;

/// Literal directory: lexeme text to constant-segment address
pub type LiteralTable = HashMap<String, Addr>;

/// The serializable compilation artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationOutput {
    /// Function directory
    pub func_table: FuncTable,
    /// Literal directory
    pub literal_table: LiteralTable,
    /// Quadruple stream
    pub quadruples: Vec<Instruction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_display() {
        assert_eq!(ValueType::Str.to_string(), "string");
        assert_eq!(ValueType::Pointer.to_string(), "pointer");
    }

    #[test]
    fn test_addr_sentinel() {
        assert!(Addr::NONE.is_none());
        assert!(!Addr(0).is_none());
    }

    #[test]
    fn test_segment_sizes_roundtrip() {
        let mut sizes = SegmentSizes::default();
        sizes.set(ValueType::Float, 7);
        assert_eq!(sizes.get(ValueType::Float), 7);
        assert_eq!(sizes.get(ValueType::Int), 0);
    }

    #[test]
    fn test_var_entry_cell_count() {
        let scalar = VarEntry {
            value_type: ValueType::Int,
            kind: None,
            dims: vec![],
            addr: Addr(0),
        };
        let matrix = VarEntry {
            value_type: ValueType::Int,
            kind: Some(VarKind::Matrix),
            dims: vec![3, 4],
            addr: Addr(1),
        };
        assert_eq!(scalar.cell_count(), 1);
        assert_eq!(matrix.cell_count(), 12);
    }
}
