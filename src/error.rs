//! Error types for the PageScript compiler and virtual machine

use thiserror::Error;

/// PageScript errors
///
/// Every error is fatal for the phase that raised it: compilation aborts
/// without running the VM, and the VM halts leaving memory as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Parse errors
    /// Malformed token sequence
    ///
    /// **Triggered by:** Invalid PageScript syntax (stray characters,
    /// unterminated strings, malformed declarations)
    #[error("Syntax error at line {line}, column {col}: {message}")]
    SyntaxError {
        /// Line number where the error occurred
        line: usize,
        /// Column number where the error occurred
        col: usize,
        /// Error description
        message: String,
    },

    /// Unexpected token encountered during parsing
    #[error("Unexpected token at line {line}: expected {expected}, got {got}")]
    UnexpectedToken {
        /// Expected token description
        expected: String,
        /// Actual token received
        got: String,
        /// Line number of the offending token
        line: usize,
    },

    /// Unexpected end of file during parsing
    #[error("Unexpected end of file")]
    UnexpectedEof,

    // Semantic errors
    /// Function name already registered
    #[error("Duplicate function: {name}")]
    DuplicateFunction {
        /// Function name
        name: String,
    },

    /// Identifier already declared in the active scope
    #[error("Duplicate identifier: {name}")]
    DuplicateIdentifier {
        /// Identifier name
        name: String,
    },

    /// Call to a function that was never defined
    #[error("Undefined function: {name}")]
    UndefinedFunction {
        /// Function name
        name: String,
    },

    /// Reference to a variable not found in the local or global scope
    #[error("Undefined identifier: {name}")]
    UndefinedIdentifier {
        /// Identifier name
        name: String,
    },

    /// The semantic cube has no entry for an operator/operand pair
    ///
    /// **Triggered by:** Applying an operator to types it does not
    /// accept, e.g. `"text" - 3` or `1 && true`
    #[error("Invalid operation: {op} on types {left_type} and {right_type}")]
    InvalidOperation {
        /// Operator text
        op: String,
        /// Left operand type
        left_type: String,
        /// Right operand type
        right_type: String,
    },

    /// Assignment, argument or return binding between incompatible types
    #[error("Type error: expected {expected}, got {got}")]
    TypeError {
        /// Expected type
        expected: String,
        /// Actual type found
        got: String,
    },

    /// Call site supplied fewer arguments than the signature declares
    #[error("Missing arguments for {func}: expected {expected}, got {got}")]
    MissingArguments {
        /// Callee name
        func: String,
        /// Declared parameter count
        expected: usize,
        /// Arguments supplied
        got: usize,
    },

    /// Call site supplied more arguments than the signature declares
    #[error("Too many arguments for {func}: expected {expected}")]
    TooManyArguments {
        /// Callee name
        func: String,
        /// Declared parameter count
        expected: usize,
    },

    /// Indexing applied to a variable that is not an array or matrix
    #[error("Identifier {name} cannot be indexed")]
    NotIndexable {
        /// Identifier name
        name: String,
    },

    /// Wrong number of index expressions for the declared dimensions
    #[error("Wrong number of dimensions for {name}: declared {expected}, got {got}")]
    DimensionMismatch {
        /// Identifier name
        name: String,
        /// Declared dimension count
        expected: usize,
        /// Index expressions supplied
        got: usize,
    },

    /// `return` used in the global scope or inside the render block
    #[error("Return statement outside a function body")]
    ReturnOutsideFunction,

    /// Attempted to fill a jump slot that was already resolved
    #[error("Invalid backpatch at instruction {index}")]
    InvalidBackpatch {
        /// Instruction index of the jump
        index: usize,
    },

    /// A pending jump survived to the end of compilation
    #[error("Unresolved jump at instruction {index}")]
    UnresolvedJump {
        /// Instruction index of the jump
        index: usize,
    },

    // Memory configuration errors
    /// Builder was given the same segment twice
    #[error("Overlapping segment configuration for {segment}")]
    OverlappingSegments {
        /// Segment name
        segment: String,
    },

    /// Zero-cell reservation requested from the memory mapper
    #[error("Invalid allocation: cannot reserve zero cells")]
    InvalidAllocation,

    // Runtime errors
    /// Segment cursor would exceed its configured maximum
    #[error("Out of memory in segment {segment} for type {value_type}")]
    OutOfMemory {
        /// Segment name
        segment: String,
        /// Value type within the segment
        value_type: String,
    },

    /// Address does not fall inside any configured range
    #[error("Address {address} is outside every configured memory range")]
    OutOfRange {
        /// Offending virtual address
        address: i32,
    },

    /// Runtime array/matrix index outside its declared bound
    #[error("Index out of bounds: {index} for dimension of size {bound}")]
    IndexOutOfBounds {
        /// Index value observed at runtime
        index: i64,
        /// Declared dimension size
        bound: i64,
    },

    /// Pop from an empty internal stack
    #[error("Internal stack underflow: {stack}")]
    StackUnderflow {
        /// Which stack underflowed
        stack: String,
    },

    /// Read or write against a cell that was never backed or initialized
    #[error("Address error: {message}")]
    AddressError {
        /// Error description
        message: String,
    },
}

/// Pipeline phase an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    /// Tokenizing or parsing the source text
    Parse,
    /// Symbol registration, type checking or code generation
    Semantic,
    /// Quadruple execution in the virtual machine
    Runtime,
}

impl Error {
    /// Creates a syntax error with position information
    pub fn syntax(line: usize, col: usize, message: impl Into<String>) -> Self {
        Error::SyntaxError {
            line,
            col,
            message: message.into(),
        }
    }

    /// Creates an address error with a description
    pub fn address(message: impl Into<String>) -> Self {
        Error::AddressError {
            message: message.into(),
        }
    }

    /// Classifies the error by pipeline phase
    pub fn phase(&self) -> ErrorPhase {
        match self {
            Error::SyntaxError { .. } | Error::UnexpectedToken { .. } | Error::UnexpectedEof => {
                ErrorPhase::Parse
            }

            Error::DuplicateFunction { .. }
            | Error::DuplicateIdentifier { .. }
            | Error::UndefinedFunction { .. }
            | Error::UndefinedIdentifier { .. }
            | Error::InvalidOperation { .. }
            | Error::TypeError { .. }
            | Error::MissingArguments { .. }
            | Error::TooManyArguments { .. }
            | Error::NotIndexable { .. }
            | Error::DimensionMismatch { .. }
            | Error::ReturnOutsideFunction
            | Error::InvalidBackpatch { .. }
            | Error::UnresolvedJump { .. }
            | Error::OverlappingSegments { .. } => ErrorPhase::Semantic,

            _ => ErrorPhase::Runtime,
        }
    }
}

/// Result type for PageScript operations
pub type Result<T> = std::result::Result<T, Error>;
