//! # PageScript
//!
//! A page-description DSL compiled in a single pass to quadruple
//! (three-address) instructions and executed by a stack-based virtual
//! machine over segmented virtual memory.
//!
//! A page is plain data plus logic: global declarations and functions
//! execute like an ordinary imperative program, and the trailing
//! `render` block turns values into a typed stream of render
//! operations for an external renderer.
//!
//! ## Quick Start
//!
//! ```rust
//! use pagescript::{compile, VirtualMachine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = r#"
//!     page demo;
//!
//!     int triple(int n) {
//!         return n * 3;
//!     }
//!
//!     render {
//!         int x;
//!         x = triple(4);
//!         print(x);
//!         heading(text: "Demo", level: 1);
//!     }
//! "#;
//!
//! let page = compile(source)?;
//! let mut vm = VirtualMachine::new(page)?;
//! vm.run()?;
//!
//! assert_eq!(vm.printed(), ["12"]);
//! assert_eq!(vm.render_ops().len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! - [`lexer::Scanner`] turns source text into tokens.
//! - [`parser::PageParser`] walks the grammar once, firing semantic
//!   action hooks on [`semantics::CodeGenerator`]; there is no AST.
//! - The generator produces a [`CompiledPage`]: function table, literal
//!   table, quadruple stream and the frozen [`memory::MemoryMapper`].
//! - [`vm::VirtualMachine`] executes the quadruples.
//!
//! Memory segment sizing is configuration, not constants: see
//! [`compile_with_layout`] and [`memory::MemoryMapper::builder`].

pub mod error;
pub mod lexer;
pub mod memory;
pub mod parser;
pub mod render;
pub mod semantics;
pub mod vm;

pub use error::{Error, ErrorPhase, Result};
pub use lexer::{Scanner, Token, TokenKind};
pub use memory::{MemoryMapper, MemoryStore, Value};
pub use parser::PageParser;
pub use render::{RenderOp, RenderTag, RenderValue};
pub use semantics::types::{
    Addr, CompilationOutput, Instruction, Operation, ReturnType, Segment, ValueType,
};
pub use semantics::{CodeGenerator, CompiledPage};
pub use vm::VirtualMachine;

/// Compiles a page under the sample memory layout (1000 cells per type
/// per segment)
pub fn compile(source: &str) -> Result<CompiledPage> {
    compile_with_layout(source, MemoryMapper::default_layout()?)
}

/// Compiles a page under a caller-supplied memory layout
pub fn compile_with_layout(source: &str, mapper: MemoryMapper) -> Result<CompiledPage> {
    let tokens = Scanner::new(source).scan_tokens()?;
    let gen = CodeGenerator::new(mapper);
    PageParser::new(tokens, gen).parse()
}
