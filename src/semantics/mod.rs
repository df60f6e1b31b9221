//! Semantic analysis and code generation
//!
//! The semantic cube decides type compatibility, `types` defines the
//! shared vocabulary, and `codegen` holds the single-pass generator the
//! parser drives.

pub mod codegen;
pub mod cube;
pub mod types;

pub use codegen::{CodeGenerator, CompiledPage};
