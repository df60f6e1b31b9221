//! PageScript parser
//!
//! A single-pass recursive-descent parser; no AST is built. Semantic
//! action hooks on the code generator fire between grammar symbols, so
//! quadruples come out as the token stream goes in.

mod page_parser;

pub use page_parser::PageParser;
