//! Lexical analysis for PageScript
//!
//! Converts source text into a stream of position-tagged tokens.

mod scanner;
mod token;

pub use scanner::Scanner;
pub use token::{Token, TokenKind};
