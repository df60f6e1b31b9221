use std::fmt;

use serde::{Deserialize, Serialize};

/// A single token from the source code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The type of token
    pub kind: TokenKind,
    /// Original text of the token
    pub lexeme: String,
    /// Line number where token appears (1-indexed)
    pub line: usize,
    /// Column number where token starts (1-indexed)
    pub column: usize,
}

impl Token {
    /// Creates a new token with the given properties
    pub fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Token {
            kind,
            lexeme,
            line,
            column,
        }
    }
}

/// All possible token types in PageScript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Integer(i64),
    /// Floating-point literal
    Float(f64),
    /// String literal, escape sequences already applied
    Str(String),
    /// Boolean true literal
    True,
    /// Boolean false literal
    False,

    /// Identifier
    Identifier(String),

    // Keywords
    /// `page`
    Page,
    /// `render`
    Render,
    /// `void`
    Void,
    /// `int` type keyword
    IntType,
    /// `float` type keyword
    FloatType,
    /// `string` type keyword
    StringType,
    /// `bool` type keyword
    BoolType,
    /// `if`
    If,
    /// `else`
    Else,
    /// `while`
    While,
    /// `for`
    For,
    /// `to`
    To,
    /// `step`
    Step,
    /// `return`
    Return,
    /// `print`
    Print,

    // Render tag keywords
    /// `container`
    Container,
    /// `paragraph`
    Paragraph,
    /// `heading`
    Heading,
    /// `table`
    Table,
    /// `image`
    Image,
    /// `card`
    Card,
    /// `layout`
    Layout,

    // Operators
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    LtEq,
    /// `>=`
    GtEq,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `=`
    Assign,

    // Punctuation
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `:`
    Colon,

    /// End of input
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Integer(n) => return write!(f, "{}", n),
            TokenKind::Float(x) => return write!(f, "{}", x),
            TokenKind::Str(s) => return write!(f, "\"{}\"", s),
            TokenKind::Identifier(name) => return write!(f, "{}", name),
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Page => "page",
            TokenKind::Render => "render",
            TokenKind::Void => "void",
            TokenKind::IntType => "int",
            TokenKind::FloatType => "float",
            TokenKind::StringType => "string",
            TokenKind::BoolType => "bool",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::To => "to",
            TokenKind::Step => "step",
            TokenKind::Return => "return",
            TokenKind::Print => "print",
            TokenKind::Container => "container",
            TokenKind::Paragraph => "paragraph",
            TokenKind::Heading => "heading",
            TokenKind::Table => "table",
            TokenKind::Image => "image",
            TokenKind::Card => "card",
            TokenKind::Layout => "layout",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Assign => "=",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Eof => "<eof>",
        };
        write!(f, "{}", text)
    }
}
