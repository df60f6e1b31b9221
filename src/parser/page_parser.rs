//! Recursive-descent parser with inline semantic actions
//!
//! Grammar sketch (statements end with `;`, blocks with `{ }`):
//!
//! ```text
//! program    := "page" Id ";" (varDecl | funcDecl)* renderBlock
//! varDecl    := type declarator ("," declarator)* ";"
//! declarator := Id dims? arrayInit? | Id ("=" expression)?
//! funcDecl   := ("void" | type) Id "(" params? ")" block
//! block      := "{" statement* "}"
//! statement  := varDecl | assignOrCall | if | while | for
//!             | return | print
//! renderBlock:= "render" "{" (statement | tagStatement)* "}"
//! ```
//!
//! Expression precedence, loosest first: `||`, `&&`, comparisons,
//! `+ -`, `* /`, factor.

use tracing::debug;

use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};
use crate::render::RenderTag;
use crate::semantics::types::{Operator, ReturnType, ValueType};
use crate::semantics::{CodeGenerator, CompiledPage};

/// Parser driving a [`CodeGenerator`] over a token stream
pub struct PageParser {
    tokens: Vec<Token>,
    current: usize,
    gen: CodeGenerator,
}

impl PageParser {
    /// Creates a parser over a scanned token stream
    pub fn new(tokens: Vec<Token>, gen: CodeGenerator) -> Self {
        PageParser {
            tokens,
            current: 0,
            gen,
        }
    }

    /// Parses a whole page, consuming the parser
    pub fn parse(mut self) -> Result<CompiledPage> {
        self.expect(TokenKind::Page)?;
        let name = self.expect_identifier("page name")?;
        self.expect(TokenKind::Semicolon)?;
        debug!(page = %name, "parsing page");

        loop {
            match self.peek_kind() {
                TokenKind::Void => self.func_decl()?,
                TokenKind::IntType
                | TokenKind::FloatType
                | TokenKind::StringType
                | TokenKind::BoolType => {
                    // a type keyword opens either a function or a
                    // variable declaration; the '(' after the name tells
                    if self.peek_kind_at(2) == &TokenKind::LeftParen {
                        self.func_decl()?;
                    } else {
                        self.var_decl()?;
                    }
                }
                TokenKind::Render => break,
                _ => return Err(self.unexpected("declaration or render block")),
            }
        }

        self.render_block()?;
        self.expect(TokenKind::Eof)?;
        self.gen.end_program()
    }

    // ---- declarations ----

    fn value_type(&mut self) -> Result<ValueType> {
        let vt = match self.peek_kind() {
            TokenKind::IntType => ValueType::Int,
            TokenKind::FloatType => ValueType::Float,
            TokenKind::StringType => ValueType::Str,
            TokenKind::BoolType => ValueType::Bool,
            _ => return Err(self.unexpected("type")),
        };
        self.advance();
        Ok(vt)
    }

    fn var_decl(&mut self) -> Result<()> {
        let vt = self.value_type()?;
        loop {
            self.declarator(vt)?;
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    fn declarator(&mut self, vt: ValueType) -> Result<()> {
        let name = self.expect_identifier("variable name")?;

        if self.check(&TokenKind::LeftBracket) {
            let mut dims = Vec::new();
            while self.check(&TokenKind::LeftBracket) && dims.len() < 2 {
                self.advance();
                dims.push(self.dimension_size()?);
                self.expect(TokenKind::RightBracket)?;
            }
            self.gen.add_var(&name, vt, dims)?;

            if self.check(&TokenKind::Assign) {
                self.advance();
                self.array_initializer(&name)?;
            }
        } else {
            self.gen.add_var(&name, vt, Vec::new())?;

            if self.check(&TokenKind::Assign) {
                self.advance();
                self.gen.push_operand(&name)?;
                self.gen.push_operator(Operator::Assign);
                self.expression()?;
                self.gen.resolve_assignment()?;
            }
        }
        Ok(())
    }

    fn dimension_size(&mut self) -> Result<usize> {
        let token = self.advance();
        match token.kind {
            TokenKind::Integer(n) if n > 0 => Ok(n as usize),
            _ => Err(Error::syntax(
                token.line,
                token.column,
                "dimension size must be a positive integer literal",
            )),
        }
    }

    fn array_initializer(&mut self, name: &str) -> Result<()> {
        self.expect(TokenKind::LeftBracket)?;
        let mut index = 0;
        if !self.check(&TokenKind::RightBracket) {
            loop {
                self.literal_operand()?;
                self.gen.array_init_element(name, index)?;
                index += 1;
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightBracket)?;
        Ok(())
    }

    /// A literal pushed straight onto the operand stack; initializer
    /// lists allow nothing richer
    fn literal_operand(&mut self) -> Result<()> {
        let token = self.advance();
        let addr = match token.kind {
            TokenKind::Integer(n) => self.gen.int_literal(n)?,
            TokenKind::Float(x) => self.gen.float_literal(x)?,
            TokenKind::Str(ref s) => self.gen.string_literal(s)?,
            TokenKind::True => self.gen.bool_literal(true)?,
            TokenKind::False => self.gen.bool_literal(false)?,
            TokenKind::Minus => {
                let next = self.advance();
                match next.kind {
                    TokenKind::Integer(n) => self.gen.int_literal(-n)?,
                    TokenKind::Float(x) => self.gen.float_literal(-x)?,
                    _ => {
                        return Err(Error::UnexpectedToken {
                            expected: "number".to_string(),
                            got: next.kind.to_string(),
                            line: next.line,
                        })
                    }
                }
            }
            _ => {
                return Err(Error::UnexpectedToken {
                    expected: "literal".to_string(),
                    got: token.kind.to_string(),
                    line: token.line,
                })
            }
        };
        self.gen.push_operand_addr(addr);
        Ok(())
    }

    fn func_decl(&mut self) -> Result<()> {
        let return_type = if self.check(&TokenKind::Void) {
            self.advance();
            ReturnType::Void
        } else {
            match self.value_type()? {
                ValueType::Int => ReturnType::Int,
                ValueType::Float => ReturnType::Float,
                ValueType::Str => ReturnType::Str,
                ValueType::Bool => ReturnType::Bool,
                ValueType::Pointer => unreachable!("value_type never yields pointer"),
            }
        };

        let name = self.expect_identifier("function name")?;
        self.gen.register_func(&name, return_type)?;

        self.expect(TokenKind::LeftParen)?;
        if !self.check(&TokenKind::RightParen) {
            loop {
                let vt = self.value_type()?;
                let param = self.expect_identifier("parameter name")?;
                self.gen.add_param(&param, vt)?;
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen)?;

        self.block()?;
        self.gen.end_func()
    }

    // ---- statements ----

    fn block(&mut self) -> Result<()> {
        self.expect(TokenKind::LeftBrace)?;
        while !self.check(&TokenKind::RightBrace) {
            self.statement()?;
        }
        self.expect(TokenKind::RightBrace)?;
        Ok(())
    }

    fn statement(&mut self) -> Result<()> {
        match self.peek_kind() {
            TokenKind::IntType
            | TokenKind::FloatType
            | TokenKind::StringType
            | TokenKind::BoolType => self.var_decl(),
            TokenKind::Identifier(_) => self.assign_or_call(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Print => self.print_statement(),
            _ => Err(self.unexpected("statement")),
        }
    }

    fn assign_or_call(&mut self) -> Result<()> {
        let name = self.expect_identifier("identifier")?;

        if self.check(&TokenKind::LeftParen) {
            self.call_tail(&name, true)?;
            self.expect(TokenKind::Semicolon)?;
            return Ok(());
        }

        if self.check(&TokenKind::LeftBracket) {
            self.indexed_access(&name)?;
        } else {
            self.gen.push_operand(&name)?;
        }

        self.expect(TokenKind::Assign)?;
        self.gen.push_operator(Operator::Assign);
        self.expression()?;
        self.gen.resolve_assignment()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    /// Parses `(args)` after a callee name; `statement_position`
    /// discards the result of a non-void call
    fn call_tail(&mut self, name: &str, statement_position: bool) -> Result<bool> {
        self.gen.call_begin(name)?;
        self.expect(TokenKind::LeftParen)?;
        if !self.check(&TokenKind::RightParen) {
            loop {
                self.expression()?;
                self.gen.call_arg()?;
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen)?;

        let has_value = self.gen.call_end()?;
        if has_value && statement_position {
            self.gen.discard_top()?;
        }
        Ok(has_value)
    }

    /// Parses `[e]` or `[e][e]` after an array or matrix name, leaving
    /// a pointer temporal on the operand stack
    fn indexed_access(&mut self, name: &str) -> Result<()> {
        self.gen.index_begin(name)?;
        while self.check(&TokenKind::LeftBracket) {
            self.advance();
            self.expression()?;
            self.gen.index_dim()?;
            self.expect(TokenKind::RightBracket)?;
        }
        self.gen.index_end()?;
        Ok(())
    }

    fn if_statement(&mut self) -> Result<()> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LeftParen)?;
        self.expression()?;
        self.expect(TokenKind::RightParen)?;
        self.gen.if_begin()?;

        self.block()?;

        if self.check(&TokenKind::Else) {
            self.advance();
            self.gen.if_else()?;
            self.block()?;
        }
        self.gen.if_end()
    }

    fn while_statement(&mut self) -> Result<()> {
        self.expect(TokenKind::While)?;
        self.gen.while_begin();
        self.expect(TokenKind::LeftParen)?;
        self.expression()?;
        self.expect(TokenKind::RightParen)?;
        self.gen.while_cond()?;

        self.block()?;
        self.gen.while_end()
    }

    fn for_statement(&mut self) -> Result<()> {
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LeftParen)?;

        let name = self.expect_identifier("loop variable")?;
        self.gen.for_control(&name)?;
        self.expect(TokenKind::Assign)?;
        self.expression()?;
        self.gen.for_init()?;

        self.expect(TokenKind::To)?;
        self.expression()?;
        self.gen.for_limit()?;

        if self.check(&TokenKind::Step) {
            self.advance();
            self.expression()?;
            self.gen.for_step()?;
        }

        self.expect(TokenKind::RightParen)?;
        self.gen.for_head()?;

        self.block()?;
        self.gen.for_end()
    }

    fn return_statement(&mut self) -> Result<()> {
        self.expect(TokenKind::Return)?;
        if self.check(&TokenKind::Semicolon) {
            self.gen.handle_return(false)?;
        } else {
            self.expression()?;
            self.gen.handle_return(true)?;
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    fn print_statement(&mut self) -> Result<()> {
        self.expect(TokenKind::Print)?;
        self.expect(TokenKind::LeftParen)?;
        loop {
            self.expression()?;
            self.gen.print_value()?;
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RightParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    // ---- render block ----

    fn render_block(&mut self) -> Result<()> {
        self.expect(TokenKind::Render)?;
        self.gen.begin_render()?;

        self.render_body()?;
        self.gen.end_render()
    }

    fn render_body(&mut self) -> Result<()> {
        self.expect(TokenKind::LeftBrace)?;
        while !self.check(&TokenKind::RightBrace) {
            self.render_statement()?;
        }
        self.expect(TokenKind::RightBrace)?;
        Ok(())
    }

    fn render_statement(&mut self) -> Result<()> {
        match self.render_tag() {
            Some(tag) => self.tag_statement(tag),
            None => self.statement(),
        }
    }

    fn render_tag(&self) -> Option<RenderTag> {
        match self.peek_kind() {
            TokenKind::Container => Some(RenderTag::Container),
            TokenKind::Paragraph => Some(RenderTag::Paragraph),
            TokenKind::Heading => Some(RenderTag::Heading),
            TokenKind::Table => Some(RenderTag::Table),
            TokenKind::Image => Some(RenderTag::Image),
            TokenKind::Card => Some(RenderTag::Card),
            TokenKind::Layout => Some(RenderTag::Layout),
            _ => None,
        }
    }

    fn tag_statement(&mut self, tag: RenderTag) -> Result<()> {
        self.advance();
        self.gen.render_open(tag);

        self.expect(TokenKind::LeftParen)?;
        if !self.check(&TokenKind::RightParen) {
            loop {
                let attribute = self.expect_identifier("attribute name")?;
                self.expect(TokenKind::Colon)?;
                self.expression()?;
                self.gen.render_attr(tag, &attribute)?;
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen)?;

        // grouping tags may nest children in a brace block
        if self.check(&TokenKind::LeftBrace) {
            self.render_body()
        } else {
            self.expect(TokenKind::Semicolon)?;
            Ok(())
        }
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<()> {
        self.and_expression()?;
        while self.check(&TokenKind::OrOr) {
            self.advance();
            self.gen.push_operator(Operator::Or);
            self.and_expression()?;
            self.gen.resolve_pending(&[Operator::Or])?;
        }
        Ok(())
    }

    fn and_expression(&mut self) -> Result<()> {
        self.comparison()?;
        while self.check(&TokenKind::AndAnd) {
            self.advance();
            self.gen.push_operator(Operator::And);
            self.comparison()?;
            self.gen.resolve_pending(&[Operator::And])?;
        }
        Ok(())
    }

    /// A single optional comparison; chains like `a < b < c` are not in
    /// the grammar
    fn comparison(&mut self) -> Result<()> {
        self.arith()?;
        let op = match self.peek_kind() {
            TokenKind::Lt => Some(Operator::Lt),
            TokenKind::Gt => Some(Operator::Gt),
            TokenKind::LtEq => Some(Operator::Le),
            TokenKind::GtEq => Some(Operator::Ge),
            TokenKind::EqEq => Some(Operator::Eq),
            TokenKind::NotEq => Some(Operator::Ne),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            self.gen.push_operator(op);
            self.arith()?;
            self.gen.resolve_pending(&[op])?;
        }
        Ok(())
    }

    fn arith(&mut self) -> Result<()> {
        self.term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => Operator::Add,
                TokenKind::Minus => Operator::Sub,
                _ => break,
            };
            self.advance();
            self.gen.push_operator(op);
            self.term()?;
            self.gen.resolve_pending(&[Operator::Add, Operator::Sub])?;
        }
        Ok(())
    }

    fn term(&mut self) -> Result<()> {
        self.factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => Operator::Mul,
                TokenKind::Slash => Operator::Div,
                _ => break,
            };
            self.advance();
            self.gen.push_operator(op);
            self.factor()?;
            self.gen.resolve_pending(&[Operator::Mul, Operator::Div])?;
        }
        Ok(())
    }

    fn factor(&mut self) -> Result<()> {
        match self.peek_kind().clone() {
            TokenKind::LeftParen => {
                self.advance();
                self.gen.push_floor();
                self.expression()?;
                self.expect(TokenKind::RightParen)?;
                self.gen.pop_floor()
            }

            TokenKind::Integer(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Minus => self.literal_operand(),

            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    let has_value = self.call_tail(&name, false)?;
                    if !has_value {
                        return Err(Error::TypeError {
                            expected: "value".to_string(),
                            got: "void".to_string(),
                        });
                    }
                    Ok(())
                } else if self.check(&TokenKind::LeftBracket) {
                    self.indexed_access(&name)
                } else {
                    self.gen.push_operand(&name)
                }
            }

            _ => Err(self.unexpected("expression")),
        }
    }

    // ---- token cursor ----

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let index = (self.current + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.peek_kind() == &kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            Error::UnexpectedEof
        } else {
            Error::UnexpectedToken {
                expected: expected.to_string(),
                got: token.kind.to_string(),
                line: token.line,
            }
        }
    }
}
