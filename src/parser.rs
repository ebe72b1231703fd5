//! Parser for transformation scripts
//!
//! Consumes tokens from the [`Lexer`] and produces the program AST: a
//! header (version directive, input declarations, output declaration) and a
//! single body expression. Expressions are parsed by recursive descent with
//! precedence climbing; lambda parameter lists are disambiguated from
//! parenthesised expressions by lexer snapshot backtracking.
//!
//! Inside object and array literals the parser performs single-token
//! recovery: a failed member is recorded and parsing resumes at the next
//! comma or closing delimiter, so several errors can be reported from one
//! run. `parse()` returns the first error; `into_errors()` exposes all.

use crate::ast::{
    ArrayItem, BinaryOp, Callee, Expr, Header, InputDecl, MatchArm, ObjectItem, OutputDecl,
    Pattern, Program, UnaryOp,
};
use crate::error::{EngineError, EngineResult, Position};
use crate::format::{Format, FormatOptions, OptionValue};
use crate::lexer::{Lexer, LexerSnapshot, Token};
use crate::udm::Udm;
use smallvec::SmallVec;
use std::rc::Rc;

/// Header processing states, in the order they must be traversed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    AwaitDirective,
    AwaitInputOrOutput,
    AwaitSeparator,
    InBody,
}

/// Configuration options for the parser
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum expression nesting depth to prevent stack overflow
    pub max_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { max_depth: 500 }
    }
}

/// Script parser
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
    current_pos: Position,
    config: ParserConfig,
    depth: usize,
    errors: Vec<EngineError>,
}

/// Parses a complete script into a program
pub fn parse_program(source: &str) -> EngineResult<Program> {
    Parser::new(source)?.parse()
}

impl<'a> Parser<'a> {
    /// Creates a parser over the given source
    pub fn new(source: &'a str) -> EngineResult<Self> {
        Self::with_config(source, ParserConfig::default())
    }

    /// Creates a parser with a custom configuration
    pub fn with_config(source: &'a str, config: ParserConfig) -> EngineResult<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        let current_pos = lexer.last_token_start();
        Ok(Self {
            lexer,
            current,
            current_pos,
            config,
            depth: 0,
            errors: Vec::new(),
        })
    }

    /// All errors collected during recovery, in source order
    pub fn into_errors(self) -> Vec<EngineError> {
        self.errors
    }

    /// Parses the whole program: header, separator, body expression
    pub fn parse(&mut self) -> EngineResult<Program> {
        let header = self.parse_header()?;
        let body = self.parse_expr()?;
        if self.current != Token::Eof {
            return Err(self.unexpected("end of input"));
        }
        if let Some(first) = self.errors.first() {
            return Err(first.clone());
        }
        Ok(Program { header, body })
    }

    // ---- token plumbing -------------------------------------------------

    fn advance(&mut self) -> EngineResult<Token<'a>> {
        let next = self.lexer.next_token()?;
        let pos = self.lexer.last_token_start();
        let previous = std::mem::replace(&mut self.current, next);
        self.current_pos = pos;
        Ok(previous)
    }

    fn expect(&mut self, expected: Token<'static>, what: &str) -> EngineResult<()> {
        if self.current == expected {
            self.advance()?;
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> EngineError {
        EngineError::syntax(
            format!(
                "unexpected {}, expected {}",
                self.current.type_name(),
                expected
            ),
            self.current_pos,
        )
    }

    fn save(&self) -> (LexerSnapshot, Token<'a>, Position) {
        (self.lexer.snapshot(), self.current.clone(), self.current_pos)
    }

    fn restore(&mut self, state: (LexerSnapshot, Token<'a>, Position)) {
        self.lexer.restore(state.0);
        self.current = state.1;
        self.current_pos = state.2;
    }

    fn enter(&mut self) -> EngineResult<()> {
        self.depth += 1;
        if self.depth > self.config.max_depth {
            return Err(EngineError::syntax(
                "maximum expression nesting depth exceeded",
                self.current_pos,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ---- header ---------------------------------------------------------

    /// Parses the header through its state machine:
    /// AwaitDirective → AwaitInputOrOutput → AwaitSeparator → InBody
    fn parse_header(&mut self) -> EngineResult<Header> {
        let mut state = HeaderState::AwaitDirective;
        let mut version = String::new();
        let mut inputs: Vec<InputDecl> = Vec::new();
        let mut output: Option<OutputDecl> = None;

        while state != HeaderState::InBody {
            match state {
                HeaderState::AwaitDirective => match &self.current {
                    Token::Directive(v) => {
                        if v.as_ref() != "1.0" {
                            return Err(EngineError::header(
                                format!("unsupported language version '{}', expected 1.0", v),
                                self.current_pos,
                            ));
                        }
                        version = v.to_string();
                        self.advance()?;
                        state = HeaderState::AwaitInputOrOutput;
                    }
                    _ => {
                        return Err(EngineError::header(
                            "script must start with the '%utlx 1.0' directive",
                            self.current_pos,
                        ));
                    }
                },
                HeaderState::AwaitInputOrOutput | HeaderState::AwaitSeparator => {
                    match &self.current {
                        Token::Input => {
                            if state == HeaderState::AwaitSeparator {
                                return Err(EngineError::header(
                                    "input declarations must precede the output declaration",
                                    self.current_pos,
                                ));
                            }
                            self.advance()?;
                            self.parse_input_decls(&mut inputs)?;
                        }
                        Token::Output => {
                            let pos = self.current_pos;
                            if output.is_some() {
                                return Err(EngineError::header(
                                    "duplicate output declaration",
                                    pos,
                                ));
                            }
                            self.advance()?;
                            output = Some(self.parse_output_decl(pos)?);
                            state = HeaderState::AwaitSeparator;
                        }
                        Token::Separator => {
                            self.advance()?;
                            state = HeaderState::InBody;
                        }
                        Token::Eof => {
                            return Err(EngineError::header(
                                "unexpected end of input inside the header, expected '---'",
                                self.current_pos,
                            ));
                        }
                        _ => {
                            return Err(EngineError::header(
                                format!(
                                    "unexpected {} in header, expected input, output or '---'",
                                    self.current.type_name()
                                ),
                                self.current_pos,
                            ));
                        }
                    }
                }
                HeaderState::InBody => unreachable!(),
            }
        }

        if inputs.is_empty() {
            return Err(EngineError::header(
                "at least one input declaration is required",
                self.current_pos,
            ));
        }
        let output = output.ok_or_else(|| {
            EngineError::header("missing output declaration", self.current_pos)
        })?;
        Ok(Header {
            version,
            inputs,
            output,
        })
    }

    /// Parses the declarations after an `input` keyword: either the
    /// multi-input list `input: n1 f1, n2 f2, …` or the single form
    /// `input [name] format [{opts}]` (name defaults to "input")
    fn parse_input_decls(&mut self, inputs: &mut Vec<InputDecl>) -> EngineResult<()> {
        if self.current == Token::Colon {
            self.advance()?;
            loop {
                let decl = self.parse_one_input(None)?;
                self.push_input(inputs, decl)?;
                if self.current == Token::Comma {
                    self.advance()?;
                } else {
                    break;
                }
            }
        } else {
            let first = self.header_identifier("input name or format")?;
            let decl = if matches!(self.current, Token::Identifier(_)) {
                self.parse_one_input(Some(first))?
            } else {
                // `input json` — single anonymous input named "input"
                let (format, position) = self.resolve_input_format(&first.0, first.1)?;
                let options = self.parse_option_map(format)?;
                InputDecl {
                    name: "input".to_string(),
                    format,
                    options,
                    position,
                }
            };
            self.push_input(inputs, decl)?;
        }
        Ok(())
    }

    fn parse_one_input(&mut self, name: Option<(String, Position)>) -> EngineResult<InputDecl> {
        let (name, position) = match name {
            Some(n) => n,
            None => self.header_identifier("input name")?,
        };
        let (format_name, format_pos) = self.header_identifier("input format")?;
        let (format, _) = self.resolve_input_format(&format_name, format_pos)?;
        let options = self.parse_option_map(format)?;
        Ok(InputDecl {
            name,
            format,
            options,
            position,
        })
    }

    fn resolve_input_format(
        &self,
        name: &str,
        position: Position,
    ) -> EngineResult<(Format, Position)> {
        let format = Format::from_name(name).ok_or_else(|| {
            EngineError::header(format!("unknown input format '{}'", name), position)
        })?;
        Ok((format, position))
    }

    fn push_input(&self, inputs: &mut Vec<InputDecl>, decl: InputDecl) -> EngineResult<()> {
        if inputs.iter().any(|i| i.name == decl.name) {
            return Err(EngineError::header(
                format!("duplicate input name '{}'", decl.name),
                decl.position,
            ));
        }
        inputs.push(decl);
        Ok(())
    }

    fn parse_output_decl(&mut self, position: Position) -> EngineResult<OutputDecl> {
        let (name, format_pos) = self.header_identifier("output format")?;
        let format = Format::from_name(&name).ok_or_else(|| {
            EngineError::header(format!("unknown output format '{}'", name), format_pos)
        })?;
        if !format.is_output_capable() {
            return Err(EngineError::header(
                format!("format '{}' cannot be used as an output target", name),
                format_pos,
            ));
        }
        let options = self.parse_option_map(format)?;
        Ok(OutputDecl {
            format,
            options,
            position,
        })
    }

    fn header_identifier(&mut self, what: &str) -> EngineResult<(String, Position)> {
        let pos = self.current_pos;
        match &self.current {
            Token::Identifier(name) => {
                let name = name.to_string();
                self.advance()?;
                Ok((name, pos))
            }
            _ => Err(EngineError::header(
                format!("expected {}, found {}", what, self.current.type_name()),
                pos,
            )),
        }
    }

    /// Parses an optional `{ key: value, … }` option map and validates each
    /// key against the recognised set for the format
    fn parse_option_map(&mut self, format: Format) -> EngineResult<FormatOptions> {
        let mut options = FormatOptions::default();
        if self.current != Token::LBrace {
            return Ok(options);
        }
        self.advance()?;
        while self.current != Token::RBrace {
            let (key, key_pos) = match &self.current {
                Token::Identifier(k) => (k.to_string(), self.current_pos),
                Token::Str(k) => (k.to_string(), self.current_pos),
                _ => return Err(self.unexpected("option name")),
            };
            self.advance()?;
            self.expect(Token::Colon, "':'")?;
            let value = match &self.current {
                Token::True => OptionValue::Bool(true),
                Token::False => OptionValue::Bool(false),
                Token::Int(i) => OptionValue::Int(*i),
                Token::Str(s) => OptionValue::Str(s.to_string()),
                _ => return Err(self.unexpected("option value (string, integer or boolean)")),
            };
            self.advance()?;
            options.set(format, &key, value, key_pos)?;
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(Token::RBrace, "'}'")?;
        Ok(options)
    }

    // ---- expressions ----------------------------------------------------

    /// Parses a full expression (loosest level: `|>`)
    pub fn parse_expr(&mut self) -> EngineResult<Expr> {
        self.parse_pipe()
    }

    fn parse_pipe(&mut self) -> EngineResult<Expr> {
        let mut left = self.parse_ternary()?;
        while self.current == Token::PipeGt {
            let position = self.current_pos;
            self.advance()?;
            let right = self.parse_ternary()?;
            left = Expr::Pipe {
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_ternary(&mut self) -> EngineResult<Expr> {
        let condition = self.parse_coalesce()?;
        if self.current == Token::Question {
            self.advance()?;
            let then_branch = self.parse_ternary()?;
            self.expect(Token::Colon, "':' in ternary")?;
            let else_branch = self.parse_ternary()?;
            return Ok(Expr::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });
        }
        Ok(condition)
    }

    fn parse_coalesce(&mut self) -> EngineResult<Expr> {
        self.parse_left_assoc(&[(Token::QuestionQuestion, BinaryOp::Coalesce)], Self::parse_or)
    }

    fn parse_or(&mut self) -> EngineResult<Expr> {
        self.parse_left_assoc(&[(Token::OrOr, BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> EngineResult<Expr> {
        self.parse_left_assoc(&[(Token::AndAnd, BinaryOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> EngineResult<Expr> {
        self.parse_left_assoc(
            &[(Token::EqEq, BinaryOp::Eq), (Token::NotEq, BinaryOp::Ne)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> EngineResult<Expr> {
        self.parse_left_assoc(
            &[
                (Token::Lt, BinaryOp::Lt),
                (Token::Le, BinaryOp::Le),
                (Token::Gt, BinaryOp::Gt),
                (Token::Ge, BinaryOp::Ge),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> EngineResult<Expr> {
        self.parse_left_assoc(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> EngineResult<Expr> {
        self.parse_left_assoc(
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Mod),
            ],
            Self::parse_power,
        )
    }

    fn parse_left_assoc(
        &mut self,
        table: &[(Token<'static>, BinaryOp)],
        next: fn(&mut Self) -> EngineResult<Expr>,
    ) -> EngineResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in table {
                if self.current == *token {
                    let position = self.current_pos;
                    self.advance()?;
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                        position,
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    /// `**` is right-associative
    fn parse_power(&mut self) -> EngineResult<Expr> {
        let base = self.parse_unary()?;
        if self.current == Token::StarStar {
            let position = self.current_pos;
            self.advance()?;
            let exponent = self.parse_power()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
                position,
            });
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> EngineResult<Expr> {
        let position = self.current_pos;
        match self.current {
            Token::Minus => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                    position,
                })
            }
            Token::Not => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                    position,
                })
            }
            _ => self.parse_postfix(),
        }
    }

    /// Member access, attribute access, safe navigation, indexing and calls
    fn parse_postfix(&mut self) -> EngineResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match &self.current {
                Token::Dot => {
                    let position = self.current_pos;
                    self.advance()?;
                    if self.current == Token::At {
                        self.advance()?;
                        let (name, _) = self.member_name("attribute name")?;
                        expr = Expr::Attribute {
                            target: Box::new(expr),
                            name,
                            position,
                        };
                    } else {
                        let (key, _) = self.member_name("property name")?;
                        expr = if key == "__metadata" {
                            Expr::MetadataAccess {
                                target: Box::new(expr),
                            }
                        } else {
                            Expr::Property {
                                target: Box::new(expr),
                                key,
                                position,
                            }
                        };
                    }
                }
                Token::QuestionDot => {
                    self.advance()?;
                    let (key, _) = self.member_name("property name")?;
                    expr = Expr::SafeNav {
                        target: Box::new(expr),
                        key,
                    };
                }
                Token::LBracket => {
                    let position = self.current_pos;
                    self.advance()?;
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                        position,
                    };
                }
                Token::LParen => {
                    let position = self.current_pos;
                    self.advance()?;
                    let mut args = Vec::new();
                    while self.current != Token::RParen {
                        args.push(self.parse_expr()?);
                        if self.current == Token::Comma {
                            self.advance()?;
                        } else {
                            break;
                        }
                    }
                    self.expect(Token::RParen, "')'")?;
                    let callee = match expr {
                        Expr::Identifier { name, .. } => Callee::Named(name),
                        other => Callee::Expr(Box::new(other)),
                    };
                    expr = Expr::Call {
                        callee,
                        args,
                        position,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// A property or attribute name after `.`; keywords are valid names
    fn member_name(&mut self, what: &str) -> EngineResult<(String, Position)> {
        let pos = self.current_pos;
        let name = match &self.current {
            Token::Identifier(name) => name.to_string(),
            Token::Input => "input".to_string(),
            Token::Output => "output".to_string(),
            Token::Match => "match".to_string(),
            Token::Let => "let".to_string(),
            _ => return Err(self.unexpected(what)),
        };
        self.advance()?;
        Ok((name, pos))
    }

    fn parse_primary(&mut self) -> EngineResult<Expr> {
        let position = self.current_pos;
        match self.current.clone() {
            Token::Int(i) => {
                self.advance()?;
                Ok(Expr::Literal(Udm::int(i)))
            }
            Token::Float(f) => {
                self.advance()?;
                Ok(Expr::Literal(Udm::float(f)))
            }
            Token::Str(s) => {
                self.advance()?;
                Ok(Expr::Literal(Udm::string(s.into_owned())))
            }
            Token::True => {
                self.advance()?;
                Ok(Expr::Literal(Udm::bool(true)))
            }
            Token::False => {
                self.advance()?;
                Ok(Expr::Literal(Udm::bool(false)))
            }
            Token::Null => {
                self.advance()?;
                Ok(Expr::Literal(Udm::null()))
            }
            Token::InputName(name) => {
                self.advance()?;
                Ok(Expr::InputRef {
                    name: name.into_owned(),
                    position,
                })
            }
            Token::Identifier(name) => {
                self.advance()?;
                // `x => body` — single-parameter lambda without parentheses
                if self.current == Token::FatArrow {
                    self.advance()?;
                    let body = self.parse_expr()?;
                    let mut params = SmallVec::new();
                    params.push(name.into_owned());
                    return Ok(Expr::Lambda {
                        params,
                        body: Rc::new(body),
                    });
                }
                Ok(Expr::Identifier {
                    name: name.into_owned(),
                    position,
                })
            }
            Token::LParen => self.parse_paren_or_lambda(),
            Token::LBracket => {
                self.enter()?;
                let result = self.parse_array_literal();
                self.leave();
                result
            }
            Token::LBrace => {
                self.enter()?;
                let result = self.parse_object_literal();
                self.leave();
                result
            }
            Token::If => {
                self.enter()?;
                let result = self.parse_if();
                self.leave();
                result
            }
            Token::Match => {
                self.enter()?;
                let result = self.parse_match();
                self.leave();
                result
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// At `(`: try a lambda parameter list first, fall back to a grouped
    /// expression via snapshot restore
    fn parse_paren_or_lambda(&mut self) -> EngineResult<Expr> {
        let saved = self.save();
        match self.try_parse_lambda() {
            Ok(Some(lambda)) => Ok(lambda),
            Ok(None) | Err(_) => {
                self.restore(saved);
                self.advance()?; // (
                self.enter()?;
                let inner = self.parse_expr();
                self.leave();
                let inner = inner?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
        }
    }

    /// Returns Ok(Some) only for `(ident, …) =>` shapes
    fn try_parse_lambda(&mut self) -> EngineResult<Option<Expr>> {
        self.advance()?; // (
        let mut params: SmallVec<[String; 4]> = SmallVec::new();
        if self.current != Token::RParen {
            loop {
                match &self.current {
                    Token::Identifier(name) => {
                        params.push(name.to_string());
                        self.advance()?;
                    }
                    _ => return Ok(None),
                }
                if self.current == Token::Comma {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        if self.current != Token::RParen {
            return Ok(None);
        }
        self.advance()?;
        if self.current != Token::FatArrow {
            return Ok(None);
        }
        self.advance()?;
        let body = self.parse_expr()?;
        Ok(Some(Expr::Lambda {
            params,
            body: Rc::new(body),
        }))
    }

    fn parse_array_literal(&mut self) -> EngineResult<Expr> {
        self.advance()?; // [
        let mut items = Vec::new();
        while self.current != Token::RBracket {
            let item = if self.current == Token::Ellipsis {
                let position = self.current_pos;
                self.advance()?;
                self.parse_expr().map(|e| ArrayItem::Spread(e, position))
            } else {
                self.parse_expr().map(ArrayItem::Item)
            };
            match item {
                Ok(item) => items.push(item),
                Err(err) => {
                    self.errors.push(err);
                    self.recover_to_member_boundary(Token::RBracket)?;
                }
            }
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(Token::RBracket, "']'")?;
        Ok(Expr::ArrayLit(items))
    }

    fn parse_object_literal(&mut self) -> EngineResult<Expr> {
        self.advance()?; // {
        let mut items = Vec::new();
        while self.current != Token::RBrace {
            match self.parse_object_member() {
                Ok(item) => {
                    let was_let = matches!(item, ObjectItem::Let { .. });
                    items.push(item);
                    // `let` members are `;`-terminated, fields comma-separated
                    if was_let {
                        continue;
                    }
                }
                Err(err) => {
                    self.errors.push(err);
                    self.recover_to_member_boundary(Token::RBrace)?;
                }
            }
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(Token::RBrace, "'}'")?;
        Ok(Expr::ObjectLit(items))
    }

    fn parse_object_member(&mut self) -> EngineResult<ObjectItem> {
        match &self.current {
            Token::Let => {
                self.advance()?;
                let (name, _) = self.member_name("binding name")?;
                self.expect(Token::Assign, "'='")?;
                let value = self.parse_expr()?;
                self.expect(Token::Semicolon, "';' after let binding")?;
                Ok(ObjectItem::Let { name, value })
            }
            Token::Ellipsis => {
                let position = self.current_pos;
                self.advance()?;
                let value = self.parse_expr()?;
                Ok(ObjectItem::Spread(value, position))
            }
            _ => {
                let key = match &self.current {
                    Token::Identifier(k) => k.to_string(),
                    Token::Str(k) => k.to_string(),
                    Token::Input => "input".to_string(),
                    Token::Output => "output".to_string(),
                    Token::Match => "match".to_string(),
                    _ => return Err(self.unexpected("an object key, '...' or 'let'")),
                };
                self.advance()?;
                self.expect(Token::Colon, "':' after object key")?;
                let value = self.parse_expr()?;
                Ok(ObjectItem::Field { key, value })
            }
        }
    }

    /// Skips tokens up to the next member boundary (comma at this nesting
    /// level, the closing delimiter, or end of input)
    fn recover_to_member_boundary(&mut self, close: Token<'static>) -> EngineResult<()> {
        let mut nesting = 0usize;
        loop {
            match &self.current {
                Token::Eof => return Ok(()),
                Token::Comma if nesting == 0 => return Ok(()),
                t if *t == close && nesting == 0 => return Ok(()),
                Token::LBrace | Token::LBracket | Token::LParen => {
                    nesting += 1;
                    self.advance()?;
                }
                Token::RBrace | Token::RBracket | Token::RParen => {
                    nesting = nesting.saturating_sub(1);
                    self.advance()?;
                }
                _ => {
                    self.advance()?;
                }
            }
        }
    }

    fn parse_if(&mut self) -> EngineResult<Expr> {
        self.advance()?; // if
        self.expect(Token::LParen, "'(' after if")?;
        let condition = self.parse_expr()?;
        self.expect(Token::RParen, "')'")?;
        let then_branch = self.parse_expr()?;
        self.expect(Token::Else, "'else'")?;
        let else_branch = self.parse_expr()?;
        Ok(Expr::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn parse_match(&mut self) -> EngineResult<Expr> {
        let position = self.current_pos;
        self.advance()?; // match
        let subject = self.parse_pipe()?;
        self.expect(Token::LBrace, "'{' after match subject")?;
        let mut arms = Vec::new();
        while self.current != Token::RBrace {
            let pattern = self.parse_pattern()?;
            let guard = if self.current == Token::If {
                self.advance()?;
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(Token::FatArrow, "'=>'")?;
            let body = self.parse_expr()?;
            arms.push(MatchArm {
                pattern,
                guard,
                body,
            });
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(Token::RBrace, "'}'")?;
        if arms.is_empty() {
            return Err(EngineError::syntax("match requires at least one arm", position));
        }
        Ok(Expr::Match {
            subject: Box::new(subject),
            arms,
            position,
        })
    }

    fn parse_pattern(&mut self) -> EngineResult<Pattern> {
        let pattern = match self.current.clone() {
            Token::Int(i) => Pattern::Literal(Udm::int(i)),
            Token::Float(f) => Pattern::Literal(Udm::float(f)),
            Token::Str(s) => Pattern::Literal(Udm::string(s.into_owned())),
            Token::True => Pattern::Literal(Udm::bool(true)),
            Token::False => Pattern::Literal(Udm::bool(false)),
            Token::Null => Pattern::Literal(Udm::null()),
            Token::Minus => {
                self.advance()?;
                match self.current.clone() {
                    Token::Int(i) => Pattern::Literal(Udm::int(-i)),
                    Token::Float(f) => Pattern::Literal(Udm::float(-f)),
                    _ => return Err(self.unexpected("a number after '-' in pattern")),
                }
            }
            Token::Identifier(name) => {
                if name.as_ref() == "_" {
                    Pattern::Wildcard
                } else {
                    Pattern::Binding(name.into_owned())
                }
            }
            _ => return Err(self.unexpected("a pattern (literal, '_' or binding)")),
        };
        self.advance()?;
        Ok(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "%utlx 1.0\ninput json\noutput json\n---\n";

    fn parse_body(body: &str) -> Expr {
        let source = format!("{}{}", HEADER, body);
        parse_program(&source).expect("parse failure").body
    }

    #[test]
    fn parses_single_input_header() {
        let program = parse_program(&format!("{}1", HEADER)).unwrap();
        assert_eq!(program.header.version, "1.0");
        assert_eq!(program.header.inputs.len(), 1);
        assert_eq!(program.header.inputs[0].name, "input");
        assert_eq!(program.header.inputs[0].format, Format::Json);
        assert_eq!(program.header.output.format, Format::Json);
    }

    #[test]
    fn parses_multi_input_header_with_options() {
        let source = "%utlx 1.0\ninput: customers xml, orders csv { headers: false, delimiter: \";\" }\noutput json { pretty: true, indent: 4 }\n---\n1";
        let program = parse_program(source).unwrap();
        assert_eq!(program.header.inputs.len(), 2);
        assert_eq!(program.header.inputs[0].name, "customers");
        assert_eq!(program.header.inputs[1].format, Format::Csv);
        assert!(!program.header.inputs[1].options.headers);
        assert_eq!(program.header.inputs[1].options.delimiter, ";");
        assert!(program.header.output.options.pretty);
        assert_eq!(program.header.output.options.indent, 4);
    }

    #[test]
    fn rejects_unknown_option() {
        let source = "%utlx 1.0\ninput json { banana: true }\noutput json\n---\n1";
        let err = parse_program(source).unwrap_err();
        assert!(matches!(err, EngineError::Header { .. }));
    }

    #[test]
    fn rejects_schema_output() {
        let source = "%utlx 1.0\ninput json\noutput xsd\n---\n1";
        assert!(parse_program(source).is_err());
    }

    #[test]
    fn rejects_missing_directive() {
        assert!(parse_program("input json\noutput json\n---\n1").is_err());
    }

    #[test]
    fn precedence_of_arithmetic() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse_body("1 + 2 * 3");
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => {
                assert!(matches!(
                    *right,
                    Expr::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn power_is_right_associative() {
        let expr = parse_body("2 ** 3 ** 2");
        match expr {
            Expr::Binary {
                op: BinaryOp::Pow,
                left,
                right,
                ..
            } => {
                assert!(matches!(*left, Expr::Literal(_)));
                assert!(matches!(
                    *right,
                    Expr::Binary {
                        op: BinaryOp::Pow,
                        ..
                    }
                ));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn pipe_binds_loosest() {
        let expr = parse_body("$input.items |> map(i => i.price)");
        assert!(matches!(expr, Expr::Pipe { .. }));
    }

    #[test]
    fn lambda_forms() {
        assert!(matches!(parse_body("x => x"), Expr::Lambda { .. }));
        assert!(matches!(parse_body("(a, b) => a"), Expr::Lambda { .. }));
        assert!(matches!(parse_body("() => 1"), Expr::Lambda { .. }));
        // parenthesised expression still works
        assert!(matches!(parse_body("(1 + 2)"), Expr::Binary { .. }));
    }

    #[test]
    fn attribute_and_metadata_access() {
        assert!(matches!(parse_body("$input.@id"), Expr::Attribute { .. }));
        assert!(matches!(
            parse_body("$input.__metadata"),
            Expr::MetadataAccess { .. }
        ));
        assert!(matches!(parse_body("$input?.a"), Expr::SafeNav { .. }));
    }

    #[test]
    fn object_literal_with_let_and_spread() {
        let expr = parse_body("{ let x = 1; a: x, ...$input }");
        match expr {
            Expr::ObjectLit(items) => {
                assert_eq!(items.len(), 3);
                assert!(matches!(items[0], ObjectItem::Let { .. }));
                assert!(matches!(items[1], ObjectItem::Field { .. }));
                assert!(matches!(items[2], ObjectItem::Spread(..)));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn match_with_guard_and_wildcard() {
        let expr = parse_body("match $input { 1 => \"one\", n if n > 1 => \"many\", _ => \"other\" }");
        match expr {
            Expr::Match { arms, .. } => {
                assert_eq!(arms.len(), 3);
                assert!(arms[1].guard.is_some());
                assert!(matches!(arms[2].pattern, Pattern::Wildcard));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn collects_multiple_member_errors() {
        let source = format!("{}{}", HEADER, "{ a: , b: 2, c: }");
        let mut parser = Parser::new(&source).unwrap();
        assert!(parser.parse().is_err());
        assert!(parser.into_errors().len() >= 2);
    }

    #[test]
    fn ternary_parses_as_conditional() {
        assert!(matches!(parse_body("1 ? 2 : 3"), Expr::If { .. }));
        assert!(matches!(
            parse_body("if (true) 1 else 2"),
            Expr::If { .. }
        ));
    }
}
