//! 表达式词法与语法分析
//!
//! 手写递归下降解析器，自底向上按优先级组合，AST 节点携带源码
//! 位置（1 起始的 行:列），供类型检查与错误报告使用。

use crate::error::{Result, RuleError};
use std::fmt;

/// 源码位置，1 起始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        };
        write!(f, "{}", s)
    }
}

/// 表达式 AST
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal, Span),
    /// 点号分隔的名称链，变量解析与字段访问在检查期拆分
    Path(Vec<String>, Span),
    Unary(UnaryOp, Box<Expr>, Span),
    /// Span 为运算符位置
    Binary(BinaryOp, Box<Expr>, Box<Expr>, Span),
    Call(String, Vec<Expr>, Span),
    List(Vec<Expr>, Span),
    /// 结构化值构造：类型名 + 字段赋值
    StructInit(String, Vec<(String, Expr)>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Self::Literal(_, s)
            | Self::Path(_, s)
            | Self::Unary(_, _, s)
            | Self::Binary(_, _, _, s)
            | Self::Call(_, _, s)
            | Self::List(_, s)
            | Self::StructInit(_, _, s) => *s,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(Literal::Bool(b), _) => write!(f, "{}", b),
            Self::Literal(Literal::Int(i), _) => write!(f, "{}", i),
            Self::Literal(Literal::Float(v), _) => write!(f, "{}", v),
            Self::Literal(Literal::String(s), _) => write!(f, "\"{}\"", s),
            Self::Path(segments, _) => write!(f, "{}", segments.join(".")),
            Self::Unary(op, operand, _) => {
                let symbol = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                };
                if matches!(operand.as_ref(), Self::Binary(..)) {
                    write!(f, "{}({})", symbol, operand)
                } else {
                    write!(f, "{}{}", symbol, operand)
                }
            }
            Self::Binary(op, left, right, _) => {
                let write_side = |f: &mut fmt::Formatter<'_>, side: &Expr| {
                    if matches!(side, Self::Binary(..)) {
                        write!(f, "({})", side)
                    } else {
                        write!(f, "{}", side)
                    }
                };
                write_side(f, left)?;
                write!(f, " {} ", op)?;
                write_side(f, right)
            }
            Self::Call(name, args, _) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Self::List(items, _) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::StructInit(name, fields, _) => {
                write!(f, "{}{{", name)?;
                for (i, (field, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    In,
    OrOr,
    AndAnd,
    EqEq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    span: Span,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn lex(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.bump();
                continue;
            }

            let span = self.span();
            let tok = if c.is_ascii_digit() {
                self.number()?
            } else if c == '"' || c == '\'' {
                self.string()?
            } else if c.is_alphabetic() || c == '_' {
                self.ident()
            } else {
                self.symbol(span)?
            };
            tokens.push(Token { tok, span });
        }

        Ok(tokens)
    }

    fn number(&mut self) -> Result<Tok> {
        let span = self.span();
        let mut text = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }

        // 点号后跟数字才是小数部分，否则留给字段访问
        let mut probe = self.chars.clone();
        if probe.next() == Some('.') && matches!(probe.next(), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
            while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
            }
            let value = text
                .parse::<f64>()
                .map_err(|e| RuleError::ParseError(format!("{}: 无效的数字 '{}': {}", span, text, e)))?;
            Ok(Tok::Float(value))
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|e| RuleError::ParseError(format!("{}: 无效的数字 '{}': {}", span, text, e)))?;
            Ok(Tok::Int(value))
        }
    }

    fn string(&mut self) -> Result<Tok> {
        let span = self.span();
        let quote = self.bump().unwrap();
        let mut text = String::new();

        loop {
            match self.bump() {
                None => {
                    return Err(RuleError::ParseError(format!("{}: 字符串未闭合", span)));
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some(c) if c == quote => text.push(c),
                    Some(c) => {
                        return Err(RuleError::ParseError(format!(
                            "{}: 无效的转义字符 '\\{}'",
                            span, c
                        )));
                    }
                    None => {
                        return Err(RuleError::ParseError(format!("{}: 字符串未闭合", span)));
                    }
                },
                Some(c) => text.push(c),
            }
        }

        Ok(Tok::Str(text))
    }

    fn ident(&mut self) -> Tok {
        let mut text = String::new();
        while matches!(self.chars.peek(), Some(&c) if c.is_alphanumeric() || c == '_') {
            text.push(self.bump().unwrap());
        }
        match text.as_str() {
            "true" => Tok::True,
            "false" => Tok::False,
            "in" => Tok::In,
            _ => Tok::Ident(text),
        }
    }

    fn symbol(&mut self, span: Span) -> Result<Tok> {
        let c = self.bump().unwrap();
        let tok = match c {
            '|' if self.chars.peek() == Some(&'|') => {
                self.bump();
                Tok::OrOr
            }
            '&' if self.chars.peek() == Some(&'&') => {
                self.bump();
                Tok::AndAnd
            }
            '=' if self.chars.peek() == Some(&'=') => {
                self.bump();
                Tok::EqEq
            }
            '!' if self.chars.peek() == Some(&'=') => {
                self.bump();
                Tok::Ne
            }
            '<' if self.chars.peek() == Some(&'=') => {
                self.bump();
                Tok::Le
            }
            '>' if self.chars.peek() == Some(&'=') => {
                self.bump();
                Tok::Ge
            }
            '<' => Tok::Lt,
            '>' => Tok::Gt,
            '!' => Tok::Bang,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            ',' => Tok::Comma,
            ':' => Tok::Colon,
            '.' => Tok::Dot,
            other => {
                return Err(RuleError::ParseError(format!(
                    "{}: 意外的字符 '{}'",
                    span, other
                )));
            }
        };
        Ok(tok)
    }
}

/// 解析一条表达式
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = Lexer::new(source).lex()?;
    if tokens.is_empty() {
        return Err(RuleError::ParseError("空表达式".to_string()));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        return Err(RuleError::ParseError(format!(
            "{}: 多余的输入",
            token.span
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// 当前 token 匹配时消费并返回其位置
    fn eat(&mut self, tok: &Tok) -> Option<Span> {
        match self.peek() {
            Some(t) if &t.tok == tok => {
                let span = t.span;
                self.pos += 1;
                Some(span)
            }
            _ => None,
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<Span> {
        match self.peek() {
            Some(t) if t.tok == tok => {
                let span = t.span;
                self.pos += 1;
                Ok(span)
            }
            Some(t) => Err(RuleError::ParseError(format!(
                "{}: 期望 {}",
                t.span, what
            ))),
            None => Err(RuleError::ParseError(format!("表达式意外结束, 期望 {}", what))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while let Some(span) = self.eat(&Tok::OrOr) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        while let Some(span) = self.eat(&Tok::AndAnd) {
            let right = self.parse_comparison()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::EqEq) => BinaryOp::Eq,
                Some(Tok::Ne) => BinaryOp::Ne,
                Some(Tok::Lt) => BinaryOp::Lt,
                Some(Tok::Le) => BinaryOp::Le,
                Some(Tok::Gt) => BinaryOp::Gt,
                Some(Tok::Ge) => BinaryOp::Ge,
                Some(Tok::In) => BinaryOp::In,
                _ => break,
            };
            let span = self.bump().unwrap().span;
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                _ => break,
            };
            let span = self.bump().unwrap().span;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::Star) => BinaryOp::Mul,
                Some(Tok::Slash) => BinaryOp::Div,
                Some(Tok::Percent) => BinaryOp::Mod,
                _ => break,
            };
            let span = self.bump().unwrap().span;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(span) = self.eat(&Tok::Bang) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand), span));
        }
        if let Some(span) = self.eat(&Tok::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand), span));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = match self.bump() {
            Some(token) => token,
            None => {
                return Err(RuleError::ParseError(
                    "表达式意外结束".to_string(),
                ));
            }
        };
        let span = token.span;

        match token.tok {
            Tok::Int(v) => Ok(Expr::Literal(Literal::Int(v), span)),
            Tok::Float(v) => Ok(Expr::Literal(Literal::Float(v), span)),
            Tok::Str(v) => Ok(Expr::Literal(Literal::String(v), span)),
            Tok::True => Ok(Expr::Literal(Literal::Bool(true), span)),
            Tok::False => Ok(Expr::Literal(Literal::Bool(false), span)),
            Tok::LParen => {
                let expr = self.parse_or()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(expr)
            }
            Tok::LBracket => {
                let mut items = Vec::new();
                if self.eat(&Tok::RBracket).is_none() {
                    loop {
                        items.push(self.parse_or()?);
                        if self.eat(&Tok::Comma).is_none() {
                            break;
                        }
                    }
                    self.expect(Tok::RBracket, "']'")?;
                }
                Ok(Expr::List(items, span))
            }
            Tok::Ident(first) => self.parse_path(first, span),
            other => Err(RuleError::ParseError(format!(
                "{}: 意外的 token {:?}",
                span, other
            ))),
        }
    }

    /// 点号名称链，再根据后继决定是函数调用、结构构造还是变量引用
    fn parse_path(&mut self, first: String, span: Span) -> Result<Expr> {
        let mut segments = vec![first];
        while self.eat(&Tok::Dot).is_some() {
            match self.bump() {
                Some(Token {
                    tok: Tok::Ident(segment),
                    ..
                }) => segments.push(segment),
                Some(t) => {
                    return Err(RuleError::ParseError(format!(
                        "{}: 点号后期望标识符",
                        t.span
                    )));
                }
                None => {
                    return Err(RuleError::ParseError(
                        "表达式意外结束, 点号后期望标识符".to_string(),
                    ));
                }
            }
        }

        if self.peek().map(|t| &t.tok) == Some(&Tok::LParen) {
            if segments.len() != 1 {
                return Err(RuleError::ParseError(format!(
                    "{}: 不支持方法调用 '{}'",
                    span,
                    segments.join(".")
                )));
            }
            self.bump();
            let mut args = Vec::new();
            if self.eat(&Tok::RParen).is_none() {
                loop {
                    args.push(self.parse_or()?);
                    if self.eat(&Tok::Comma).is_none() {
                        break;
                    }
                }
                self.expect(Tok::RParen, "')'")?;
            }
            return Ok(Expr::Call(segments.pop().unwrap(), args, span));
        }

        if self.eat(&Tok::LBrace).is_some() {
            let mut fields = Vec::new();
            if self.eat(&Tok::RBrace).is_none() {
                loop {
                    let field = match self.bump() {
                        Some(Token {
                            tok: Tok::Ident(name),
                            ..
                        }) => name,
                        Some(t) => {
                            return Err(RuleError::ParseError(format!(
                                "{}: 期望字段名",
                                t.span
                            )));
                        }
                        None => {
                            return Err(RuleError::ParseError(
                                "表达式意外结束, 期望字段名".to_string(),
                            ));
                        }
                    };
                    self.expect(Tok::Colon, "':'")?;
                    let value = self.parse_or()?;
                    fields.push((field, value));
                    if self.eat(&Tok::Comma).is_none() {
                        break;
                    }
                }
                self.expect(Tok::RBrace, "'}'")?;
            }
            return Ok(Expr::StructInit(segments.join("."), fields, span));
        }

        Ok(Expr::Path(segments, span))
    }
}
