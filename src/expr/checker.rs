//! 表达式静态类型检查
//!
//! 按模式声明的变量类型对 AST 做自底向上的类型推导。遇到错误
//! 记录后继续推导其余子表达式，同一表达式内相互独立的类型错误
//! 一次全部报告；已出错的子表达式不再参与上层判断，避免级联
//! 重复报告。

use super::parser::{BinaryOp, Expr, Literal, Span, UnaryOp};
use super::{parse_duration, parse_timestamp, TypeRegistry};
use crate::schema::{Schema, ValueType};
use std::fmt;

/// 一条带位置的类型检查问题
#[derive(Debug, Clone)]
pub struct CheckIssue {
    pub span: Span,
    pub message: String,
}

impl fmt::Display for CheckIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.span, self.message)
    }
}

pub struct Checker<'a> {
    schema: &'a Schema,
    registry: &'a TypeRegistry,
    issues: Vec<CheckIssue>,
}

impl<'a> Checker<'a> {
    pub fn new(schema: &'a Schema, registry: &'a TypeRegistry) -> Self {
        Self {
            schema,
            registry,
            issues: Vec::new(),
        }
    }

    /// 检查整条表达式，返回其静态输出类型或全部问题
    pub fn check(mut self, expr: &Expr) -> Result<ValueType, Vec<CheckIssue>> {
        match self.infer(expr) {
            Some(ty) if self.issues.is_empty() => Ok(ty),
            _ => {
                if self.issues.is_empty() {
                    self.issue(expr.span(), "类型推断失败".to_string());
                }
                Err(self.issues)
            }
        }
    }

    fn issue(&mut self, span: Span, message: String) {
        self.issues.push(CheckIssue { span, message });
    }

    /// 推导一个子表达式的类型；返回 None 表示其内部已记录问题
    fn infer(&mut self, expr: &Expr) -> Option<ValueType> {
        match expr {
            Expr::Literal(literal, _) => Some(match literal {
                Literal::Bool(_) => ValueType::Bool,
                Literal::Int(_) => ValueType::Int,
                Literal::Float(_) => ValueType::Float,
                Literal::String(_) => ValueType::String,
            }),
            Expr::Path(segments, span) => self.infer_path(segments, *span),
            Expr::Unary(op, operand, span) => {
                let ty = self.infer(operand)?;
                self.unary_type(*op, ty, *span)
            }
            Expr::Binary(op, left, right, span) => {
                // 两侧都先推导，保证独立错误各自报告
                let lt = self.infer(left);
                let rt = self.infer(right);
                self.binary_type(*op, lt?, rt?, *span)
            }
            Expr::Call(name, args, span) => self.infer_call(name, args, *span),
            Expr::List(items, span) => self.infer_list(items, *span),
            Expr::StructInit(name, fields, span) => self.infer_struct(name, fields, *span),
        }
    }

    fn infer_path(&mut self, segments: &[String], span: Span) -> Option<ValueType> {
        // 最长声明前缀决定变量，剩余段是字段访问
        let mut root: Option<(ValueType, usize)> = None;
        for k in (1..=segments.len()).rev() {
            let name = segments[..k].join(".");
            if let Some(ty) = self.schema.type_of(&name) {
                root = Some((ty.clone(), k));
                break;
            }
        }

        let (mut current, consumed) = match root {
            Some(found) => found,
            None => {
                self.issue(span, format!("未声明的变量 '{}'", segments.join(".")));
                return None;
            }
        };

        for segment in &segments[consumed..] {
            current = self.field_type(&current, segment, span)?;
        }
        Some(current)
    }

    fn field_type(&mut self, current: &ValueType, field: &str, span: Span) -> Option<ValueType> {
        match current {
            ValueType::Struct { name } => {
                let Some(struct_type) = self.registry.get(name) else {
                    self.issue(span, format!("未注册的结构类型 '{}'", name));
                    return None;
                };
                match struct_type.fields.get(field).cloned() {
                    Some(ty) => Some(ty),
                    None => {
                        self.issue(span, format!("类型 '{}' 没有字段 '{}'", name, field));
                        None
                    }
                }
            }
            ValueType::Map { key, value } => {
                if **key == ValueType::String {
                    Some((**value).clone())
                } else {
                    self.issue(span, format!("映射键类型 {} 不支持字段访问", key));
                    None
                }
            }
            other => {
                self.issue(span, format!("类型 '{}' 不支持字段访问 '{}'", other, field));
                None
            }
        }
    }

    fn unary_type(&mut self, op: UnaryOp, ty: ValueType, span: Span) -> Option<ValueType> {
        match (op, &ty) {
            (UnaryOp::Not, ValueType::Bool) => Some(ValueType::Bool),
            (UnaryOp::Neg, ValueType::Int | ValueType::Float | ValueType::Duration) => Some(ty),
            (UnaryOp::Not, other) => {
                self.issue(span, format!("运算符 '!' 需要 bool 操作数, 得到 {}", other));
                None
            }
            (UnaryOp::Neg, other) => {
                self.issue(span, format!("运算符 '-' 不支持 {}", other));
                None
            }
        }
    }

    fn binary_type(
        &mut self,
        op: BinaryOp,
        lt: ValueType,
        rt: ValueType,
        span: Span,
    ) -> Option<ValueType> {
        use ValueType::*;

        let numeric = lt.is_numeric() && rt.is_numeric();
        let promoted = if matches!((&lt, &rt), (Int, Int)) { Int } else { Float };

        let result = match op {
            BinaryOp::Or | BinaryOp::And => match (&lt, &rt) {
                (Bool, Bool) => Some(Bool),
                _ => None,
            },
            BinaryOp::Eq | BinaryOp::Ne => {
                if lt == rt || numeric {
                    Some(Bool)
                } else {
                    None
                }
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                if numeric || (lt == rt && matches!(lt, String | Timestamp | Duration)) {
                    Some(Bool)
                } else {
                    None
                }
            }
            BinaryOp::In => match &rt {
                List { element } => {
                    if **element == lt || (element.is_numeric() && lt.is_numeric()) {
                        Some(Bool)
                    } else {
                        None
                    }
                }
                Map { key, .. } => {
                    if **key == lt {
                        Some(Bool)
                    } else {
                        None
                    }
                }
                _ => None,
            },
            BinaryOp::Add => match (&lt, &rt) {
                _ if numeric => Some(promoted),
                (String, String) => Some(String),
                (Timestamp, Duration) | (Duration, Timestamp) => Some(Timestamp),
                (Duration, Duration) => Some(Duration),
                _ => None,
            },
            BinaryOp::Sub => match (&lt, &rt) {
                _ if numeric => Some(promoted),
                (Timestamp, Timestamp) => Some(Duration),
                (Timestamp, Duration) => Some(Timestamp),
                (Duration, Duration) => Some(Duration),
                _ => None,
            },
            BinaryOp::Mul | BinaryOp::Div => {
                if numeric {
                    Some(promoted)
                } else {
                    None
                }
            }
            BinaryOp::Mod => match (&lt, &rt) {
                (Int, Int) => Some(Int),
                _ => None,
            },
        };

        if result.is_none() {
            self.issue(span, format!("运算符 '{}' 不支持 ({}, {})", op, lt, rt));
        }
        result
    }

    fn infer_call(&mut self, name: &str, args: &[Expr], span: Span) -> Option<ValueType> {
        let arg_types: Vec<Option<ValueType>> = args.iter().map(|a| self.infer(a)).collect();

        let expect_args = |checker: &mut Self, n: usize| -> bool {
            if args.len() == n {
                true
            } else {
                checker.issue(span, format!("函数 {}() 需要 {} 个参数, 得到 {}", name, n, args.len()));
                false
            }
        };

        match name {
            "size" => {
                if !expect_args(self, 1) {
                    return None;
                }
                match arg_types[0].as_ref()? {
                    ValueType::String | ValueType::List { .. } | ValueType::Map { .. } => {
                        Some(ValueType::Int)
                    }
                    other => {
                        self.issue(span, format!("size() 不支持 {}", other));
                        None
                    }
                }
            }
            "matches" => {
                if !expect_args(self, 2) {
                    return None;
                }
                for ty in arg_types.iter().flatten() {
                    if *ty != ValueType::String {
                        self.issue(span, format!("matches() 需要 string 参数, 得到 {}", ty));
                        return None;
                    }
                }
                // 字面量模式在编译期预检
                if let Expr::Literal(Literal::String(pattern), pspan) = &args[1] {
                    if let Err(e) = regex::Regex::new(pattern) {
                        self.issue(*pspan, format!("无效的正则表达式 '{}': {}", pattern, e));
                        return None;
                    }
                }
                Some(ValueType::Bool)
            }
            "timestamp" => {
                if !expect_args(self, 1) {
                    return None;
                }
                if arg_types[0].as_ref()? != &ValueType::String {
                    self.issue(span, "timestamp() 需要 string 参数".to_string());
                    return None;
                }
                if let Expr::Literal(Literal::String(text), pspan) = &args[0] {
                    if let Err(e) = parse_timestamp(text) {
                        self.issue(*pspan, e.to_string());
                        return None;
                    }
                }
                Some(ValueType::Timestamp)
            }
            "duration" => {
                if !expect_args(self, 1) {
                    return None;
                }
                if arg_types[0].as_ref()? != &ValueType::String {
                    self.issue(span, "duration() 需要 string 参数".to_string());
                    return None;
                }
                if let Expr::Literal(Literal::String(text), pspan) = &args[0] {
                    if let Err(e) = parse_duration(text) {
                        self.issue(*pspan, e.to_string());
                        return None;
                    }
                }
                Some(ValueType::Duration)
            }
            _ => {
                self.issue(span, format!("未知函数 '{}'", name));
                None
            }
        }
    }

    fn infer_list(&mut self, items: &[Expr], span: Span) -> Option<ValueType> {
        if items.is_empty() {
            self.issue(span, "无法推断空列表的元素类型".to_string());
            return None;
        }

        let mut element: Option<ValueType> = None;
        for item in items {
            let ty = self.infer(item)?;
            match &element {
                None => element = Some(ty),
                Some(first) if *first == ty => {}
                Some(first) => {
                    self.issue(
                        item.span(),
                        format!("列表元素类型不一致: {} 与 {}", first, ty),
                    );
                    return None;
                }
            }
        }
        element.map(ValueType::list)
    }

    fn infer_struct(
        &mut self,
        name: &str,
        fields: &[(String, Expr)],
        span: Span,
    ) -> Option<ValueType> {
        let Some(struct_type) = self.registry.get(name).cloned() else {
            self.issue(span, format!("未注册的结构类型 '{}'", name));
            return None;
        };

        let mut seen = std::collections::HashSet::new();
        for (field, value) in fields {
            if !seen.insert(field.as_str()) {
                self.issue(value.span(), format!("字段 '{}' 重复赋值", field));
                continue;
            }
            let inferred = self.infer(value);
            match struct_type.fields.get(field) {
                None => {
                    self.issue(
                        value.span(),
                        format!("结构类型 '{}' 没有字段 '{}'", name, field),
                    );
                }
                Some(declared) => {
                    if let Some(inferred) = inferred {
                        if !declared.assignable_from(&inferred) {
                            self.issue(
                                value.span(),
                                format!(
                                    "字段 '{}' 期望 {}, 得到 {}",
                                    field, declared, inferred
                                ),
                            );
                        }
                    }
                }
            }
        }

        Some(ValueType::structure(name))
    }
}
