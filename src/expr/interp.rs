//! 表达式求值
//!
//! 对已通过类型检查的 AST 做树遍历求值。静态检查挡掉的是类型
//! 错误，运行期仍可能失败：变量未绑定、整数除零、溢出。失败
//! 一律以 Err 返回，由引擎中止整个评估调用。

use super::parser::{BinaryOp, Expr, Literal, UnaryOp};
use super::{parse_duration, parse_timestamp, RegexCache};
use crate::error::{Result, RuleError};
use crate::value::{DataSet, StructValue, Value};

pub struct Interp<'a> {
    data: &'a DataSet,
    self_value: Option<&'a Value>,
    regexes: &'a RegexCache,
    /// 启用时逐子表达式记录求值轨迹
    trace: Option<Vec<String>>,
}

impl<'a> Interp<'a> {
    pub fn new(
        data: &'a DataSet,
        self_value: Option<&'a Value>,
        regexes: &'a RegexCache,
        tracing: bool,
    ) -> Self {
        Self {
            data,
            self_value,
            regexes,
            trace: tracing.then(Vec::new),
        }
    }

    pub fn into_trace(self) -> Option<Vec<String>> {
        self.trace
    }

    fn record(&mut self, expr: &Expr, value: &Value) {
        if let Some(trace) = &mut self.trace {
            trace.push(format!("{} = {}", expr, value));
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal, _) => Ok(match literal {
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Expr::Path(segments, _) => {
                let value = self.resolve_path(segments)?;
                self.record(expr, &value);
                Ok(value)
            }
            Expr::Unary(op, operand, _) => {
                let value = self.eval(operand)?;
                let result = self.apply_unary(*op, value)?;
                self.record(expr, &result);
                Ok(result)
            }
            Expr::Binary(BinaryOp::And, left, right, _) => {
                // 与求值顺序一致的短路：左侧已定则右侧不再求值
                let result = if !as_bool(self.eval(left)?)? {
                    Value::Bool(false)
                } else {
                    Value::Bool(as_bool(self.eval(right)?)?)
                };
                self.record(expr, &result);
                Ok(result)
            }
            Expr::Binary(BinaryOp::Or, left, right, _) => {
                let result = if as_bool(self.eval(left)?)? {
                    Value::Bool(true)
                } else {
                    Value::Bool(as_bool(self.eval(right)?)?)
                };
                self.record(expr, &result);
                Ok(result)
            }
            Expr::Binary(op, left, right, _) => {
                let lv = self.eval(left)?;
                let rv = self.eval(right)?;
                let result = apply_binary(*op, lv, rv)?;
                self.record(expr, &result);
                Ok(result)
            }
            Expr::Call(name, args, _) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                let result = self.apply_call(name, values)?;
                self.record(expr, &result);
                Ok(result)
            }
            Expr::List(items, _) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::List(values))
            }
            Expr::StructInit(name, fields, _) => {
                let mut value = StructValue::new(name.clone());
                for (field, field_expr) in fields {
                    let field_value = self.eval(field_expr)?;
                    value.fields.insert(field.clone(), field_value);
                }
                let result = Value::Struct(value);
                self.record(expr, &result);
                Ok(result)
            }
        }
    }

    /// 最长绑定前缀决定变量，剩余段是字段访问
    fn resolve_path(&self, segments: &[String]) -> Result<Value> {
        let mut root: Option<(Value, usize)> = None;
        for k in (1..=segments.len()).rev() {
            let name = segments[..k].join(".");
            if let Some(value) = self.lookup(&name) {
                root = Some((value.clone(), k));
                break;
            }
        }

        let (mut current, consumed) = root.ok_or_else(|| {
            RuleError::ExecutionError(format!("变量未绑定: '{}'", segments.join(".")))
        })?;

        for segment in &segments[consumed..] {
            current = current.field(segment).cloned().ok_or_else(|| {
                RuleError::ExecutionError(format!(
                    "{} 值没有字段 '{}'",
                    current.type_name(),
                    segment
                ))
            })?;
        }
        Ok(current)
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        if name == "self" {
            self.self_value
        } else {
            self.data.get(name)
        }
    }

    fn apply_unary(&self, op: UnaryOp, value: Value) -> Result<Value> {
        match (op, value) {
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Neg, Value::Int(i)) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| RuleError::ExecutionError("整数溢出".to_string())),
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Neg, Value::Duration(d)) => Ok(Value::Duration(-d)),
            (op, value) => Err(RuleError::ExecutionError(format!(
                "一元运算符 {:?} 不支持 {}",
                op,
                value.type_name()
            ))),
        }
    }

    fn apply_call(&self, name: &str, mut args: Vec<Value>) -> Result<Value> {
        match (name, args.len()) {
            ("size", 1) => match &args[0] {
                Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                Value::Map(m) => Ok(Value::Int(m.len() as i64)),
                other => Err(RuleError::ExecutionError(format!(
                    "size() 不支持 {}",
                    other.type_name()
                ))),
            },
            ("matches", 2) => {
                let pattern = expect_string(args.pop().unwrap())?;
                let text = expect_string(args.pop().unwrap())?;
                let regex = self.regexes.get(&pattern)?;
                Ok(Value::Bool(regex.is_match(&text)))
            }
            ("timestamp", 1) => {
                let text = expect_string(args.pop().unwrap())?;
                Ok(Value::Timestamp(parse_timestamp(&text)?))
            }
            ("duration", 1) => {
                let text = expect_string(args.pop().unwrap())?;
                Ok(Value::Duration(parse_duration(&text)?))
            }
            _ => Err(RuleError::ExecutionError(format!(
                "未知函数 '{}' ({} 个参数)",
                name,
                args.len()
            ))),
        }
    }
}

fn as_bool(value: Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(RuleError::ExecutionError(format!(
            "逻辑运算需要 bool, 得到 {}",
            other.type_name()
        ))),
    }
}

fn expect_string(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(RuleError::TypeMismatch {
            expected: "string".to_string(),
            actual: other.type_name().to_string(),
        }),
    }
}

/// 数值比较统一转 f64，避免整数与浮点混合比较失败
fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return (a - b).abs() < f64::EPSILON;
    }
    left == right
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    use Value::*;

    match op {
        BinaryOp::Eq => Ok(Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right)?;
            let pass = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Bool(pass))
        }
        BinaryOp::In => match &right {
            List(items) => Ok(Bool(items.iter().any(|item| values_equal(&left, item)))),
            Map(m) => match &left {
                String(key) => Ok(Bool(m.contains_key(key))),
                other => Err(RuleError::ExecutionError(format!(
                    "映射成员检查需要 string 键, 得到 {}",
                    other.type_name()
                ))),
            },
            other => Err(RuleError::ExecutionError(format!(
                "运算符 'in' 需要 list 或 map, 得到 {}",
                other.type_name()
            ))),
        },
        BinaryOp::Add => match (left, right) {
            (Int(a), Int(b)) => a
                .checked_add(b)
                .map(Int)
                .ok_or_else(|| RuleError::ExecutionError("整数溢出".to_string())),
            (String(a), String(b)) => Ok(String(a + &b)),
            (Timestamp(t), Duration(d)) | (Duration(d), Timestamp(t)) => Ok(Timestamp(t + d)),
            (Duration(a), Duration(b)) => Ok(Duration(a + b)),
            (l, r) => numeric_op(BinaryOp::Add, l, r, |a, b| a + b),
        },
        BinaryOp::Sub => match (left, right) {
            (Int(a), Int(b)) => a
                .checked_sub(b)
                .map(Int)
                .ok_or_else(|| RuleError::ExecutionError("整数溢出".to_string())),
            (Timestamp(a), Timestamp(b)) => Ok(Duration(a - b)),
            (Timestamp(t), Duration(d)) => Ok(Timestamp(t - d)),
            (Duration(a), Duration(b)) => Ok(Duration(a - b)),
            (l, r) => numeric_op(BinaryOp::Sub, l, r, |a, b| a - b),
        },
        BinaryOp::Mul => match (left, right) {
            (Int(a), Int(b)) => a
                .checked_mul(b)
                .map(Int)
                .ok_or_else(|| RuleError::ExecutionError("整数溢出".to_string())),
            (l, r) => numeric_op(BinaryOp::Mul, l, r, |a, b| a * b),
        },
        BinaryOp::Div => match (left, right) {
            (Int(_), Int(0)) => Err(RuleError::ExecutionError("除数为零".to_string())),
            (Int(a), Int(b)) => Ok(Int(a / b)),
            (l, r) => numeric_op(BinaryOp::Div, l, r, |a, b| a / b),
        },
        BinaryOp::Mod => match (left, right) {
            (Int(_), Int(0)) => Err(RuleError::ExecutionError("除数为零".to_string())),
            (Int(a), Int(b)) => Ok(Int(a % b)),
            (l, r) => Err(binary_type_error(BinaryOp::Mod, &l, &r)),
        },
        BinaryOp::And | BinaryOp::Or => unreachable!("短路运算符在 eval 中处理"),
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return a
            .partial_cmp(&b)
            .ok_or_else(|| RuleError::ExecutionError("数值比较失败 (NaN)".to_string()));
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Ok(a.cmp(b)),
        (Value::Duration(a), Value::Duration(b)) => Ok(a.cmp(b)),
        _ => Err(RuleError::ExecutionError(format!(
            "无法比较 {} 与 {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn numeric_op(op: BinaryOp, left: Value, right: Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(f(a, b))),
        _ => Err(binary_type_error(op, &left, &right)),
    }
}

fn binary_type_error(op: BinaryOp, left: &Value, right: &Value) -> RuleError {
    RuleError::ExecutionError(format!(
        "运算符 '{}' 不支持 ({}, {})",
        op,
        left.type_name(),
        right.type_name()
    ))
}
