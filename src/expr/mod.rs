//! 内置表达式语言
//!
//! [`crate::Evaluator`] 契约的自带实现：编译阶段做词法/语法分析
//! 与按模式的静态类型检查（一次报告全部独立错误），求值阶段对
//! 数据快照做树遍历解释。支持布尔/比较/算术运算、成员检查 `in`、
//! 点号字段访问、结构化值构造，以及 `size` / `matches` /
//! `timestamp` / `duration` 内置函数。
//!
//! 模式里引用的结构化类型需要先在 [`TypeRegistry`] 注册字段元
//! 数据，再交给 [`ExprEvaluator`]。

mod checker;
mod interp;
mod parser;

use crate::error::{Result, RuleError};
use crate::evaluator::{Evaluated, Evaluator};
use crate::schema::{Schema, ValueType};
use crate::value::{DataSet, Value};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;

/// 结构化类型的字段元数据
#[derive(Debug, Clone)]
pub struct StructType {
    pub name: String,
    pub fields: IndexMap<String, ValueType>,
}

impl StructType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: ValueType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }
}

/// 结构类型注册表
///
/// 为模式中声明的每个结构化类型名提供字段元数据，供字段访问与
/// 构造表达式做编译期检查。
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, StructType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, struct_type: StructType) -> Self {
        self.register(struct_type);
        self
    }

    pub fn register(&mut self, struct_type: StructType) {
        self.types.insert(struct_type.name.clone(), struct_type);
    }

    pub fn get(&self, name: &str) -> Option<&StructType> {
        self.types.get(name)
    }
}

/// 编译产物：AST + 静态输出类型 + 插桩标记
pub struct Program {
    source: String,
    ast: parser::Expr,
    result_type: ValueType,
    instrumented: bool,
}

impl Program {
    /// 表达式的静态输出类型
    pub fn result_type(&self) -> &ValueType {
        &self.result_type
    }
}

/// 已编译正则的进程内缓存，避免每次求值重复编译
pub(crate) struct RegexCache {
    cache: Mutex<HashMap<String, Regex>>,
}

impl RegexCache {
    pub(crate) fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, pattern: &str) -> Result<Regex> {
        let mut cache = self.cache.lock();
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern).map_err(|e| {
            RuleError::ExecutionError(format!("无效的正则表达式 '{}': {}", pattern, e))
        })?;
        cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

/// 内置表达式评估器
pub struct ExprEvaluator {
    registry: TypeRegistry,
    regexes: RegexCache,
}

impl ExprEvaluator {
    pub fn new() -> Self {
        Self::with_types(TypeRegistry::default())
    }

    pub fn with_types(registry: TypeRegistry) -> Self {
        Self {
            registry,
            regexes: RegexCache::new(),
        }
    }
}

impl Default for ExprEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for ExprEvaluator {
    type Program = Program;

    fn compile(
        &self,
        expr: &str,
        schema: &Schema,
        result_type: Option<&ValueType>,
        collect_diagnostics: bool,
    ) -> Result<Program> {
        schema.validate()?;

        let ast = parser::parse(expr)?;
        let inferred = checker::Checker::new(schema, &self.registry)
            .check(&ast)
            .map_err(|issues| {
                let detail = issues
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                RuleError::CompileError(detail)
            })?;

        if let Some(declared) = result_type {
            if !declared.assignable_from(&inferred) {
                return Err(RuleError::CompileError(format!(
                    "声明的结果类型 {} 与表达式类型 {} 不兼容",
                    declared, inferred
                )));
            }
        }

        Ok(Program {
            source: expr.to_string(),
            ast,
            result_type: inferred,
            instrumented: collect_diagnostics,
        })
    }

    fn evaluate(
        &self,
        program: &Program,
        data: &DataSet,
        self_value: Option<&Value>,
        return_diagnostics: bool,
    ) -> Result<Evaluated> {
        let tracing = program.instrumented && return_diagnostics;
        let mut interp = interp::Interp::new(data, self_value, &self.regexes, tracing);
        let value = interp.eval(&program.ast)?;

        let diagnostics = interp.into_trace().map(|lines| {
            let mut text = format!("表达式: {}\n", program.source);
            for line in &lines {
                text.push_str(line);
                text.push('\n');
            }
            text.push_str(&format!("结果 = {}", value));
            text
        });

        Ok(Evaluated { value, diagnostics })
    }
}

/// 解析 RFC 3339 时间戳，退而支持纯日期（按 UTC 零点）
pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }
    Err(RuleError::ExecutionError(format!(
        "无法解析时间戳: '{}'",
        text
    )))
}

/// 解析 "4320h" / "1h30m" / "90s" / "250ms" 形式的时长
pub(crate) fn parse_duration(text: &str) -> Result<Duration> {
    let trimmed = text.trim();
    let (negative, mut rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if rest.is_empty() {
        return Err(RuleError::ExecutionError(format!(
            "无法解析时长: '{}'",
            text
        )));
    }

    let mut total_ms = 0.0f64;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(digits);
        let unit_len = tail.find(|c: char| !c.is_alphabetic()).unwrap_or(tail.len());
        let (unit, remainder) = tail.split_at(unit_len);

        let value: f64 = number.parse().map_err(|_| {
            RuleError::ExecutionError(format!("无法解析时长: '{}'", text))
        })?;
        let factor = match unit {
            "h" => 3_600_000.0,
            "m" => 60_000.0,
            "s" => 1_000.0,
            "ms" => 1.0,
            _ => {
                return Err(RuleError::ExecutionError(format!(
                    "无效的时长单位 '{}' ('{}')",
                    unit, text
                )));
            }
        };
        total_ms += value * factor;
        rest = remainder;
    }

    let ms = if negative { -total_ms } else { total_ms };
    Ok(Duration::milliseconds(ms.round() as i64))
}
