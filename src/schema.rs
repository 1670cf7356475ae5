//! 数据模式定义
//!
//! Schema 声明某个规则节点的表达式可见的全部变量及其语义类型，
//! 仅在编译期用于静态类型检查，运行期不再参与。

use crate::error::{Result, RuleError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// 变量的语义类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    String,
    List {
        element: Box<ValueType>,
    },
    Map {
        key: Box<ValueType>,
        value: Box<ValueType>,
    },
    Timestamp,
    Duration,
    /// 结构化类型，按名称到类型注册表中解析字段元数据
    Struct {
        name: String,
    },
}

impl ValueType {
    /// 构造列表类型
    pub fn list(element: ValueType) -> Self {
        Self::List {
            element: Box::new(element),
        }
    }

    /// 构造映射类型
    pub fn map(key: ValueType, value: ValueType) -> Self {
        Self::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// 构造结构化类型
    pub fn structure(name: impl Into<String>) -> Self {
        Self::Struct { name: name.into() }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// 推导类型 `inferred` 是否可赋给声明类型 `self`
    ///
    /// 仅允许精确匹配和 int 到 float 的放宽。
    pub fn assignable_from(&self, inferred: &ValueType) -> bool {
        self == inferred || (matches!(self, Self::Float) && matches!(inferred, Self::Int))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::List { element } => write!(f, "list<{}>", element),
            Self::Map { key, value } => write!(f, "map<{}, {}>", key, value),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Duration => write!(f, "duration"),
            Self::Struct { name } => write!(f, "{}", name),
        }
    }
}

/// 模式中的一个变量声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataElement {
    pub name: String,
    #[serde(rename = "type")]
    pub element_type: ValueType,
}

impl DataElement {
    pub fn new(name: impl Into<String>, element_type: ValueType) -> Self {
        Self {
            name: name.into(),
            element_type,
        }
    }
}

/// 一个规则节点可见的变量集合，声明顺序保留
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub elements: Vec<DataElement>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个变量声明（构建器风格）
    pub fn with_element(mut self, name: impl Into<String>, element_type: ValueType) -> Self {
        self.elements.push(DataElement::new(name, element_type));
        self
    }

    /// 按名称查找变量类型
    pub fn type_of(&self, name: &str) -> Option<&ValueType> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.element_type)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// 校验模式结构：变量名非空且不重复
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for element in &self.elements {
            if element.name.is_empty() {
                return Err(RuleError::InvalidRule("模式变量名不能为空".to_string()));
            }
            if !seen.insert(element.name.as_str()) {
                return Err(RuleError::InvalidRule(format!(
                    "模式变量名重复: {}",
                    element.name
                )));
            }
        }
        Ok(())
    }
}
