//! 层级规则评估引擎
//!
//! 维护一片带名称的嵌套规则树：每个节点携带一条针对声明模式的
//! 类型化表达式，加入时整树编译并聚合全部编译错误，评估时对运行
//! 期数据快照按声明顺序递归求值，产出与规则树同构的结果树。典型
//! 用途是策略 / 资格判定，叶子检查组合成父级结论。
//!
//! 提供：
//! - 规则树的程序化构建与 JSON 定义（[`Rule`]）
//! - 编译期静态类型检查，一次报告所有失败节点（[`Engine::add_rule`]）
//! - 子节点短路选项与诊断追踪（[`EvalOptions`] / [`EngineOptions`]）
//! - 共享引擎实例的并发加入与评估，同 ID 整树原子替换
//!
//! 表达式语言经由 [`Evaluator`] 能力接口接入，任何满足契约的实现
//! 可互换；内置实现见 [`expr`]。

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod models;
pub mod schema;
pub mod value;

pub use engine::{Engine, EngineOptions, EvalParams};
pub use error::{CompileErrors, CompileFailure, Result, RuleError};
pub use evaluator::{Evaluated, Evaluator};
pub use expr::{ExprEvaluator, StructType, TypeRegistry};
pub use models::{EvalOptions, EvaluationResult, Rule};
pub use schema::{DataElement, Schema, ValueType};
pub use value::{DataSet, StructValue, Value};
