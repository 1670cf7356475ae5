//! 表达式评估能力接口
//!
//! 引擎对具体表达式语言的唯一依赖。任何满足本契约的实现都可以
//! 插入：`compile` 做静态类型检查并产出不透明编译产物，`evaluate`
//! 对运行期数据快照求值。内置实现见 [`crate::expr`]。

use crate::error::Result;
use crate::schema::{Schema, ValueType};
use crate::value::{DataSet, Value};

/// 一次求值的产出
#[derive(Debug, Clone)]
pub struct Evaluated {
    pub value: Value,
    /// 评估追踪文本，仅当编译产物带插桩且本次调用请求诊断时存在
    pub diagnostics: Option<String>,
}

impl Evaluated {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            diagnostics: None,
        }
    }
}

/// 表达式评估器
#[cfg_attr(test, mockall::automock(type Program = String;))]
pub trait Evaluator: Send + Sync {
    /// 编译产物，引擎按节点缓存、独占持有
    type Program: Send + Sync;

    /// 把表达式按模式做静态类型检查并编译
    ///
    /// 同一表达式内相互独立的类型错误应一并报告，每条带源码位置。
    /// 给出 `result_type` 时，表达式的静态输出类型不可赋值给它视为
    /// 编译错误。`collect_diagnostics` 为 true 时产物携带评估追踪
    /// 插桩。
    fn compile(
        &self,
        expr: &str,
        schema: &Schema,
        result_type: Option<&ValueType>,
        collect_diagnostics: bool,
    ) -> Result<Self::Program>;

    /// 对数据快照求值
    ///
    /// `self_value` 在表达式内以保留名 `self` 可见。运行期失败
    /// （变量未绑定、类型强制失败、除零等）以 Err 返回。
    fn evaluate(
        &self,
        program: &Self::Program,
        data: &DataSet,
        self_value: Option<&Value>,
        return_diagnostics: bool,
    ) -> Result<Evaluated>;
}
