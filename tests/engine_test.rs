//! 规则引擎集成测试
//!
//! 覆盖完整工作流：规则树构建 / JSON 加载、整树编译与错误聚合、
//! 递归评估、短路选项、诊断收集、原子替换与并发访问。

use chrono::TimeZone;
use rule_engine::{
    DataSet, Engine, EngineOptions, EvalOptions, EvalParams, ExprEvaluator, Rule, RuleError,
    Schema, StructType, StructValue, TypeRegistry, Value, ValueType,
};
use std::sync::Arc;

fn education_schema() -> Schema {
    Schema::new()
        .with_element("student.ID", ValueType::String)
        .with_element("student.Age", ValueType::Int)
        .with_element("student.GPA", ValueType::Float)
        .with_element("student.Adjustment", ValueType::Float)
        .with_element("student.Status", ValueType::String)
        .with_element("student.Grades", ValueType::list(ValueType::String))
}

fn student_data() -> DataSet {
    let mut data = DataSet::new();
    data.insert("student.ID".to_string(), Value::from("12312"));
    data.insert("student.Age".to_string(), Value::Int(16));
    data.insert("student.GPA".to_string(), Value::Float(2.2));
    data.insert("student.Adjustment".to_string(), Value::Float(2.1));
    data.insert("student.Status".to_string(), Value::from("Enrolled"));
    data.insert(
        "student.Grades".to_string(),
        Value::List(vec![Value::from("A"), Value::from("B"), Value::from("A")]),
    );
    data
}

/// 教育场景规则树：无表达式的分组根节点 + 两个叶子 + 一个孙子
fn education_rules() -> Rule {
    let mut root = Rule::new("student_actions")
        .with_meta(serde_json::json!("d04ab6d9-f59d-9474-5c38-34d65380c612"));

    root.insert_child(
        "honors_student",
        Rule::new("honors_student")
            .with_expr(r#"student.GPA >= 3.6 && student.Status != "Probation" && !("C" in student.Grades)"#)
            .with_schema(education_schema())
            .with_result_type(ValueType::Bool),
    );

    let mut at_risk = Rule::new("at_risk")
        .with_expr(r#"student.GPA < 2.5 || student.Status == "Probation""#)
        .with_schema(education_schema());
    at_risk.insert_child(
        "risk_factor",
        Rule::new("risk_factor")
            .with_expr("2.0 + 6.0")
            .with_schema(Schema::new()),
    );
    root.insert_child("at_risk", at_risk);

    root
}

// ==================== 基础评估 ====================

#[test]
fn test_basic_rules() {
    let engine = Engine::new(ExprEvaluator::new());
    engine.add_rule(education_rules()).unwrap();

    let results = engine.evaluate(&student_data(), "student_actions").unwrap();

    assert_eq!(
        results.meta,
        serde_json::json!("d04ab6d9-f59d-9474-5c38-34d65380c612")
    );
    // 分组根节点自身恒通过
    assert!(results.pass);
    assert!(results.value.is_none());
    // GPA 2.2 不满足荣誉条件
    assert!(!results.child("honors_student").unwrap().pass);
    // GPA < 2.5 命中风险规则
    assert!(results.child("at_risk").unwrap().pass);
    // 非布尔结果只携带值，pass 为 true
    let risk_factor = results.child("at_risk").unwrap().child("risk_factor").unwrap();
    assert!(risk_factor.pass);
    assert_eq!(risk_factor.value, Some(Value::Float(8.0)));

    assert_eq!(results.rules_evaluated, 4);
}

#[test]
fn test_depth_rules_all_children_present() {
    let engine = Engine::new(ExprEvaluator::new());

    // 根表达式 false，四个子节点按声明顺序评估为 [true, false, true, false]
    let mut root = Rule::new("depth_rules")
        .with_expr("student.GPA > 3.5")
        .with_schema(education_schema());
    root.insert_child(
        "a",
        Rule::new("c1").with_expr("student.Adjustment > 0.0").with_schema(education_schema()),
    );
    root.insert_child(
        "b",
        Rule::new("c2").with_expr("student.Adjustment > 3.0").with_schema(education_schema()),
    );
    root.insert_child(
        "c",
        Rule::new("c3").with_expr("student.Adjustment < 2.6").with_schema(education_schema()),
    );
    root.insert_child(
        "d",
        Rule::new("c4").with_expr("student.Adjustment > 3.0").with_schema(education_schema()),
    );
    engine.add_rule(root).unwrap();

    let results = engine.evaluate(&student_data(), "depth_rules").unwrap();

    // 无短路选项时子节点全部出现，父节点自身结论与子节点无关
    assert!(!results.pass);
    assert_eq!(results.results.len(), 4);
    assert_eq!(results.rules_evaluated, 5);
    assert!(results.child("a").unwrap().pass);
    assert!(!results.child("b").unwrap().pass);
    assert!(results.child("c").unwrap().pass);
    assert!(!results.child("d").unwrap().pass);

    // 键顺序与声明顺序一致
    let keys: Vec<&str> = results.results.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["a", "b", "c", "d"]);
}

// ==================== 短路选项 ====================

#[test]
fn test_stop_first_positive_child() {
    let engine = Engine::new(ExprEvaluator::new());

    // 子节点评估为 [true, false, true]；带选项的节点只评估第一个
    let mut with_option = Rule::new("D")
        .with_expr("student.Adjustment > 0.0")
        .with_schema(education_schema())
        .with_options(EvalOptions::stop_on_first_positive());
    with_option.insert_child(
        "d1",
        Rule::new("d1").with_expr("student.Adjustment < 2.6").with_schema(education_schema()),
    );
    with_option.insert_child(
        "d2",
        Rule::new("d2").with_expr("student.Adjustment > 3.0").with_schema(education_schema()),
    );
    with_option.insert_child(
        "d3",
        Rule::new("d3").with_expr("student.Adjustment < 2.6").with_schema(education_schema()),
    );

    let mut without_option = Rule::new("E")
        .with_expr("student.Adjustment > 0.0")
        .with_schema(education_schema());
    without_option.insert_child(
        "e1",
        Rule::new("e1").with_expr("student.Adjustment < 2.6").with_schema(education_schema()),
    );
    without_option.insert_child(
        "e2",
        Rule::new("e2").with_expr("student.Adjustment > 3.0").with_schema(education_schema()),
    );
    without_option.insert_child(
        "e3",
        Rule::new("e3").with_expr("student.Adjustment < 2.6").with_schema(education_schema()),
    );

    let mut root = Rule::new("rule_options")
        .with_expr("student.GPA > 3.5")
        .with_schema(education_schema());
    root.insert_child("A", with_option);
    root.insert_child(
        "B",
        Rule::new("b1").with_expr("student.Adjustment > 3.0").with_schema(education_schema()),
    );
    root.insert_child("E", without_option);
    engine.add_rule(root).unwrap();

    let results = engine.evaluate(&student_data(), "rule_options").unwrap();

    // 带选项的节点：d1 通过后 d2 / d3 被跳过，不出现在结果中
    let a = results.child("A").unwrap();
    assert_eq!(a.results.len(), 1);
    assert!(a.child("d1").unwrap().pass);
    assert!(a.child("d2").is_none());
    assert_eq!(a.rules_evaluated, 2);

    // 选项不跨层继承：兄弟节点 E 的子节点全部评估
    let e = results.child("E").unwrap();
    assert_eq!(e.results.len(), 3);
    assert_eq!(e.rules_evaluated, 4);

    // root(1) + A(2) + B(1) + E(4)
    assert_eq!(results.rules_evaluated, 8);
}

#[test]
fn test_stop_first_negative_child() {
    let engine = Engine::new(ExprEvaluator::new());

    let mut root = Rule::new("gates").with_options(EvalOptions::stop_on_first_negative());
    root.insert_child(
        "g1",
        Rule::new("g1").with_expr("student.Age >= 10").with_schema(education_schema()),
    );
    root.insert_child(
        "g2",
        Rule::new("g2").with_expr("student.GPA >= 3.0").with_schema(education_schema()),
    );
    root.insert_child(
        "g3",
        Rule::new("g3").with_expr(r#"student.Status == "Enrolled""#).with_schema(education_schema()),
    );
    engine.add_rule(root).unwrap();

    let results = engine.evaluate(&student_data(), "gates").unwrap();

    // g2 不通过后 g3 不再评估
    assert_eq!(results.results.len(), 2);
    assert!(results.child("g1").unwrap().pass);
    assert!(!results.child("g2").unwrap().pass);
    assert!(results.child("g3").is_none());
    assert_eq!(results.rules_evaluated, 3);
}

// ==================== 编译错误 ====================

#[test]
fn test_compile_errors_report_every_failure() {
    let engine = Engine::new(ExprEvaluator::new());

    // 两处独立的类型错误须同时报告
    let root = Rule::new("student_actions").add_child(
        Rule::new("honors_student")
            .with_expr(r#"student.GPA != "3.6" && student.Status > 2.0"#)
            .with_schema(education_schema())
            .with_result_type(ValueType::Bool),
    );

    let err = engine.add_rule(root).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("honors_student"));
    assert!(text.contains("1:13"));
    assert!(text.contains("1:40"));

    // 整棵树未安装，评估报规则未找到
    let err = engine.evaluate(&student_data(), "student_actions").unwrap_err();
    assert!(matches!(err, RuleError::RuleNotFound(_)));
}

#[test]
fn test_compile_errors_across_sibling_nodes() {
    let engine = Engine::new(ExprEvaluator::new());

    let root = Rule::new("broken_pair")
        .add_child(
            Rule::new("unknown_var")
                .with_expr("student.Nickname == \"Joey\"")
                .with_schema(education_schema()),
        )
        .add_child(
            Rule::new("bad_compare")
                .with_expr("student.Status > 2.0")
                .with_schema(education_schema()),
        );

    let err = engine.add_rule(root).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("unknown_var"));
    assert!(text.contains("bad_compare"));
}

#[test]
fn test_expression_without_schema_is_compile_error() {
    let engine = Engine::new(ExprEvaluator::new());
    let err = engine
        .add_rule(Rule::new("no_schema").with_expr("1 + 1"))
        .unwrap_err();
    assert!(err.to_string().contains("模式"));
}

#[test]
fn test_result_type_checking() {
    let engine = Engine::new(ExprEvaluator::new());

    // 声明类型与推导类型一致
    engine
        .add_rule(
            Rule::new("should_be_bool")
                .with_expr(r#"student.GPA >= 3.6 && student.Status != "Probation""#)
                .with_schema(education_schema())
                .with_result_type(ValueType::Bool),
        )
        .unwrap();
    engine
        .add_rule(
            Rule::new("should_be_float")
                .with_expr("student.GPA + 1.0")
                .with_schema(education_schema())
                .with_result_type(ValueType::Float),
        )
        .unwrap();

    // 声明 bool 但表达式是 float，编译期报错而非推迟到评估
    let err = engine
        .add_rule(
            Rule::new("negative_should_be_float")
                .with_expr("student.GPA + 1.0")
                .with_schema(education_schema())
                .with_result_type(ValueType::Bool),
        )
        .unwrap_err();
    assert!(matches!(err, RuleError::CompileFailed(_)));
}

// ==================== 结构化类型与 self 绑定 ====================

fn school_registry() -> TypeRegistry {
    TypeRegistry::new()
        .with_type(
            StructType::new("school.Student")
                .with_field("GPA", ValueType::Float)
                .with_field("Status", ValueType::String)
                .with_field("EnrollmentDate", ValueType::Timestamp),
        )
        .with_type(
            StructType::new("school.HonorsConfiguration").with_field("Minimum_GPA", ValueType::Float),
        )
        .with_type(
            StructType::new("school.StudentSummary")
                .with_field("GPA", ValueType::Float)
                .with_field("RiskFactor", ValueType::Float)
                .with_field("Tenure", ValueType::Duration),
        )
}

fn proto_schema() -> Schema {
    Schema::new()
        .with_element("student", ValueType::structure("school.Student"))
        .with_element("now", ValueType::Timestamp)
        .with_element("self", ValueType::structure("school.HonorsConfiguration"))
}

/// 三个叶子规则，meta 预置为期望的评估结论
fn proto_rules(id: &str) -> Rule {
    let mut root = Rule::new(id);
    root.insert_child(
        "a",
        Rule::new("honor_student")
            .with_expr(r#"student.GPA >= self.Minimum_GPA && student.Status != "PROBATION""#)
            .with_schema(proto_schema())
            .with_self_value(StructValue::new("school.HonorsConfiguration").with_field("Minimum_GPA", 3.7))
            .with_meta(serde_json::json!(true)),
    );
    root.insert_child(
        "b",
        Rule::new("at_risk")
            .with_expr(r#"student.GPA < 2.5 || student.Status == "PROBATION""#)
            .with_schema(proto_schema())
            .with_meta(serde_json::json!(false)),
    );
    root.insert_child(
        "c",
        Rule::new("tenure_gt_6months")
            .with_expr(r#"now - student.EnrollmentDate > duration("4320h")"#)
            .with_schema(proto_schema())
            .with_meta(serde_json::json!(true)),
    );
    root
}

fn proto_data() -> DataSet {
    let enrollment = chrono::Utc
        .with_ymd_and_hms(2010, 5, 1, 12, 12, 59)
        .unwrap();
    let student = StructValue::new("school.Student")
        .with_field("GPA", 3.76)
        .with_field("Status", "ENROLLED")
        .with_field("EnrollmentDate", Value::Timestamp(enrollment));

    let mut data = DataSet::new();
    data.insert("student".to_string(), Value::Struct(student));
    data.insert(
        "now".to_string(),
        Value::Timestamp(chrono::Utc.with_ymd_and_hms(2026, 8, 4, 12, 0, 0).unwrap()),
    );
    data
}

#[test]
fn test_struct_data_with_self_binding() {
    let engine = Engine::with_options(
        ExprEvaluator::with_types(school_registry()),
        EngineOptions {
            collect_diagnostics: true,
            force_diagnostics_all_rules: true,
        },
    );

    engine.add_rule(proto_rules("student_actions")).unwrap();
    let results = engine.evaluate(&proto_data(), "student_actions").unwrap();

    assert_eq!(results.results.len(), 3);
    for child in results.results.values() {
        // meta 预置了期望结论
        assert_eq!(child.meta, serde_json::json!(child.pass));
    }
}

#[test]
fn test_struct_construction_rule() {
    let engine = Engine::new(ExprEvaluator::with_types(school_registry()));

    engine
        .add_rule(
            Rule::new("create_summary")
                .with_expr(
                    r#"school.StudentSummary {
                        GPA: student.GPA,
                        RiskFactor: 2.0 + 3.0,
                        Tenure: duration("12h")
                    }"#,
                )
                .with_schema(Schema::new().with_element("student.GPA", ValueType::Float))
                .with_result_type(ValueType::structure("school.StudentSummary")),
        )
        .unwrap();

    let mut data = DataSet::new();
    data.insert("student.GPA".to_string(), Value::Float(1.2));
    let results = engine.evaluate(&data, "create_summary").unwrap();

    // 非布尔结果：pass 为 true，值是构造出的结构
    assert!(results.pass);
    match results.value.as_ref().unwrap() {
        Value::Struct(s) => {
            assert_eq!(s.type_name, "school.StudentSummary");
            assert_eq!(s.fields.get("GPA"), Some(&Value::Float(1.2)));
        }
        other => panic!("意外的结果值: {:?}", other),
    }

    // 声明成其它结构类型是编译错误
    let err = engine
        .add_rule(
            Rule::new("wrong_summary")
                .with_expr("school.StudentSummary { GPA: 1.2 }")
                .with_schema(Schema::new())
                .with_result_type(ValueType::structure("school.HonorsConfiguration")),
        )
        .unwrap_err();
    assert!(matches!(err, RuleError::CompileFailed(_)));
}

// ==================== 诊断收集 ====================

#[test]
fn test_diagnostics_require_engine_option() {
    // 未开启收集时请求诊断恒为错误
    let engine = Engine::with_options(
        ExprEvaluator::with_types(school_registry()),
        EngineOptions::default(),
    );
    engine.add_rule(proto_rules("student_actions")).unwrap();

    let err = engine
        .evaluate_with(&proto_data(), "student_actions", EvalParams::with_diagnostics())
        .unwrap_err();
    assert!(matches!(err, RuleError::DiagnosticsDisabled));
}

#[test]
fn test_diagnostics_on_leaf_rules() {
    let engine = Engine::with_options(
        ExprEvaluator::with_types(school_registry()),
        EngineOptions {
            collect_diagnostics: true,
            force_diagnostics_all_rules: false,
        },
    );
    engine.add_rule(proto_rules("student_actions")).unwrap();

    let results = engine
        .evaluate_with(&proto_data(), "student_actions", EvalParams::with_diagnostics())
        .unwrap();

    assert_eq!(results.rules_evaluated, 4);
    for child in results.results.values() {
        assert_eq!(child.rules_evaluated, 1);
        let trace = child.diagnostics.as_deref().unwrap();
        assert!(!trace.is_empty());
        assert!(trace.contains("结果"));
    }

    // 不请求诊断时不返回
    let results = engine.evaluate(&proto_data(), "student_actions").unwrap();
    for child in results.results.values() {
        assert!(child.diagnostics.is_none());
    }
}

#[test]
fn test_force_diagnostics_all_rules() {
    let engine = Engine::with_options(
        ExprEvaluator::new(),
        EngineOptions {
            collect_diagnostics: true,
            force_diagnostics_all_rules: true,
        },
    );

    // 根节点带表达式也带子节点：force 模式下非叶子同样携带诊断
    let mut root = Rule::new("depth")
        .with_expr("student.GPA > 3.5")
        .with_schema(education_schema());
    root.insert_child(
        "a",
        Rule::new("c1").with_expr("student.Adjustment > 0.0").with_schema(education_schema()),
    );
    engine.add_rule(root).unwrap();

    let results = engine
        .evaluate_with(&student_data(), "depth", EvalParams::with_diagnostics())
        .unwrap();

    assert!(!results.diagnostics.as_deref().unwrap().is_empty());
    assert!(!results.child("a").unwrap().diagnostics.as_deref().unwrap().is_empty());
}

#[test]
fn test_leaf_only_diagnostics_skip_interior_nodes() {
    let engine = Engine::with_options(
        ExprEvaluator::new(),
        EngineOptions {
            collect_diagnostics: true,
            force_diagnostics_all_rules: false,
        },
    );

    let mut root = Rule::new("depth")
        .with_expr("student.GPA > 3.5")
        .with_schema(education_schema());
    root.insert_child(
        "a",
        Rule::new("c1").with_expr("student.Adjustment > 0.0").with_schema(education_schema()),
    );
    engine.add_rule(root).unwrap();

    let results = engine
        .evaluate_with(&student_data(), "depth", EvalParams::with_diagnostics())
        .unwrap();

    // 根节点是内部节点，仅叶子携带诊断
    assert!(results.diagnostics.is_none());
    assert!(results.child("a").unwrap().diagnostics.is_some());
}

// ==================== 规则替换与生命周期 ====================

#[test]
fn test_readd_replaces_tree_atomically() {
    let engine = Engine::new(ExprEvaluator::new());

    engine
        .add_rule(
            Rule::new("threshold")
                .with_expr("student.GPA >= 3.0")
                .with_schema(education_schema()),
        )
        .unwrap();
    assert!(!engine.evaluate(&student_data(), "threshold").unwrap().pass);

    // 同 ID 重新加入：后续评估只看到新树
    engine
        .add_rule(
            Rule::new("threshold")
                .with_expr("student.GPA >= 2.0")
                .with_schema(education_schema()),
        )
        .unwrap();
    assert!(engine.evaluate(&student_data(), "threshold").unwrap().pass);
    assert_eq!(engine.rule_count(), 1);
}

#[test]
fn test_failed_readd_leaves_old_tree_evaluable() {
    let engine = Engine::new(ExprEvaluator::new());

    engine
        .add_rule(
            Rule::new("stable")
                .with_expr("student.GPA < 2.5")
                .with_schema(education_schema()),
        )
        .unwrap();

    // 编译失败的替换不得动到旧树
    let err = engine
        .add_rule(
            Rule::new("stable")
                .with_expr("student.GPA > \"oops\"")
                .with_schema(education_schema()),
        )
        .unwrap_err();
    assert!(matches!(err, RuleError::CompileFailed(_)));

    let results = engine.evaluate(&student_data(), "stable").unwrap();
    assert!(results.pass);
}

#[test]
fn test_remove_rule() {
    let engine = Engine::new(ExprEvaluator::new());
    engine
        .add_rule(
            Rule::new("transient")
                .with_expr("student.Age >= 16")
                .with_schema(education_schema()),
        )
        .unwrap();

    engine.remove_rule("transient").unwrap();
    let err = engine.evaluate(&student_data(), "transient").unwrap_err();
    assert!(matches!(err, RuleError::RuleNotFound(_)));
}

#[test]
fn test_add_rules_batch() {
    let engine = Engine::new(ExprEvaluator::new());

    let err = engine
        .add_rules(vec![
            Rule::new("ok_one")
                .with_expr("student.GPA >= 2.0")
                .with_schema(education_schema()),
            Rule::new("broken")
                .with_expr("student.GPA > \"text\"")
                .with_schema(education_schema()),
            Rule::new("ok_two")
                .with_expr("student.Age >= 10")
                .with_schema(education_schema()),
        ])
        .unwrap_err();

    // 失败树聚合报告，合法树照常安装
    assert!(err.to_string().contains("broken"));
    assert!(engine.contains("ok_one"));
    assert!(engine.contains("ok_two"));
    assert!(!engine.contains("broken"));
}

// ==================== JSON 规则文档 ====================

#[test]
fn test_add_rule_from_json_document() {
    let engine = Engine::new(ExprEvaluator::new());

    let json = r#"
    {
        "id": "honors_check",
        "rules": {
            "honors_student": {
                "id": "honors_student",
                "expr": "student.GPA >= 3.6 && student.Status != 'Probation' && !('C' in student.Grades)",
                "schema": {
                    "elements": [
                        {"name": "student.GPA", "type": {"type": "float"}},
                        {"name": "student.Status", "type": {"type": "string"}},
                        {"name": "student.Grades", "type": {"type": "list", "element": {"type": "string"}}}
                    ]
                },
                "result_type": {"type": "bool"}
            },
            "at_risk": {
                "id": "at_risk",
                "expr": "student.GPA < 2.5 || student.Status == 'Probation'",
                "schema": {
                    "elements": [
                        {"name": "student.GPA", "type": {"type": "float"}},
                        {"name": "student.Status", "type": {"type": "string"}}
                    ]
                },
                "options": {"stop_first_positive_child": false}
            }
        }
    }
    "#;

    let id = engine.add_rule_json(json).unwrap();
    assert_eq!(id, "honors_check");

    let results = engine.evaluate(&student_data(), "honors_check").unwrap();
    assert!(!results.child("honors_student").unwrap().pass);
    assert!(results.child("at_risk").unwrap().pass);
}

#[test]
fn test_invalid_json_document() {
    let engine = Engine::new(ExprEvaluator::new());
    assert!(engine.add_rule_json("not json").is_err());
}

// ==================== 并发访问 ====================

#[test]
fn test_concurrent_add_and_evaluate() {
    let engine = Arc::new(Engine::new(ExprEvaluator::new()));
    let data = student_data();

    engine
        .add_rule(
            Rule::new("shared")
                .with_expr("student.GPA < 2.5")
                .with_schema(education_schema()),
        )
        .unwrap();

    let mut handles = Vec::new();
    for t in 0..4 {
        let engine = Arc::clone(&engine);
        let data = data.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..25 {
                let id = format!("rule-{}-{}", t, i);
                engine
                    .add_rule(
                        Rule::new(&id)
                            .with_expr("student.Adjustment > 0.0")
                            .with_schema(education_schema()),
                    )
                    .unwrap();

                // 自己刚加入的与共享的规则都必须立即可评估
                let own = engine.evaluate(&data, &id).unwrap();
                assert!(own.pass);
                let shared = engine.evaluate(&data, "shared").unwrap();
                assert!(shared.pass);
                assert_eq!(shared.rules_evaluated, 1);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.rule_count(), 101);
}

#[test]
fn test_concurrent_replacement_of_same_id() {
    let engine = Arc::new(Engine::new(ExprEvaluator::new()));
    let data = student_data();

    engine
        .add_rule(
            Rule::new("contended")
                .with_expr("student.GPA < 2.5")
                .with_schema(education_schema()),
        )
        .unwrap();

    let writer = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            for _ in 0..200 {
                engine
                    .add_rule(
                        Rule::new("contended")
                            .with_expr("student.GPA < 2.5")
                            .with_schema(education_schema()),
                    )
                    .unwrap();
            }
        })
    };

    // 替换进行中每次评估都必须看到完整一致的树
    for _ in 0..200 {
        let results = engine.evaluate(&data, "contended").unwrap();
        assert!(results.pass);
        assert_eq!(results.rules_evaluated, 1);
    }
    writer.join().unwrap();
}
