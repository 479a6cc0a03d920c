//! Restricted expression language evaluator backed by evalexpr.
//!
//! Expressions only see scalar bindings: `data`, `source` and the top-level
//! payload fields (arrays become tuples, nested objects are not bound).
//! Expressions cannot call engine functions and never transform the payload.
//!
//! Truthiness: `false`, empty, `0`, `0.0`, `""` and `()` are falsy.

use evalexpr::{
    build_operator_tree, ContextWithMutableVariables, HashMapContext, Node, Operator,
    Value as ExprValue,
};
use serde_json::Value;

use super::{Bindings, Evaluation, ScriptEvaluator};
use crate::domain::EvaluatorKind;

/// A compiled expression (empty source always passes)
#[derive(Debug, Clone)]
pub struct ExprScript {
    node: Option<Node>,
}

impl ExprScript {
    pub fn compile(source: &str) -> Result<Self, String> {
        let node = if source.trim().is_empty() {
            None
        } else {
            let node = build_operator_tree(source).map_err(|e| e.to_string())?;
            check_arity(&node)?;
            Some(node)
        };
        Ok(Self { node })
    }
}

/// Reject operators with a missing operand, which the tree builder lets through
fn check_arity(node: &Node) -> Result<(), String> {
    let actual = node.children().len();
    let expected = match node.operator() {
        Operator::Add
        | Operator::Sub
        | Operator::Mul
        | Operator::Div
        | Operator::Mod
        | Operator::Exp
        | Operator::Eq
        | Operator::Neq
        | Operator::Gt
        | Operator::Lt
        | Operator::Geq
        | Operator::Leq
        | Operator::And
        | Operator::Or
        | Operator::Assign
        | Operator::AddAssign
        | Operator::SubAssign
        | Operator::MulAssign
        | Operator::DivAssign
        | Operator::ModAssign
        | Operator::ExpAssign
        | Operator::AndAssign
        | Operator::OrAssign => Some(2),
        Operator::Neg | Operator::Not | Operator::FunctionIdentifier { .. } => Some(1),
        // `()` is an empty root
        Operator::RootNode => (actual > 1).then_some(1),
        Operator::Tuple | Operator::Chain => None,
        Operator::Const { .. }
        | Operator::VariableIdentifierWrite { .. }
        | Operator::VariableIdentifierRead { .. } => Some(0),
    };

    if let Some(expected) = expected {
        if actual != expected {
            return Err(format!(
                "Operator {} expects {} operand(s), got {}",
                node.operator(),
                expected,
                actual
            ));
        }
    }

    node.children().iter().try_for_each(check_arity)
}

impl ScriptEvaluator for ExprScript {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Expr
    }

    fn evaluate(&self, bindings: &Bindings) -> Result<Evaluation, String> {
        let Some(node) = &self.node else {
            return Ok(Evaluation::pass());
        };

        let mut context = HashMapContext::new();
        context
            .set_value("data".to_string(), ExprValue::String(bindings.data.clone()))
            .map_err(|e| e.to_string())?;
        context
            .set_value("source".to_string(), ExprValue::String(bindings.source.clone()))
            .map_err(|e| e.to_string())?;

        for (name, value) in bindings.fields() {
            if let Some(value) = to_expr_value(value) {
                context
                    .set_value(name.clone(), value)
                    .map_err(|e| e.to_string())?;
            }
        }

        let value = node.eval_with_context(&context).map_err(|e| e.to_string())?;

        Ok(Evaluation {
            truthy: is_truthy(&value),
            ..Default::default()
        })
    }
}

pub fn is_truthy(value: &ExprValue) -> bool {
    match value {
        ExprValue::Boolean(b) => *b,
        ExprValue::Int(i) => *i != 0,
        ExprValue::Float(f) => *f != 0.0,
        ExprValue::String(s) => !s.is_empty(),
        ExprValue::Tuple(items) => !items.is_empty(),
        ExprValue::Empty => false,
    }
}

fn to_expr_value(value: &Value) -> Option<ExprValue> {
    match value {
        Value::Null => Some(ExprValue::Empty),
        Value::Bool(b) => Some(ExprValue::Boolean(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(ExprValue::Int(i)),
            None => n.as_f64().map(ExprValue::Float),
        },
        Value::String(s) => Some(ExprValue::String(s.clone())),
        Value::Array(items) => Some(ExprValue::Tuple(
            items.iter().filter_map(to_expr_value).collect(),
        )),
        Value::Object(_) => None,
    }
}
