//! Translates stored ABAC policy expressions into engine condition cells.
//!
//! A stored expression is a list of per resource type conditions:
//! `[{"system": "sys", "type": "host", "expression": {"StringEquals": {"id": ["1"]}}}]`.
//! Each condition becomes an `{op, field, value}` cell with the field
//! qualified as `<system>.<type>.<attribute>`. Several resource types are
//! joined with `AND`. An empty body or an empty list grants any instance.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::authz::errors::AuthzError;

/// `{operator: {attribute: [values]}}`, or `{"AND"|"OR": {"content": [conditions]}}`.
type PolicyCondition = BTreeMap<String, BTreeMap<String, Vec<Value>>>;

#[derive(Debug, Deserialize)]
struct ResourceExpression {
    system: String,
    #[serde(rename = "type")]
    resource_type: String,
    expression: PolicyCondition,
}

/// Cell granting any instance.
pub fn any_cell() -> Value {
    json!({ "op": "any", "field": "", "value": [] })
}

pub fn translate_policy_expression(body: &str) -> Result<Value, AuthzError> {
    if body.trim().is_empty() {
        return Ok(any_cell());
    }

    let expressions: Vec<ResourceExpression> = serde_json::from_str(body)
        .map_err(|e| invalid(format!("unmarshal expression `{}` failed: {}", body, e)))?;

    let mut content = Vec::with_capacity(expressions.len());
    for expr in &expressions {
        let prefix = format!("{}.{}", expr.system, expr.resource_type);
        content.push(translate_condition(&expr.expression, &prefix)?);
    }

    Ok(match content.len() {
        0 => any_cell(),
        1 => content.remove(0),
        _ => json!({ "op": "AND", "content": content }),
    })
}

fn invalid(message: impl Into<String>) -> AuthzError {
    AuthzError::InvalidExpression(message.into())
}

fn translate_condition(condition: &PolicyCondition, prefix: &str) -> Result<Value, AuthzError> {
    let mut entries = condition.iter();
    let (Some((operator, options)), None) = (entries.next(), entries.next()) else {
        return Err(invalid("condition must hold exactly one operator"));
    };
    let Some((attribute, values)) = options.iter().next() else {
        return Err(invalid(format!("operator `{}` has no operand", operator)));
    };

    match operator.as_str() {
        "AND" | "OR" => {
            let mut content = Vec::with_capacity(values.len());
            for value in values {
                let nested: PolicyCondition = serde_json::from_value(value.clone())
                    .map_err(|e| invalid(format!("nested condition is malformed: {}", e)))?;
                content.push(translate_condition(&nested, prefix)?);
            }
            Ok(json!({ "op": operator, "content": content }))
        }
        _ => {
            let field = format!("{}.{}", prefix, attribute);
            translate_operator(operator, field, values)
        }
    }
}

fn translate_operator(operator: &str, field: String, values: &[Value]) -> Result<Value, AuthzError> {
    match operator {
        "Any" => Ok(cell("any", field, Value::Array(values.to_vec()))),
        "StringEquals" | "NumericEquals" => match values {
            [] => Err(invalid(format!("`{}` on `{}` needs a value", operator, field))),
            [single] => Ok(cell("eq", field, single.clone())),
            many => Ok(cell("in", field, Value::Array(many.to_vec()))),
        },
        "StringPrefix" => per_value("starts_with", field, values),
        "StringContains" => per_value("string_contains", field, values),
        "Bool" => match values {
            [single] => Ok(cell("eq", field, single.clone())),
            _ => Err(invalid(format!("`Bool` on `{}` takes exactly one value", field))),
        },
        other => Err(invalid(format!("operator `{}` is not supported", other))),
    }
}

/// One cell per value, `OR`-joined when there are several.
fn per_value(op: &str, field: String, values: &[Value]) -> Result<Value, AuthzError> {
    let mut content: Vec<Value> = values
        .iter()
        .map(|v| cell(op, field.clone(), v.clone()))
        .collect();
    match content.len() {
        0 => Err(invalid(format!("`{}` on `{}` needs a value", op, field))),
        1 => Ok(content.remove(0)),
        _ => Ok(json!({ "op": "OR", "content": content })),
    }
}

fn cell(op: &str, field: String, value: Value) -> Value {
    let mut cell = Map::new();
    cell.insert("op".into(), Value::from(op));
    cell.insert("field".into(), Value::from(field));
    cell.insert("value".into(), value);
    Value::Object(cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_and_empty_list_are_any() {
        assert_eq!(translate_policy_expression("").unwrap(), any_cell());
        assert_eq!(translate_policy_expression("[]").unwrap(), any_cell());
    }

    #[test]
    fn single_value_is_eq_and_many_is_in() {
        let got = translate_policy_expression(
            r#"[{"system":"cmdb","type":"biz","expression":{"StringEquals":{"id":["2"]}}}]"#,
        )
        .unwrap();
        assert_eq!(got, json!({"op": "eq", "field": "cmdb.biz.id", "value": "2"}));

        let got = translate_policy_expression(
            r#"[{"system":"cmdb","type":"biz","expression":{"StringEquals":{"id":["2","3"]}}}]"#,
        )
        .unwrap();
        assert_eq!(got, json!({"op": "in", "field": "cmdb.biz.id", "value": ["2", "3"]}));
    }

    #[test]
    fn two_resource_types_are_anded() {
        let got = translate_policy_expression(
            r#"[{"system":"sops","type":"flow","expression":{"Any":{"id":[]}}},
                {"system":"sops","type":"project","expression":{"Any":{"id":[]}}}]"#,
        )
        .unwrap();
        assert_eq!(
            got,
            json!({"op": "AND", "content": [
                {"op": "any", "field": "sops.flow.id", "value": []},
                {"op": "any", "field": "sops.project.id", "value": []}
            ]})
        );
    }

    #[test]
    fn nested_or_keeps_the_type_prefix() {
        let got = translate_policy_expression(
            r#"[{"system":"sys","type":"host","expression":{"OR":{"content":[
                {"StringPrefix":{"name":["web"]}},
                {"StringContains":{"_bk_iam_path_":["/biz,1/","/biz,2/"]}}
            ]}}}]"#,
        )
        .unwrap();
        assert_eq!(
            got,
            json!({"op": "OR", "content": [
                {"op": "starts_with", "field": "sys.host.name", "value": "web"},
                {"op": "OR", "content": [
                    {"op": "string_contains", "field": "sys.host._bk_iam_path_", "value": "/biz,1/"},
                    {"op": "string_contains", "field": "sys.host._bk_iam_path_", "value": "/biz,2/"}
                ]}
            ]})
        );
    }

    #[test]
    fn malformed_expressions_fail() {
        assert!(matches!(
            translate_policy_expression("123"),
            Err(AuthzError::InvalidExpression(_))
        ));
        assert!(translate_policy_expression(
            r#"[{"system":"s","type":"t","expression":{"NotExists":{"id":["2"]}}}]"#
        )
        .is_err());
        assert!(translate_policy_expression(
            r#"[{"system":"s","type":"t","expression":{"StringEquals":{"id":[]}}}]"#
        )
        .is_err());
        assert!(translate_policy_expression(
            r#"[{"system":"s","type":"t","expression":{"Bool":{"on":[true,false]}}}]"#
        )
        .is_err());
    }
}
