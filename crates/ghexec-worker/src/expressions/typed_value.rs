use super::{evaluate_single_fragment, interpolate, ExpressionError, Value, VariableProvider};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A document field that is either a literal of type `T` or an expression
/// (any string containing `${{`) evaluated when the field is used.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue<T> {
    Literal(T),
    Expression(String),
}

pub type ExprString = ExprValue<String>;
pub type ExprBool = ExprValue<bool>;
pub type ExprInt = ExprValue<i64>;
pub type ExprFloat = ExprValue<f64>;

/// Scalar types an [`ExprValue`] can carry.
pub trait ExprType: Sized + Clone {
    const TYPE_NAME: &'static str;

    /// Accept a literal as written in a YAML or JSON document.
    fn from_document(raw: &serde_json::Value) -> Option<Self>;

    /// Accept the result of an expression.
    fn from_value(value: &Value) -> Option<Self>;

    fn evaluate(expression: &str, provider: &dyn VariableProvider) -> Result<Self, ExpressionError> {
        let value = evaluate_single_fragment(expression, Self::TYPE_NAME, provider)?;
        Self::from_value(&value).ok_or_else(|| ExpressionError::TypeMismatch {
            expression: expression.to_string(),
            expected: Self::TYPE_NAME,
        })
    }
}

impl ExprType for String {
    const TYPE_NAME: &'static str = "string";

    fn from_document(raw: &serde_json::Value) -> Option<Self> {
        match raw {
            serde_json::Value::Null => Some(String::new()),
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.to_text())
    }

    fn evaluate(expression: &str, provider: &dyn VariableProvider) -> Result<Self, ExpressionError> {
        interpolate(expression, provider)
    }
}

impl ExprType for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_document(raw: &serde_json::Value) -> Option<Self> {
        match raw {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl ExprType for i64 {
    const TYPE_NAME: &'static str = "int";

    fn from_document(raw: &serde_json::Value) -> Option<Self> {
        match raw {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }
}

impl ExprType for f64 {
    const TYPE_NAME: &'static str = "float";

    fn from_document(raw: &serde_json::Value) -> Option<Self> {
        match raw {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl<T: ExprType> ExprValue<T> {
    /// Parse text as written on a command line or in a document.
    pub fn from_text(text: &str) -> Option<Self> {
        if text.contains("${{") {
            return Some(ExprValue::Expression(text.to_string()));
        }
        T::from_document(&serde_json::Value::String(text.to_string())).map(ExprValue::Literal)
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, ExprValue::Expression(_))
    }

    /// Resolve to a concrete value. Literals are returned as-is.
    pub fn eval(&self, provider: &dyn VariableProvider) -> Result<T, ExpressionError> {
        match self {
            ExprValue::Literal(value) => Ok(value.clone()),
            ExprValue::Expression(text) => T::evaluate(text, provider),
        }
    }
}

impl From<&str> for ExprString {
    fn from(text: &str) -> Self {
        if text.contains("${{") {
            ExprValue::Expression(text.to_string())
        } else {
            ExprValue::Literal(text.to_string())
        }
    }
}

impl<T: fmt::Display> fmt::Display for ExprValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprValue::Literal(value) => value.fmt(f),
            ExprValue::Expression(text) => f.write_str(text),
        }
    }
}

impl<'de, T: ExprType> Deserialize<'de> for ExprValue<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        if let serde_json::Value::String(text) = &raw {
            if text.contains("${{") {
                return Ok(ExprValue::Expression(text.clone()));
            }
        }
        T::from_document(&raw)
            .map(ExprValue::Literal)
            .ok_or_else(|| D::Error::custom(format!("invalid {} value: {raw}", T::TYPE_NAME)))
    }
}

impl<T: Serialize> Serialize for ExprValue<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExprValue::Literal(value) => value.serialize(serializer),
            ExprValue::Expression(text) => serializer.serialize_str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::test_support::JsonProvider;
    use serde_json::json;

    fn provider() -> JsonProvider {
        JsonProvider::new(json!({
            "env": {"FLAG": true, "COUNT": 4, "RATIO": 0.5, "NAME": "app"},
        }))
    }

    #[test]
    fn deserialize_literals_and_expressions() {
        let s: ExprString = serde_yaml::from_str("hello").unwrap();
        assert_eq!(s, ExprValue::Literal("hello".into()));

        let n: ExprString = serde_yaml::from_str("42").unwrap();
        assert_eq!(n, ExprValue::Literal("42".into()));

        let e: ExprString = serde_yaml::from_str("'${{ env.NAME }}-x'").unwrap();
        assert_eq!(e, ExprValue::Expression("${{ env.NAME }}-x".into()));
    }

    #[test]
    fn deserialize_bool_forms() {
        for (doc, expected) in [("true", true), ("'True'", true), ("'1'", true), ("'FALSE'", false), ("0", false)] {
            let b: ExprBool = serde_yaml::from_str(doc).unwrap();
            assert_eq!(b, ExprValue::Literal(expected), "{doc}");
        }
        assert!(serde_yaml::from_str::<ExprBool>("'yes please'").is_err());
    }

    #[test]
    fn deserialize_numbers() {
        let i: ExprInt = serde_json::from_str("7").unwrap();
        assert_eq!(i, ExprValue::Literal(7));
        let f: ExprFloat = serde_json::from_str("\"2.5\"").unwrap();
        assert_eq!(f, ExprValue::Literal(2.5));
        assert!(serde_json::from_str::<ExprInt>("1.5").is_err());
    }

    #[test]
    fn serialize_round_trips_through_text() {
        let b: ExprBool = ExprValue::Expression("${{ env.FLAG }}".into());
        assert_eq!(serde_json::to_string(&b).unwrap(), "\"${{ env.FLAG }}\"");
        assert_eq!(serde_json::to_string(&ExprInt::Literal(3)).unwrap(), "3");
    }

    #[test]
    fn eval_typed_expressions() {
        let p = provider();
        assert!(ExprBool::Expression("${{ env.FLAG }}".into()).eval(&p).unwrap());
        assert_eq!(ExprInt::Expression("${{ env.COUNT }}".into()).eval(&p).unwrap(), 4);
        assert_eq!(ExprFloat::Expression("${{ env.RATIO }}".into()).eval(&p).unwrap(), 0.5);
        assert_eq!(
            ExprString::from("${{ env.NAME }}-${{ env.COUNT }}").eval(&p).unwrap(),
            "app-4"
        );
    }

    #[test]
    fn eval_type_mismatch() {
        let err = ExprBool::Expression("${{ env.NAME }}".into())
            .eval(&provider())
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot evaluate expression ${{ env.NAME }} as bool");

        let err = ExprInt::Expression("${{ env.RATIO }}".into())
            .eval(&provider())
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot evaluate expression ${{ env.RATIO }} as int");
    }

    #[test]
    fn from_text() {
        assert_eq!(ExprBool::from_text("true"), Some(ExprValue::Literal(true)));
        assert_eq!(
            ExprBool::from_text("${{ x }}"),
            Some(ExprValue::Expression("${{ x }}".into()))
        );
        assert_eq!(ExprInt::from_text("nope"), None);
    }
}
