//! `${{ }}` expression support.
//!
//! - [`Value`]: what expressions evaluate to.
//! - [`evaluate`] and [`interpolate`]: run a bare expression, or substitute
//!   every fragment of a template string.
//! - [`ExprValue`]: a document field that is either a literal or an
//!   expression resolved at the point of use.
//! - [`EvaluationContext`]: the variables (`github`, `env`, `steps`, ...)
//!   visible to an expression.

mod context;
mod evaluator;
mod typed_value;
mod value;

pub use context::{EvaluationContext, JobContext, StrategyContext};
pub use evaluator::evaluate;
pub use typed_value::{ExprBool, ExprFloat, ExprInt, ExprString, ExprType, ExprValue};
pub use value::Value;

use once_cell::sync::Lazy;
use regex::Regex;

static FRAGMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\$\{\{(.*?)\}\}").expect("fragment regex is valid"));

/// Errors that can occur during expression evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("invalid expression syntax: {0}")]
    InvalidSyntax(String),

    #[error("invalid arguments to {function}: {message}")]
    InvalidArguments { function: String, message: String },

    #[error("cannot evaluate expression {expression} as {expected}")]
    TypeMismatch {
        expression: String,
        expected: &'static str,
    },
}

/// Resolves the top-level names an expression may reference.
pub trait VariableProvider {
    fn get_variable(&self, name: &str) -> Result<Value, ExpressionError>;
}

/// Replace every `${{ ... }}` fragment in `text` with the string form of its value.
///
/// Text without fragments is returned unchanged.
pub fn interpolate(text: &str, provider: &dyn VariableProvider) -> Result<String, ExpressionError> {
    let mut result = String::with_capacity(text.len());
    let mut last_end = 0;
    for caps in FRAGMENT_REGEX.captures_iter(text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        result.push_str(&text[last_end..whole.start()]);
        let value = evaluate(body.as_str().trim(), provider)?;
        result.push_str(&value.to_text());
        last_end = whole.end();
    }
    result.push_str(&text[last_end..]);
    Ok(result)
}

/// Evaluate text that must consist of exactly one `${{ ... }}` fragment.
///
/// Surrounding whitespace is allowed; anything else is a type mismatch
/// since the result would be a string.
pub(crate) fn evaluate_single_fragment(
    text: &str,
    expected: &'static str,
    provider: &dyn VariableProvider,
) -> Result<Value, ExpressionError> {
    let trimmed = text.trim();
    match FRAGMENT_REGEX.captures(trimmed) {
        Some(caps)
            if caps.get(0).map(|m| m.start() == 0 && m.end() == trimmed.len()) == Some(true) =>
        {
            let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            evaluate(body.trim(), provider)
        }
        _ => Err(ExpressionError::TypeMismatch {
            expression: text.to_string(),
            expected,
        }),
    }
}
