// Recursive-descent evaluator for the body of a `${{ }}` fragment.
//
// Precedence, loosest first: `||`, `&&`, `==`/`!=`, `<`/`<=`/`>`/`>=`,
// `!`, then property access, indexing and calls.

use super::{ExpressionError, Value, VariableProvider};

/// Evaluate a bare expression (no `${{ }}` wrapper).
pub fn evaluate(expression: &str, provider: &dyn VariableProvider) -> Result<Value, ExpressionError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source: expression,
    };
    let ast = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.syntax_error());
    }
    eval(&ast, provider)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Null,
    True,
    False,
    Number(f64),
    Str(String),
    Ident(String),
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let syntax = || ExpressionError::InvalidSyntax(src.to_string());

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => push(&mut tokens, &mut i, Token::LParen, 1),
            ')' => push(&mut tokens, &mut i, Token::RParen, 1),
            '[' => push(&mut tokens, &mut i, Token::LBracket, 1),
            ']' => push(&mut tokens, &mut i, Token::RBracket, 1),
            ',' => push(&mut tokens, &mut i, Token::Comma, 1),
            '.' if !next.is_some_and(|n| n.is_ascii_digit()) => {
                push(&mut tokens, &mut i, Token::Dot, 1)
            }
            '!' if next == Some('=') => push(&mut tokens, &mut i, Token::Ne, 2),
            '!' => push(&mut tokens, &mut i, Token::Not, 1),
            '=' if next == Some('=') => push(&mut tokens, &mut i, Token::Eq, 2),
            '<' if next == Some('=') => push(&mut tokens, &mut i, Token::Le, 2),
            '<' => push(&mut tokens, &mut i, Token::Lt, 1),
            '>' if next == Some('=') => push(&mut tokens, &mut i, Token::Ge, 2),
            '>' => push(&mut tokens, &mut i, Token::Gt, 1),
            '&' if next == Some('&') => push(&mut tokens, &mut i, Token::And, 2),
            '|' if next == Some('|') => push(&mut tokens, &mut i, Token::Or, 2),
            '\'' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(syntax()),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            text.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit()
                || c == '.'
                || (c == '-' && next.is_some_and(|n| n.is_ascii_digit() || n == '.')) =>
            {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric()
                        || chars[i] == '.'
                        || ((chars[i] == '-' || chars[i] == '+')
                            && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(parse_number_literal(&literal).ok_or_else(syntax)?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            _ => return Err(syntax()),
        }
    }
    Ok(tokens)
}

fn push(tokens: &mut Vec<Token>, i: &mut usize, token: Token, width: usize) {
    tokens.push(token);
    *i += width;
}

fn parse_number_literal(literal: &str) -> Option<f64> {
    let (negative, digits) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()? as f64,
        None => digits.parse::<f64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Variable(String),
    Property(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, token: Token) -> Result<(), ExpressionError> {
        if self.next() == Some(token) {
            Ok(())
        } else {
            Err(self.syntax_error())
        }
    }

    fn syntax_error(&self) -> ExpressionError {
        ExpressionError::InvalidSyntax(self.source.to_string())
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_equality()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = match self.next() {
                        Some(Token::Ident(name)) => name,
                        Some(Token::True) => "true".to_string(),
                        Some(Token::False) => "false".to_string(),
                        Some(Token::Null) => "null".to_string(),
                        _ => return Err(self.syntax_error()),
                    };
                    expr = Expr::Property(Box::new(expr), name);
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Variable(name));
                }
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() == Some(&Token::RParen) {
                    self.pos += 1;
                    return Ok(Expr::Call(name, args));
                }
                loop {
                    args.push(self.parse_or()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RParen) => return Ok(Expr::Call(name, args)),
                        _ => return Err(self.syntax_error()),
                    }
                }
            }
            _ => Err(self.syntax_error()),
        }
    }
}

fn eval(expr: &Expr, provider: &dyn VariableProvider) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name) => provider.get_variable(name),
        Expr::Property(target, name) => Ok(eval(target, provider)?.property(name)),
        Expr::Index(target, index) => {
            let target = eval(target, provider)?;
            let index = eval(index, provider)?;
            Ok(target.index(&index))
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, provider)?.is_truthy())),
        Expr::And(left, right) => {
            let left = eval(left, provider)?;
            if !left.is_truthy() {
                return Ok(left);
            }
            eval(right, provider)
        }
        Expr::Or(left, right) => {
            let left = eval(left, provider)?;
            if left.is_truthy() {
                return Ok(left);
            }
            eval(right, provider)
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, provider)?;
            let right = eval(right, provider)?;
            let ordering = left.loose_cmp(&right);
            let result = match op {
                BinaryOp::Eq => left.loose_eq(&right),
                BinaryOp::Ne => !left.loose_eq(&right),
                BinaryOp::Lt => ordering.is_some_and(|o| o.is_lt()),
                BinaryOp::Le => ordering.is_some_and(|o| o.is_le()),
                BinaryOp::Gt => ordering.is_some_and(|o| o.is_gt()),
                BinaryOp::Ge => ordering.is_some_and(|o| o.is_ge()),
            };
            Ok(Value::Bool(result))
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, provider))
                .collect::<Result<Vec<_>, _>>()?;
            call_function(name, &args)
        }
    }
}

fn call_function(name: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    let arity = |min: usize, max: usize| {
        if args.len() < min || args.len() > max {
            Err(ExpressionError::InvalidArguments {
                function: name.to_string(),
                message: format!("expected {min} to {max} arguments, got {}", args.len()),
            })
        } else {
            Ok(())
        }
    };

    match name.to_ascii_lowercase().as_str() {
        "contains" => {
            arity(2, 2)?;
            let found = match &args[0] {
                Value::Array(items) => items.iter().any(|item| item.loose_eq(&args[1])),
                haystack => haystack
                    .to_text()
                    .to_lowercase()
                    .contains(&args[1].to_text().to_lowercase()),
            };
            Ok(Value::Bool(found))
        }
        "startswith" => {
            arity(2, 2)?;
            Ok(Value::Bool(
                args[0].to_text().to_lowercase().starts_with(&args[1].to_text().to_lowercase()),
            ))
        }
        "endswith" => {
            arity(2, 2)?;
            Ok(Value::Bool(
                args[0].to_text().to_lowercase().ends_with(&args[1].to_text().to_lowercase()),
            ))
        }
        "format" => {
            arity(1, usize::MAX)?;
            format(&args[0].to_text(), &args[1..]).map(Value::String)
        }
        "join" => {
            arity(1, 2)?;
            let separator = args.get(1).map(Value::to_text).unwrap_or_else(|| ",".to_string());
            Ok(Value::String(match &args[0] {
                Value::Array(items) => items
                    .iter()
                    .map(Value::to_text)
                    .collect::<Vec<_>>()
                    .join(&separator),
                other => other.to_text(),
            }))
        }
        "tojson" => {
            arity(1, 1)?;
            serde_json::to_string_pretty(&args[0].to_json())
                .map(Value::String)
                .map_err(|e| ExpressionError::InvalidArguments {
                    function: name.to_string(),
                    message: e.to_string(),
                })
        }
        "fromjson" => {
            arity(1, 1)?;
            serde_json::from_str::<serde_json::Value>(&args[0].to_text())
                .map(Value::from)
                .map_err(|e| ExpressionError::InvalidArguments {
                    function: name.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Err(ExpressionError::UnknownFunction(name.to_string())),
    }
}

/// `format('{0} and {1}', a, b)`; `{{` and `}}` are literal braces.
fn format(template: &str, args: &[Value]) -> Result<String, ExpressionError> {
    let invalid = |message: &str| ExpressionError::InvalidArguments {
        function: "format".to_string(),
        message: format!("{message} in '{template}'"),
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(d) if d.is_ascii_digit() => index.push(d),
                        _ => return Err(invalid("malformed placeholder")),
                    }
                }
                let arg = index
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| args.get(i))
                    .ok_or_else(|| invalid("placeholder out of range"))?;
                out.push_str(&arg.to_text());
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(invalid("unmatched '}'")),
            other => out.push(other),
        }
    }
    Ok(out)
}
