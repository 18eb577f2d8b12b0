use super::compare::{
    arithmetic_values, compare_values, equals_values, is_truthy, stringify,
};
use crate::{
    log::{Error, INCOMPATIBLE_TYPES, INVALID_SYNTAX, UNEXPECTED_TOKEN},
    store::Store,
};
use serde_json::{json, Value};
use std::collections::HashMap;

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Concat,
    Greater,
    Lesser,
    Equal,
    NotEqual,
    GreaterOrEqual,
    LesserOrEqual,
    And,
    Or,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Concat => ".",
            Self::Greater => ">",
            Self::Lesser => "<",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterOrEqual => ">=",
            Self::LesserOrEqual => "<=",
            Self::And => "&&",
            Self::Or => "||",
        };
        write!(f, "{text}")
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOperator, Box<Expr>),
    Binary(Box<Expr>, Operator, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// How an assignment combines the new value with the old.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOperator {
    Set,
    Add,
    Subtract,
}

/// A parsed statement, an expression or an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expr),
    Assign {
        target: String,
        operator: AssignOperator,
        expr: Expr,
    },
    Increment(String),
    Decrement(String),
}

/// Parse the text as an expression.
///
/// # Errors
///
/// Returns an [`Error`] when the text is not a single valid expression.
pub fn parse(source: &str) -> Result<Expr, Error> {
    let mut parser = Parser::new(source)?;
    let expression = parser.parse_expression()?;
    parser.finish()?;

    Ok(expression)
}

/// Parse the text as a statement.
///
/// # Errors
///
/// Returns an [`Error`] when the text is not a valid statement.
pub fn parse_statement(source: &str) -> Result<Statement, Error> {
    let mut parser = Parser::new(source)?;

    let target = match parser.tokens.first() {
        Some(Token::Variable(name)) => Some(name.clone()),
        _ => None,
    };
    let punct = match parser.tokens.get(1) {
        Some(Token::Punct(punct)) => Some(*punct),
        _ => None,
    };

    if let (Some(target), Some(punct)) = (target, punct) {
        let operator = match punct {
            "=" => Some(AssignOperator::Set),
            "+=" => Some(AssignOperator::Add),
            "-=" => Some(AssignOperator::Subtract),
            _ => None,
        };
        if let Some(operator) = operator {
            parser.cursor = 2;
            let expr = parser.parse_expression()?;
            parser.finish()?;
            return Ok(Statement::Assign {
                target,
                operator,
                expr,
            });
        }
        if parser.tokens.len() == 2 {
            match punct {
                "++" => return Ok(Statement::Increment(target)),
                "--" => return Ok(Statement::Decrement(target)),
                _ => {}
            }
        }
    }

    let statement = Statement::Expression(parser.parse_expression()?);
    parser.finish()?;

    Ok(statement)
}

/// The variables visible to a render.
///
/// A Scope starts as a copy of the [`Store`] and grows as templates
/// assign, bind loop variables, and unset.
pub struct Scope {
    vars: HashMap<String, Value>,
}

impl Scope {
    /// Create a new Scope seeded with every entry in the [`Store`].
    pub fn new(store: &Store) -> Self {
        let vars = store
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self { vars }
    }

    /// Return the value of the variable, if set.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Set the variable.
    pub fn set<T>(&mut self, name: T, value: Value)
    where
        T: Into<String>,
    {
        self.vars.insert(name.into(), value);
    }

    /// Remove the variable.
    pub fn unset(&mut self, name: &str) {
        self.vars.remove(name);
    }
}

/// Evaluate the expression against the [`Scope`].
///
/// An unset variable evaluates to null rather than failing, which keeps
/// `isset` and echo defaults cheap.
///
/// # Errors
///
/// Returns an [`Error`] when an operator or function receives values it
/// cannot work with.
pub fn eval(expression: &Expr, scope: &Scope) -> Result<Value, Error> {
    match expression {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name) => Ok(scope.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Member(base, name) => {
            let base = eval(base, scope)?;
            Ok(match base {
                Value::Object(mut object) => object.remove(name).unwrap_or(Value::Null),
                _ => Value::Null,
            })
        }
        Expr::Index(base, index) => {
            let base = eval(base, scope)?;
            let index = eval(index, scope)?;
            Ok(match (&base, &index) {
                (Value::Array(array), Value::Number(number)) => number
                    .as_u64()
                    .and_then(|i| array.get(i as usize))
                    .cloned()
                    .unwrap_or(Value::Null),
                (Value::Object(object), Value::String(key)) => {
                    object.get(key).cloned().unwrap_or(Value::Null)
                }
                _ => Value::Null,
            })
        }
        Expr::Unary(operator, operand) => {
            let value = eval(operand, scope)?;
            match operator {
                UnaryOperator::Not => Ok(Value::Bool(!is_truthy(&value))),
                UnaryOperator::Negate => match value.as_f64() {
                    Some(number) => Ok(negated(number)),
                    None => Err(Error::build(INCOMPATIBLE_TYPES)
                        .with_help(format!("cannot negate `{value}`"))),
                },
            }
        }
        Expr::Binary(left, operator, right) => match operator {
            Operator::And => {
                let left = eval(left, scope)?;
                if !is_truthy(&left) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(is_truthy(&eval(right, scope)?)))
            }
            Operator::Or => {
                let left = eval(left, scope)?;
                if is_truthy(&left) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(is_truthy(&eval(right, scope)?)))
            }
            Operator::Equal => Ok(Value::Bool(equals_values(
                &eval(left, scope)?,
                &eval(right, scope)?,
            ))),
            Operator::NotEqual => Ok(Value::Bool(!equals_values(
                &eval(left, scope)?,
                &eval(right, scope)?,
            ))),
            Operator::Greater
            | Operator::Lesser
            | Operator::GreaterOrEqual
            | Operator::LesserOrEqual => Ok(Value::Bool(compare_values(
                &eval(left, scope)?,
                operator,
                &eval(right, scope)?,
            )?)),
            _ => arithmetic_values(&eval(left, scope)?, operator, &eval(right, scope)?),
        },
        Expr::Ternary(condition, then, otherwise) => {
            if is_truthy(&eval(condition, scope)?) {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
        Expr::Call(name, arguments) => call(name, arguments, scope),
    }
}

/// Run the statement against the [`Scope`], returning the value it
/// produced.
///
/// # Errors
///
/// Returns an [`Error`] when evaluation fails.
pub fn run(statement: &Statement, scope: &mut Scope) -> Result<Value, Error> {
    match statement {
        Statement::Expression(expression) => eval(expression, scope),
        Statement::Assign {
            target,
            operator,
            expr,
        } => {
            let value = eval(expr, scope)?;
            let value = match operator {
                AssignOperator::Set => value,
                AssignOperator::Add => {
                    arithmetic_values(&current(scope, target), &Operator::Add, &value)?
                }
                AssignOperator::Subtract => {
                    arithmetic_values(&current(scope, target), &Operator::Subtract, &value)?
                }
            };
            scope.set(target.clone(), value.clone());

            Ok(value)
        }
        Statement::Increment(target) => {
            let value = arithmetic_values(&current(scope, target), &Operator::Add, &json!(1))?;
            scope.set(target.clone(), value.clone());

            Ok(value)
        }
        Statement::Decrement(target) => {
            let value = arithmetic_values(&current(scope, target), &Operator::Subtract, &json!(1))?;
            scope.set(target.clone(), value.clone());

            Ok(value)
        }
    }
}

/// Return the variable for a compound assignment, where unset counts
/// as zero.
fn current(scope: &Scope, name: &str) -> Value {
    match scope.get(name) {
        Some(Value::Null) | None => json!(0),
        Some(value) => value.clone(),
    }
}

fn negated(number: f64) -> Value {
    if number.fract() == 0.0 {
        json!(-(number as i64))
    } else {
        json!(-number)
    }
}

/// Evaluate a builtin function call.
fn call(name: &str, arguments: &[Expr], scope: &Scope) -> Result<Value, Error> {
    match name {
        // True when every argument is set and not null.
        "isset" => {
            for argument in arguments {
                if eval(argument, scope)?.is_null() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(!arguments.is_empty()))
        }
        "empty" => {
            let value = one(name, arguments, scope)?;
            Ok(Value::Bool(!is_truthy(&value)))
        }
        "count" => {
            let value = one(name, arguments, scope)?;
            match &value {
                Value::Array(array) => Ok(json!(array.len())),
                Value::Object(object) => Ok(json!(object.len())),
                Value::String(string) => Ok(json!(string.chars().count())),
                _ => Err(Error::build(INCOMPATIBLE_TYPES)
                    .with_help(format!("cannot count `{value}`"))),
            }
        }
        "upper" => Ok(json!(stringify(&one(name, arguments, scope)?).to_uppercase())),
        "lower" => Ok(json!(stringify(&one(name, arguments, scope)?).to_lowercase())),
        _ => Err(Error::build(UNEXPECTED_TOKEN)
            .with_help(format!("`{name}` is not a recognized function"))),
    }
}

fn one(name: &str, arguments: &[Expr], scope: &Scope) -> Result<Value, Error> {
    match arguments {
        [argument] => eval(argument, scope),
        _ => Err(Error::build(INVALID_SYNTAX)
            .with_help(format!("`{name}` expects exactly one argument"))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Variable(String),
    Ident(String),
    Number(Value),
    Text(String),
    Punct(&'static str),
}

const DOUBLE: [&str; 11] = [
    "->", "++", "--", "+=", "-=", "==", "!=", ">=", "<=", "&&", "||",
];
const SINGLE: [&str; 17] = [
    "+", "-", "*", "/", "%", ".", "!", "<", ">", "=", "?", ":", "(", ")", "[", "]", ",",
];

fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut cursor = 0;

    'outer: while cursor < source.len() {
        let rest = &source[cursor..];
        let Some(first) = rest.chars().next() else {
            break;
        };
        if first.is_whitespace() {
            cursor += first.len_utf8();
            continue;
        }
        if first == '$' {
            let length = ident_length(&rest[1..]);
            if length == 0 {
                return Err(Error::build(INVALID_SYNTAX)
                    .with_pointer(source, cursor..cursor + 1)
                    .with_help("`$` must be followed by a variable name"));
            }
            tokens.push(Token::Variable(rest[1..1 + length].to_string()));
            cursor += 1 + length;
            continue;
        }
        if first.is_ascii_digit() {
            let (value, length) = number_token(rest, source, cursor)?;
            tokens.push(Token::Number(value));
            cursor += length;
            continue;
        }
        if first == '\'' || first == '"' {
            let (text, length) = text_token(rest, first, source, cursor)?;
            tokens.push(Token::Text(text));
            cursor += length;
            continue;
        }
        if unicode_ident::is_xid_start(first) || first == '_' {
            let length = ident_length(rest);
            tokens.push(Token::Ident(rest[..length].to_string()));
            cursor += length;
            continue;
        }
        for punct in DOUBLE {
            if rest.starts_with(punct) {
                tokens.push(Token::Punct(punct));
                cursor += punct.len();
                continue 'outer;
            }
        }
        for punct in SINGLE {
            if rest.starts_with(punct) {
                tokens.push(Token::Punct(punct));
                cursor += punct.len();
                continue 'outer;
            }
        }

        return Err(Error::build(UNEXPECTED_TOKEN)
            .with_pointer(source, cursor..cursor + first.len_utf8())
            .with_help(format!("character `{first}` is not valid in an expression")));
    }

    Ok(tokens)
}

fn ident_length(text: &str) -> usize {
    text.char_indices()
        .find(|(_, c)| !(unicode_ident::is_xid_continue(*c) || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

fn number_token(rest: &str, source: &str, cursor: usize) -> Result<(Value, usize), Error> {
    let bytes = rest.as_bytes();
    let mut length = 0;
    while length < bytes.len() && bytes[length].is_ascii_digit() {
        length += 1;
    }
    let mut float = false;
    if bytes.get(length) == Some(&b'.')
        && bytes.get(length + 1).is_some_and(u8::is_ascii_digit)
    {
        float = true;
        length += 1;
        while length < bytes.len() && bytes[length].is_ascii_digit() {
            length += 1;
        }
    }
    let text = &rest[..length];

    let value = if float {
        text.parse::<f64>().map(|n| json!(n)).map_err(|_| ())
    } else {
        text.parse::<i64>().map(|n| json!(n)).map_err(|_| ())
    };

    match value {
        Ok(value) => Ok((value, length)),
        Err(_) => Err(Error::build(INVALID_SYNTAX)
            .with_pointer(source, cursor..cursor + length)
            .with_help(format!("`{text}` is not a valid number"))),
    }
}

fn text_token(
    rest: &str,
    quote: char,
    source: &str,
    cursor: usize,
) -> Result<(String, usize), Error> {
    let mut text = String::new();
    let mut chars = rest.char_indices().skip(1);

    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((text, i + c.len_utf8())),
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, 'r')) => text.push('\r'),
                Some((_, escaped)) => text.push(escaped),
                None => break,
            },
            c => text.push(c),
        }
    }

    Err(Error::build(INVALID_SYNTAX)
        .with_pointer(source, cursor..cursor + 1)
        .with_help("string literal is never closed"))
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    source: String,
}

impl Parser {
    fn new(source: &str) -> Result<Self, Error> {
        Ok(Self {
            tokens: tokenize(source)?,
            cursor: 0,
            source: source.to_string(),
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }

        token
    }

    fn eat(&mut self, punct: &str) -> bool {
        match self.peek() {
            Some(Token::Punct(found)) if *found == punct => {
                self.cursor += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), Error> {
        if self.eat(punct) {
            return Ok(());
        }

        Err(self.unexpected(format!("expected `{punct}`")))
    }

    fn finish(&self) -> Result<(), Error> {
        if self.cursor == self.tokens.len() {
            return Ok(());
        }

        Err(Error::build(INVALID_SYNTAX)
            .with_help(format!("unexpected trailing input in `{}`", self.source)))
    }

    fn unexpected(&self, expected: String) -> Error {
        Error::build(INVALID_SYNTAX)
            .with_help(format!("{expected} in expression `{}`", self.source))
    }

    fn parse_expression(&mut self) -> Result<Expr, Error> {
        let condition = self.parse_or()?;
        if !self.eat("?") {
            return Ok(condition);
        }
        let then = self.parse_expression()?;
        self.expect(":")?;
        let otherwise = self.parse_expression()?;

        Ok(Expr::Ternary(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_and()?;
        while self.eat("||") {
            let right = self.parse_and()?;
            left = Expr::Binary(Box::new(left), Operator::Or, Box::new(right));
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_equality()?;
        while self.eat("&&") {
            let right = self.parse_equality()?;
            left = Expr::Binary(Box::new(left), Operator::And, Box::new(right));
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_comparison()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Punct("==")) => Operator::Equal,
                Some(Token::Punct("!=")) => Operator::NotEqual,
                _ => break,
            };
            self.cursor += 1;
            let right = self.parse_comparison()?;
            left = Expr::Binary(Box::new(left), operator, Box::new(right));
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_additive()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Punct(">")) => Operator::Greater,
                Some(Token::Punct("<")) => Operator::Lesser,
                Some(Token::Punct(">=")) => Operator::GreaterOrEqual,
                Some(Token::Punct("<=")) => Operator::LesserOrEqual,
                _ => break,
            };
            self.cursor += 1;
            let right = self.parse_additive()?;
            left = Expr::Binary(Box::new(left), operator, Box::new(right));
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Punct("+")) => Operator::Add,
                Some(Token::Punct("-")) => Operator::Subtract,
                Some(Token::Punct(".")) => Operator::Concat,
                _ => break,
            };
            self.cursor += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(Box::new(left), operator, Box::new(right));
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_unary()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Punct("*")) => Operator::Multiply,
                Some(Token::Punct("/")) => Operator::Divide,
                Some(Token::Punct("%")) => Operator::Modulo,
                _ => break,
            };
            self.cursor += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), operator, Box::new(right));
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        if self.eat("!") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOperator::Not, Box::new(operand)));
        }
        if self.eat("-") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOperator::Negate, Box::new(operand)));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Error> {
        let mut expression = self.parse_primary()?;
        loop {
            if self.eat("->") {
                let name = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    _ => return Err(self.unexpected("expected a member name after `->`".into())),
                };
                expression = Expr::Member(Box::new(expression), name);
            } else if self.eat("[") {
                let index = self.parse_expression()?;
                self.expect("]")?;
                expression = Expr::Index(Box::new(expression), Box::new(index));
            } else {
                break;
            }
        }

        Ok(expression)
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        match self.advance() {
            Some(Token::Variable(name)) => Ok(Expr::Variable(name)),
            Some(Token::Number(value)) => Ok(Expr::Literal(value)),
            Some(Token::Text(text)) => Ok(Expr::Literal(Value::String(text))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::Punct("(")) => {
                    self.cursor += 1;
                    let mut arguments = Vec::new();
                    if !self.eat(")") {
                        loop {
                            arguments.push(self.parse_expression()?);
                            if !self.eat(",") {
                                break;
                            }
                        }
                        self.expect(")")?;
                    }
                    Ok(Expr::Call(name, arguments))
                }
                // A bare word reads as itself, like an old style constant.
                _ => Ok(Expr::Literal(Value::String(name))),
            },
            Some(Token::Punct("(")) => {
                let expression = self.parse_expression()?;
                self.expect(")")?;
                Ok(expression)
            }
            _ => Err(self.unexpected("expected a value".into())),
        }
    }
}
