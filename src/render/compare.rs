use super::expr::Operator;
use crate::log::{Error, INCOMPATIBLE_TYPES};
use serde_json::{json, Value};

/// Return true if the given [`Value`] is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(boolean) => *boolean,
        Value::Number(number) => number.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(string) => !string.is_empty() && string != "0",
        Value::Array(array) => !array.is_empty(),
        Value::Object(object) => !object.is_empty(),
        Value::Null => false,
    }
}

/// Return true if the two [`Value`] instances are loosely equal.
///
/// Null equals only null, numbers compare numerically, and a numeric
/// string compares numerically against a number. Values of otherwise
/// mismatched types are never equal.
pub fn equals_values(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Number(left), Value::Number(right)) => {
            left.as_f64().unwrap_or(0.0) == right.as_f64().unwrap_or(0.0)
        }
        (Value::Number(number), Value::String(string))
        | (Value::String(string), Value::Number(number)) => string
            .parse::<f64>()
            .is_ok_and(|parsed| parsed == number.as_f64().unwrap_or(0.0)),
        (left, right) => left == right,
    }
}

/// Compare the two [`Value`] instances with the given ordering
/// [`Operator`].
///
/// # Errors
///
/// Returns an [`Error`] if the two types cannot be ordered against one
/// another.
pub fn compare_values(left: &Value, operator: &Operator, right: &Value) -> Result<bool, Error> {
    let result = match (left, right) {
        (Value::Number(left), Value::Number(right)) => {
            let left = left.as_f64().unwrap_or(0.0);
            let right = right.as_f64().unwrap_or(0.0);
            match operator {
                Operator::Greater => left > right,
                Operator::Lesser => left < right,
                Operator::GreaterOrEqual => left >= right,
                Operator::LesserOrEqual => left <= right,
                _ => return Err(unsupported(operator)),
            }
        }
        (Value::String(left), Value::String(right)) => match operator {
            Operator::Greater => left > right,
            Operator::Lesser => left < right,
            Operator::GreaterOrEqual => left >= right,
            Operator::LesserOrEqual => left <= right,
            _ => return Err(unsupported(operator)),
        },
        (left, right) => {
            return Err(Error::build(INCOMPATIBLE_TYPES).with_help(format!(
                "values `{left}` and `{right}` cannot be ordered against one another"
            )))
        }
    };

    Ok(result)
}

/// Apply the given arithmetic [`Operator`] to the two [`Value`]
/// instances.
///
/// # Errors
///
/// Returns an [`Error`] if the `Operator` cannot be applied to the
/// types, or on division by zero.
pub fn arithmetic_values(left: &Value, operator: &Operator, right: &Value) -> Result<Value, Error> {
    if let Operator::Concat = operator {
        return Ok(Value::String(format!(
            "{}{}",
            stringify(left),
            stringify(right)
        )));
    }

    let (Some(left), Some(right)) = (left.as_f64(), right.as_f64()) else {
        return Err(Error::build(INCOMPATIBLE_TYPES).with_help(format!(
            "operator `{operator}` expects numbers, received `{left}` and `{right}`"
        )));
    };

    let result = match operator {
        Operator::Add => left + right,
        Operator::Subtract => left - right,
        Operator::Multiply => left * right,
        Operator::Divide | Operator::Modulo if right == 0.0 => {
            return Err(Error::build(INCOMPATIBLE_TYPES).with_help("division by zero"))
        }
        Operator::Divide => left / right,
        Operator::Modulo => left % right,
        _ => return Err(unsupported(operator)),
    };

    Ok(number(result))
}

/// Return the [`Value`] as the text an echo would produce.
pub fn stringify(value: &Value) -> String {
    let mut buffer = String::new();
    // Writing to a String cannot fail.
    let _ = crate::pipe::Pipe::new(&mut buffer).write_value(value);

    buffer
}

/// Collapse an integral result back to an integer [`Value`].
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

fn unsupported(operator: &Operator) -> Error {
    Error::build(INCOMPATIBLE_TYPES)
        .with_help(format!("operator `{operator}` is invalid on these types"))
}

#[cfg(test)]
mod tests {
    use super::{arithmetic_values, compare_values, equals_values, is_truthy};
    use crate::render::expr::Operator;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        for value in [json!("lorem"), json!(12), json!(-1.5), json!(true), json!([1])] {
            assert!(is_truthy(&value), "{value}");
        }
        for value in [json!(""), json!("0"), json!(0), json!(false), json!(null), json!([])] {
            assert!(!is_truthy(&value), "{value}");
        }
    }

    #[test]
    fn test_equals_loose() {
        assert!(equals_values(&json!(null), &json!(null)));
        assert!(equals_values(&json!(1), &json!(1.0)));
        assert!(equals_values(&json!("2"), &json!(2)));
        assert!(!equals_values(&json!("a"), &json!(2)));
        assert!(!equals_values(&json!(0), &json!(null)));
        assert!(!equals_values(&json!(false), &json!(0)));
    }

    #[test]
    fn test_compare_orderings() {
        assert!(compare_values(&json!(2), &Operator::Greater, &json!(1)).unwrap());
        assert!(compare_values(&json!("a"), &Operator::Lesser, &json!("b")).unwrap());
        assert!(compare_values(&json!(2), &Operator::GreaterOrEqual, &json!(2)).unwrap());
        assert!(compare_values(&json!(true), &Operator::Greater, &json!(false)).is_err());
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            arithmetic_values(&json!(2), &Operator::Add, &json!(3)).unwrap(),
            json!(5)
        );
        assert_eq!(
            arithmetic_values(&json!(7), &Operator::Modulo, &json!(4)).unwrap(),
            json!(3)
        );
        assert_eq!(
            arithmetic_values(&json!(5), &Operator::Divide, &json!(2)).unwrap(),
            json!(2.5)
        );
        assert!(arithmetic_values(&json!(5), &Operator::Divide, &json!(0)).is_err());
    }

    #[test]
    fn test_concat() {
        assert_eq!(
            arithmetic_values(&json!("a"), &Operator::Concat, &json!(1)).unwrap(),
            json!("a1")
        );
    }
}
