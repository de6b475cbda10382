//! XPath core function library

use super::eval::{Context, Evaluator};
use super::{parse_number, Value, XPathError};

/// A supported XPath function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    // Node-set
    Count,
    Last,
    Position,
    Name,
    LocalName,
    Sum,
    // String
    String,
    Concat,
    Contains,
    StartsWith,
    StringLength,
    NormalizeSpace,
    Substring,
    SubstringBefore,
    SubstringAfter,
    Translate,
    // Boolean
    Boolean,
    Not,
    True,
    False,
    // Number
    Number,
    Floor,
    Ceiling,
    Round,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "count" => Function::Count,
            "last" => Function::Last,
            "position" => Function::Position,
            "name" => Function::Name,
            "local-name" => Function::LocalName,
            "sum" => Function::Sum,
            "string" => Function::String,
            "concat" => Function::Concat,
            "contains" => Function::Contains,
            "starts-with" => Function::StartsWith,
            "string-length" => Function::StringLength,
            "normalize-space" => Function::NormalizeSpace,
            "substring" => Function::Substring,
            "substring-before" => Function::SubstringBefore,
            "substring-after" => Function::SubstringAfter,
            "translate" => Function::Translate,
            "boolean" => Function::Boolean,
            "not" => Function::Not,
            "true" => Function::True,
            "false" => Function::False,
            "number" => Function::Number,
            "floor" => Function::Floor,
            "ceiling" => Function::Ceiling,
            "round" => Function::Round,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Count => "count",
            Function::Last => "last",
            Function::Position => "position",
            Function::Name => "name",
            Function::LocalName => "local-name",
            Function::Sum => "sum",
            Function::String => "string",
            Function::Concat => "concat",
            Function::Contains => "contains",
            Function::StartsWith => "starts-with",
            Function::StringLength => "string-length",
            Function::NormalizeSpace => "normalize-space",
            Function::Substring => "substring",
            Function::SubstringBefore => "substring-before",
            Function::SubstringAfter => "substring-after",
            Function::Translate => "translate",
            Function::Boolean => "boolean",
            Function::Not => "not",
            Function::True => "true",
            Function::False => "false",
            Function::Number => "number",
            Function::Floor => "floor",
            Function::Ceiling => "ceiling",
            Function::Round => "round",
        }
    }

    /// Minimum and maximum argument count (None = unbounded)
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Last | Function::Position | Function::True | Function::False => (0, Some(0)),
            Function::Name
            | Function::LocalName
            | Function::String
            | Function::StringLength
            | Function::NormalizeSpace
            | Function::Number => (0, Some(1)),
            Function::Count
            | Function::Sum
            | Function::Boolean
            | Function::Not
            | Function::Floor
            | Function::Ceiling
            | Function::Round => (1, Some(1)),
            Function::Contains
            | Function::StartsWith
            | Function::SubstringBefore
            | Function::SubstringAfter => (2, Some(2)),
            Function::Substring => (2, Some(3)),
            Function::Translate => (3, Some(3)),
            Function::Concat => (2, None),
        }
    }

    pub fn check_arity(self, expr: &str, found: usize) -> Result<(), XPathError> {
        let (min, max) = self.arity();
        if found >= min && max.map_or(true, |max| found <= max) {
            return Ok(());
        }
        let expected = match max {
            Some(max) if max == min => min.to_string(),
            Some(max) => format!("{min} to {max}"),
            None => format!("at least {min}"),
        };
        Err(XPathError::Arity {
            expr: expr.to_string(),
            name: self.name(),
            expected,
            found,
        })
    }

    /// Apply the function to already-evaluated arguments
    pub(super) fn call(
        self,
        ev: &Evaluator<'_>,
        ctx: &Context,
        args: Vec<Value>,
    ) -> Result<Value, XPathError> {
        let doc = ev.doc();
        let string_arg = |i: usize| -> String {
            args.get(i)
                .map_or_else(|| ctx.node.string_value(doc), |v| v.to_string_value(doc))
        };
        let number_arg = |i: usize| -> f64 { args.get(i).map_or(f64::NAN, |v| v.to_number(doc)) };

        Ok(match self {
            Function::Count => Value::Number(ev.node_set_arg(&args[0])?.len() as f64),
            Function::Last => Value::Number(ctx.size as f64),
            Function::Position => Value::Number(ctx.position as f64),
            Function::Name | Function::LocalName => {
                let node = match args.first() {
                    Some(v) => ev.node_set_arg(v)?.first().copied(),
                    None => Some(ctx.node),
                };
                Value::String(node.map(|n| n.name(doc).to_string()).unwrap_or_default())
            }
            Function::Sum => Value::Number(
                ev.node_set_arg(&args[0])?
                    .iter()
                    .map(|n| parse_number(&n.string_value(doc)))
                    .sum(),
            ),
            Function::String => Value::String(string_arg(0)),
            Function::Concat => Value::String(args.iter().map(|v| v.to_string_value(doc)).collect()),
            Function::Contains => Value::Boolean(string_arg(0).contains(&string_arg(1))),
            Function::StartsWith => Value::Boolean(string_arg(0).starts_with(&string_arg(1))),
            Function::StringLength => Value::Number(string_arg(0).chars().count() as f64),
            Function::NormalizeSpace => {
                Value::String(string_arg(0).split_whitespace().collect::<Vec<_>>().join(" "))
            }
            Function::Substring => {
                let s = string_arg(0);
                let len = args.get(2).map(|v| v.to_number(doc));
                Value::String(substring(&s, number_arg(1), len))
            }
            Function::SubstringBefore => {
                let (s, needle) = (string_arg(0), string_arg(1));
                Value::String(s.find(&needle).map(|i| s[..i].to_string()).unwrap_or_default())
            }
            Function::SubstringAfter => {
                let (s, needle) = (string_arg(0), string_arg(1));
                Value::String(
                    s.find(&needle)
                        .map(|i| s[i + needle.len()..].to_string())
                        .unwrap_or_default(),
                )
            }
            Function::Translate => {
                let (s, from, to) = (string_arg(0), string_arg(1), string_arg(2));
                Value::String(translate(&s, &from, &to))
            }
            Function::Boolean => Value::Boolean(args[0].to_boolean()),
            Function::Not => Value::Boolean(!args[0].to_boolean()),
            Function::True => Value::Boolean(true),
            Function::False => Value::Boolean(false),
            Function::Number => Value::Number(match args.first() {
                Some(v) => v.to_number(doc),
                None => parse_number(&ctx.node.string_value(doc)),
            }),
            Function::Floor => Value::Number(number_arg(0).floor()),
            Function::Ceiling => Value::Number(number_arg(0).ceil()),
            Function::Round => Value::Number(round(number_arg(0))),
        })
    }
}

/// XPath rounding: halves round towards positive infinity
fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

/// XPath `substring()`: 1-based positions, rounded arguments, characters
/// whose position p satisfies `start <= p < start + len`
fn substring(s: &str, start: f64, len: Option<f64>) -> String {
    let start = round(start);
    let end = len.map_or(f64::INFINITY, |len| start + round(len));
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= start && p < end
        })
        .map(|(_, c)| c)
        .collect()
}

/// XPath `translate()`: map characters of `from` to the character at the
/// same position in `to`, dropping those without a counterpart
fn translate(s: &str, from: &str, to: &str) -> String {
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    s.chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect()
}
