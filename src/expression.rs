//! The small expression language directives are parameterised with.

use crate::environment::Environment;
use crate::error::{TemplateError, TemplateErrorKind};
use crate::output_format::{HTML, MarkupFormatRef, RTF, XHTML, XML};
use crate::value::{Number, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(Number),
    Boolean(bool),
}

/// Escaping built-ins from before auto-escaping existed, like `x?html`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LegacyEscape {
    Html,
    Xhtml,
    Xml,
    Rtf,
}

impl LegacyEscape {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Xhtml => "xhtml",
            Self::Xml => "xml",
            Self::Rtf => "rtf",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "html" => Some(Self::Html),
            "xhtml" => Some(Self::Xhtml),
            "xml" => Some(Self::Xml),
            "rtf" => Some(Self::Rtf),
            _ => None,
        }
    }

    /// The format whose escaping rule this built-in applies.
    pub fn format(&self) -> MarkupFormatRef {
        match self {
            Self::Html => &HTML,
            Self::Xhtml => &XHTML,
            Self::Xml => &XML,
            Self::Rtf => &RTF,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Variable(String),
    Sequence(Vec<Expression>),
    Parenthetical(Box<Expression>),
    Add(Box<Expression>, Box<Expression>),
    LegacyEscape {
        target: Box<Expression>,
        builtin: LegacyEscape,
    },
}

impl Expression {
    pub fn string<S: Into<String>>(value: S) -> Self {
        Self::Literal(Literal::String(value.into()))
    }

    pub fn number<N: Into<Number>>(value: N) -> Self {
        Self::Literal(Literal::Number(value.into()))
    }

    pub const fn boolean(value: bool) -> Self {
        Self::Literal(Literal::Boolean(value))
    }

    pub fn variable<S: Into<String>>(name: S) -> Self {
        Self::Variable(name.into())
    }

    pub fn add(left: Self, right: Self) -> Self {
        Self::Add(Box::new(left), Box::new(right))
    }

    pub fn eval(&self, env: &mut Environment<'_>) -> Result<Value, TemplateError> {
        match self {
            Self::Literal(Literal::String(s)) => Ok(Value::String(s.clone())),
            Self::Literal(Literal::Number(n)) => Ok(Value::Number(*n)),
            Self::Literal(Literal::Boolean(b)) => Ok(Value::Boolean(*b)),
            Self::Variable(name) => env.get_variable(name).ok_or_else(|| {
                TemplateErrorKind::UndefinedVariable { name: name.clone() }.into()
            }),
            Self::Sequence(items) => items
                .iter()
                .map(|item| item.eval(env))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Sequence),
            Self::Parenthetical(inner) => inner.eval(env),
            Self::Add(left, right) => {
                let left = left.eval(env)?;
                let right = right.eval(env)?;
                add_values(left, right, env).map_err(TemplateError::from)
            }
            Self::LegacyEscape { target, builtin } => {
                let target = target.eval(env)?;
                apply_legacy_escape(*builtin, target, env).map_err(TemplateError::from)
            }
        }
    }

    pub fn eval_to_number(&self, env: &mut Environment<'_>) -> Result<Number, TemplateError> {
        match self.eval(env)? {
            Value::Number(number) => Ok(number),
            other => Err(TemplateErrorKind::TypeMismatch {
                expected: "a number".to_string(),
                found: other.type_name().to_string(),
            }
            .into()),
        }
    }

    /// Source form that parses back into an equal expression.
    pub fn canonical_form(&self) -> String {
        match self {
            Self::Literal(Literal::String(s)) => quote_string(s),
            Self::Literal(Literal::Number(n)) => n.canonical_form(),
            Self::Literal(Literal::Boolean(b)) => b.to_string(),
            Self::Variable(name) => name.clone(),
            Self::Sequence(items) => {
                let items: Vec<String> = items.iter().map(Self::canonical_form).collect();
                format!("[{}]", items.join(", "))
            }
            Self::Parenthetical(inner) => format!("({})", inner.canonical_form()),
            Self::Add(left, right) => {
                format!("{} + {}", left.canonical_form(), right.canonical_form())
            }
            Self::LegacyEscape { target, builtin } => match target.as_ref() {
                Self::Add(..) => format!("({})?{}", target.canonical_form(), builtin.name()),
                Self::Literal(_)
                | Self::Variable(_)
                | Self::Sequence(_)
                | Self::Parenthetical(_)
                | Self::LegacyEscape { .. } => {
                    format!("{}?{}", target.canonical_form(), builtin.name())
                }
            },
        }
    }

    /// Appends the names of variables this expression reads.
    pub fn collect_variables<'e>(&'e self, names: &mut Vec<&'e str>) {
        match self {
            Self::Variable(name) => names.push(name),
            Self::Sequence(items) => {
                for item in items {
                    item.collect_variables(names);
                }
            }
            Self::Parenthetical(inner) | Self::LegacyEscape { target: inner, .. } => {
                inner.collect_variables(names);
            }
            Self::Add(left, right) => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Self::Literal(_) => {}
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_form())
    }
}

fn quote_string(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for ch in s.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

/// Converts a string or number to text; anything else can't be printed.
pub(crate) fn scalar_to_string(
    value: &Value,
    env: &mut Environment<'_>,
) -> Result<String, TemplateErrorKind> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(env.format_number(n)),
        Value::Boolean(_) | Value::Sequence(_) | Value::Markup(_) | Value::Namespace(_) => {
            Err(TemplateErrorKind::TypeMismatch {
                expected: "a string or number".to_string(),
                found: value.type_name().to_string(),
            })
        }
    }
}

fn add_values(
    left: Value,
    right: Value,
    env: &mut Environment<'_>,
) -> Result<Value, TemplateErrorKind> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l.add(&r))),
        (Value::Sequence(mut l), Value::Sequence(r)) => {
            l.extend(r);
            Ok(Value::Sequence(l))
        }
        (Value::Markup(l), Value::Markup(r)) => l.concat(&r).map(Value::Markup),
        (Value::Markup(l), r) => {
            let plain = scalar_to_string(&r, env)?;
            l.concat(&l.format().from_plain_text(&plain)).map(Value::Markup)
        }
        (l, Value::Markup(r)) => {
            let plain = scalar_to_string(&l, env)?;
            r.format().from_plain_text(&plain).concat(&r).map(Value::Markup)
        }
        (l, r) => {
            let mut joined = scalar_to_string(&l, env)?;
            joined.push_str(&scalar_to_string(&r, env)?);
            Ok(Value::String(joined))
        }
    }
}

fn apply_legacy_escape(
    builtin: LegacyEscape,
    target: Value,
    env: &mut Environment<'_>,
) -> Result<Value, TemplateErrorKind> {
    match target {
        Value::Markup(markup) => {
            if markup.format().is_legacy_builtin_bypassed(builtin.name()) {
                Ok(Value::Markup(markup))
            } else {
                Err(TemplateErrorKind::LegacyBuiltInOnMarkup {
                    builtin: builtin.name().to_string(),
                    format: markup.format().name().to_string(),
                })
            }
        }
        other => {
            let plain = scalar_to_string(&other, env)?;
            Ok(Value::String(builtin.format().escape_plain_text(&plain)))
        }
    }
}
