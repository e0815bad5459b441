use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::TemplateErrorKind;
use crate::output_format::MarkupOutput;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    pub fn numeric_eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
        }
    }

    pub fn add(&self, other: &Self) -> Self {
        match (*self, *other) {
            (Self::Int(left), Self::Int(right)) => left
                .checked_add(right)
                .map_or_else(|| Self::Float(self.as_f64() + other.as_f64()), Self::Int),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                Self::Float(self.as_f64() + other.as_f64())
            }
        }
    }

    /// Source form of the number, re-parseable as a literal.
    pub fn canonical_form(&self) -> String {
        match *self {
            Self::Int(value) => value.to_string(),
            Self::Float(value) if value.fract() == 0.0 && value.is_finite() => format!("{value}.0"),
            Self::Float(value) => format!("{value}"),
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A mutable variable set shared by reference.
///
/// Cloning the handle aliases the same mapping, which is how a template and
/// everyone importing it see each other's writes. It is never deep-copied on
/// import.
#[derive(Clone, Default)]
pub struct Namespace {
    vars: Arc<RwLock<HashMap<String, Value>>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.read().get(name).cloned()
    }

    pub fn put<N: Into<String>>(&self, name: N, value: Value) -> Option<Value> {
        self.vars.write().insert(name.into(), value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.vars.read().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Whether both handles refer to the same mapping.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.vars, &other.vars)
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace").field("keys", &self.keys()).finish()
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(Number),
    Boolean(bool),
    Sequence(Vec<Value>),
    Markup(MarkupOutput),
    Namespace(Namespace),
}

impl Value {
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "a string",
            Self::Number(_) => "a number",
            Self::Boolean(_) => "a boolean",
            Self::Sequence(_) => "a sequence",
            Self::Markup(_) => "a markup output",
            Self::Namespace(_) => "a namespace",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Number(_)
            | Self::Boolean(_)
            | Self::Sequence(_)
            | Self::Markup(_)
            | Self::Namespace(_) => None,
        }
    }

    /// The language's `==`.
    ///
    /// Markup is compared by its markup text and only against the same
    /// format; plain text compared with markup is escaped first.
    pub fn equals(&self, other: &Self) -> Result<bool, TemplateErrorKind> {
        match (self, other) {
            (Self::String(left), Self::String(right)) => Ok(left == right),
            (Self::Number(left), Self::Number(right)) => Ok(left.numeric_eq(right)),
            (Self::Boolean(left), Self::Boolean(right)) => Ok(left == right),
            (Self::Markup(left), Self::Markup(right)) => {
                if !crate::output_format::is_same_format(left.format(), right.format()) {
                    return Err(TemplateErrorKind::IncompatibleOutputFormats {
                        left: left.format().name().to_string(),
                        right: right.format().name().to_string(),
                    });
                }
                Ok(left.markup_text() == right.markup_text())
            }
            (Self::Markup(markup), Self::String(plain))
            | (Self::String(plain), Self::Markup(markup)) => {
                Ok(markup.format().escape_plain_text(plain) == markup.markup_text())
            }
            (left, right) => Err(TemplateErrorKind::TypeMismatch {
                expected: format!("a value comparable with {}", left.type_name()),
                found: right.type_name().to_string(),
            }),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(Number::Int(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(Number::Float(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<MarkupOutput> for Value {
    fn from(value: MarkupOutput) -> Self {
        Self::Markup(value)
    }
}

impl From<Namespace> for Value {
    fn from(value: Namespace) -> Self {
        Self::Namespace(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Sequence(value.into_iter().map(Into::into).collect())
    }
}

/// The read-only root variables handed to a render.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataModel {
    data: BTreeMap<String, Value>,
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: AsRef<str>, V: Into<Value>>(&mut self, name: N, value: V) -> &mut Self {
        self.data.insert(name.as_ref().to_string(), value.into());
        self
    }

    pub fn get<N: AsRef<str>>(&self, name: N) -> Option<&Value> {
        self.data.get(name.as_ref())
    }

    pub fn contains<N: AsRef<str>>(&self, name: N) -> bool {
        self.data.contains_key(name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use serde::de::{self, MapAccess, SeqAccess, Visitor};
    use serde::ser::{SerializeMap, SerializeSeq};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Namespace, Number, Value};

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Self::String(s) => serializer.serialize_str(s),
                Self::Number(Number::Int(i)) => serializer.serialize_i64(*i),
                Self::Number(Number::Float(f)) => serializer.serialize_f64(*f),
                Self::Boolean(b) => serializer.serialize_bool(*b),
                Self::Sequence(items) => {
                    let mut seq = serializer.serialize_seq(Some(items.len()))?;
                    for item in items {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
                Self::Markup(markup) => serializer.serialize_str(markup.markup_text()),
                Self::Namespace(namespace) => {
                    let keys = namespace.keys();
                    let mut map = serializer.serialize_map(Some(keys.len()))?;
                    for key in keys {
                        if let Some(value) = namespace.get(&key) {
                            map.serialize_entry(&key, &value)?;
                        }
                    }
                    map.end()
                }
            }
        }
    }

    struct ValueVisitor;

    impl<'de> Visitor<'de> for ValueVisitor {
        type Value = Value;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "a string, number, boolean, sequence or map")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
            Ok(Value::Boolean(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
            Ok(Value::Number(Number::Int(v)))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
            Ok(Value::Number(
                i64::try_from(v).map_or(Number::Float(v as f64), Number::Int),
            ))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
            Ok(Value::Number(Number::Float(v)))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
            Ok(Value::String(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
            Ok(Value::String(v))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
            let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(item) = seq.next_element()? {
                items.push(item);
            }
            Ok(Value::Sequence(items))
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
            let namespace = Namespace::new();
            while let Some((key, value)) = map.next_entry::<String, Value>()? {
                namespace.put(key, value);
            }
            Ok(Value::Namespace(namespace))
        }
    }

    impl<'de> Deserialize<'de> for Value {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(ValueVisitor)
        }
    }
}
