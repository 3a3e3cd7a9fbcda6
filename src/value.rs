//! Dynamic values that templates are evaluated over

use crate::constants::NO_VALUE;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A value reachable from a template
///
/// Maps keep their keys sorted, which is also the order `range` walks them in.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value. Printed as `<no value>`
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Raw bytes, e.g. the output of `gzip`
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Name of the kind of the value, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float64",
            Self::String(_) => "string",
            Self::Bytes(_) => "[]uint8",
            Self::List(_) => "[]interface {}",
            Self::Map(_) => "map[string]interface {}",
        }
    }

    /// Truth of the value for `if`, `with`, `and`, `or` and `not`
    ///
    /// False, zero, nil and empty values are false; everything else is true.
    pub fn is_true(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Map(m) => !m.is_empty(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Length of a string, byte string, list or map
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.len()),
            Self::Bytes(b) => Some(b.len()),
            Self::List(l) => Some(l.len()),
            Self::Map(m) => Some(m.len()),
            _ => None,
        }
    }

    /// The value as text, the way `print` would show it
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Compare two basic values. Numbers compare across int and float.
    ///
    /// Returns [`None`] if the values are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Nil, Self::Nil) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "{NO_VALUE}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{}", format_float(*x)),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Self::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::Map(m) => {
                write!(f, "map[")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Format a float like Go's `%v`: shortest digits, in exponent form
/// when the exponent is below -4 or at least 6
pub(crate) fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let scientific = format!("{x:e}");
    let exponent = scientific
        .rsplit_once('e')
        .and_then(|(_, e)| e.parse::<i32>().ok())
        .unwrap_or(0);
    if (-4..6).contains(&exponent) {
        x.to_string()
    } else {
        go_exponent(&scientific)
    }
}

/// Rewrite an exponent like `1.5e7` the way Go prints it, `1.5e+07`
pub(crate) fn go_exponent(scientific: &str) -> String {
    match scientific.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => scientific.to_string(),
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Nil => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::String(s) => serializer.serialize_str(s),
            // YAML has no byte strings
            Self::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            Self::List(l) => {
                let mut seq = serializer.serialize_seq(Some(l.len()))?;
                for v in l {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Self::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(v: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Yaml;
        match v {
            Yaml::Null => Self::Nil,
            Yaml::Bool(b) => Self::Bool(b),
            Yaml::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Yaml::String(s) => Self::String(s),
            Yaml::Sequence(seq) => Self::List(seq.into_iter().map(Value::from).collect()),
            Yaml::Mapping(mapping) => Self::Map(
                mapping
                    .into_iter()
                    .map(|(k, v)| (yaml_key(k), Value::from(v)))
                    .collect(),
            ),
            Yaml::Tagged(tagged) => Value::from(tagged.value),
        }
    }
}

/// Map keys are always strings once loaded
fn yaml_key(k: serde_yaml::Value) -> String {
    match k {
        serde_yaml::Value::String(s) => s,
        other => Value::from(other).to_string(),
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Self::Nil,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Self::String(s),
            Json::Array(a) => Self::List(a.into_iter().map(Value::from).collect()),
            Json::Object(o) => Self::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Self::List(l)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Self::Map(m)
    }
}

#[cfg(test)]
mod ut {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!("<no value>", Value::Nil.to_string());
        assert_eq!("true", Value::Bool(true).to_string());
        assert_eq!("42", Value::Int(42).to_string());
        assert_eq!("1.5", Value::Float(1.5).to_string());
    }

    #[test]
    fn test_display_floats() {
        assert_eq!("1e+20", Value::Float(1e20).to_string());
        assert_eq!("1e+06", Value::Float(1e6).to_string());
        assert_eq!("123456", Value::Float(123456.0).to_string());
        assert_eq!("-2.5e-05", Value::Float(-0.000025).to_string());
        assert_eq!("0.0001", Value::Float(0.0001).to_string());
        assert_eq!("0", Value::Float(0.0).to_string());
        assert_eq!("+Inf", Value::Float(f64::INFINITY).to_string());
        assert_eq!("hi", Value::from("hi").to_string());
    }

    #[test]
    fn test_display_collections() {
        let list = Value::List(vec![Value::Int(1), Value::from("a")]);
        assert_eq!("[1 a]", list.to_string());
        let mut m = BTreeMap::new();
        m.insert("b".to_string(), Value::Int(2));
        m.insert("a".to_string(), Value::Int(1));
        assert_eq!("map[a:1 b:2]", Value::Map(m).to_string());
    }

    #[test]
    fn test_truth() {
        assert!(!Value::Nil.is_true());
        assert!(!Value::Int(0).is_true());
        assert!(!Value::from("").is_true());
        assert!(!Value::List(vec![]).is_true());
        assert!(Value::from("x").is_true());
        assert!(Value::Float(0.1).is_true());
    }

    #[test]
    fn test_compare_numbers() {
        assert_eq!(Some(Ordering::Less), Value::Int(1).compare(&Value::Float(1.5)));
        assert_eq!(Some(Ordering::Equal), Value::Float(2.0).compare(&Value::Int(2)));
        assert_eq!(None, Value::Int(1).compare(&Value::from("1")));
    }

    #[test]
    fn test_from_yaml() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("a: 1\nb: [x, 2.5]\n3: null\nc: {d: true}").unwrap();
        let v = Value::from(yaml);
        let Value::Map(m) = v else {
            panic!("expected map");
        };
        assert_eq!(Value::Int(1), m["a"]);
        assert_eq!(
            Value::List(vec![Value::from("x"), Value::Float(2.5)]),
            m["b"]
        );
        assert_eq!(Value::Nil, m["3"]);
        assert_eq!("map[d:true]", m["c"].to_string());
    }

    #[test]
    fn test_serialize_yaml() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("b: [1, two]\na: x").unwrap();
        let v = Value::from(yaml);
        let s = serde_yaml::to_string(&v).unwrap();
        assert_eq!("a: x\nb:\n- 1\n- two\n", s);
    }
}
