//! Generic helper library: strings, defaults, encoding, math and collections
//!
//! Names and argument orders follow the helpers commonly used with Go templates,
//! so the value being transformed comes last and works at the end of a pipeline:
//! `{{ .name | trimSuffix "-dev" | upper | quote }}`.

use super::{func_error, Arity, FuncMap};
use crate::constants::MAX_GENERATED_LEN;
use crate::error::FuncError;
use crate::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use error_stack::{IntoReport, Result, ResultExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub fn register(funcs: &mut FuncMap) {
    register_strings(funcs);
    register_defaults(funcs);
    register_encoding(funcs);
    register_math(funcs);
    register_collections(funcs);
    funcs.add1("env", |name: String| Ok(std::env::var(name).unwrap_or_default()));
}

fn register_strings(funcs: &mut FuncMap) {
    funcs.add1("upper", |s: String| Ok(s.to_uppercase()));
    funcs.add1("lower", |s: String| Ok(s.to_lowercase()));
    funcs.add1("title", |s: String| Ok(title(&s)));
    funcs.add1("trim", |s: String| Ok(s.trim().to_string()));
    funcs.add2("trimAll", |cutset: String, s: String| {
        Ok(s.trim_matches(|c: char| cutset.contains(c)).to_string())
    });
    funcs.add2("trimPrefix", |prefix: String, s: String| {
        Ok(s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_string())
    });
    funcs.add2("trimSuffix", |suffix: String, s: String| {
        Ok(s.strip_suffix(suffix.as_str()).unwrap_or(&s).to_string())
    });
    funcs.add2("trunc", |n: i64, s: String| {
        let len = s.chars().count() as i64;
        Ok(if n >= 0 {
            s.chars().take(n as usize).collect::<String>()
        } else {
            s.chars().skip((len + n).max(0) as usize).collect()
        })
    });
    funcs.add3("replace", |old: String, new: String, s: String| {
        Ok(s.replace(&old, &new))
    });
    funcs.add2("repeat", |n: i64, s: String| {
        let n = generated_len(n, s.len(), 0)?;
        Ok(s.repeat(n))
    });
    funcs.add2("contains", |sub: String, s: String| Ok(s.contains(&sub)));
    funcs.add2("hasPrefix", |prefix: String, s: String| Ok(s.starts_with(&prefix)));
    funcs.add2("hasSuffix", |suffix: String, s: String| Ok(s.ends_with(&suffix)));
    funcs.add_variadic("quote", Arity::AtLeast(0), |args| {
        Ok(args
            .iter()
            .filter(|v| !v.is_nil())
            .map(|v| format!("{:?}", v.to_text()))
            .collect::<Vec<_>>()
            .join(" "))
    });
    funcs.add_variadic("squote", Arity::AtLeast(0), |args| {
        Ok(args
            .iter()
            .filter(|v| !v.is_nil())
            .map(|v| format!("'{}'", v.to_text()))
            .collect::<Vec<_>>()
            .join(" "))
    });
    funcs.add_variadic("cat", Arity::AtLeast(0), |args| {
        Ok(args
            .iter()
            .filter(|v| !v.is_nil())
            .map(Value::to_text)
            .collect::<Vec<_>>()
            .join(" "))
    });
    funcs.add2("indent", |n: i64, s: String| indent(n, &s));
    funcs.add2("nindent", |n: i64, s: String| Ok(format!("\n{}", indent(n, &s)?)));
    funcs.add1("nospace", |s: String| {
        Ok(s.chars().filter(|c| !c.is_whitespace()).collect::<String>())
    });
    funcs.add3("substr", |start: i64, end: i64, s: String| {
        let bytes = s.as_bytes();
        let start = start.clamp(0, bytes.len() as i64) as usize;
        let end = if end < 0 || end as usize > bytes.len() {
            bytes.len()
        } else {
            end as usize
        };
        if start > end {
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&bytes[start..end]).into_owned())
    });
    funcs.add2("splitList", |sep: String, s: String| {
        Ok(s.split(sep.as_str())
            .map(Value::from)
            .collect::<Vec<_>>())
    });
    funcs.add2("join", |sep: String, list: Value| {
        let items = match list {
            Value::List(l) => l,
            Value::Nil => vec![],
            other => vec![other],
        };
        Ok(items
            .iter()
            .map(Value::to_text)
            .collect::<Vec<_>>()
            .join(&sep))
    });
    funcs.add1("toString", |v: Value| Ok(v.to_text()));
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

fn indent(n: i64, s: &str) -> Result<String, FuncError> {
    let lines = s.matches('\n').count() + 1;
    let n = generated_len(n, lines, s.len())?;
    let pad = " ".repeat(n);
    Ok(format!("{pad}{}", s.replace('\n', &format!("\n{pad}"))))
}

/// Check that `count` copies of `unit` plus `extra` stay within [`MAX_GENERATED_LEN`],
/// returning `count` clamped at zero
fn generated_len(count: i64, unit: usize, extra: usize) -> Result<usize, FuncError> {
    let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
    count
        .checked_mul(unit)
        .and_then(|total| total.checked_add(extra))
        .filter(|total| *total <= MAX_GENERATED_LEN)
        .map(|_| count)
        .ok_or_else(|| {
            func_error(format!(
                "result would exceed {MAX_GENERATED_LEN} bytes or elements"
            ))
        })
}

fn register_defaults(funcs: &mut FuncMap) {
    // `default "x" .value` or `.value | default "x"`
    funcs.add_variadic("default", Arity::Between(1, 2), |mut args| {
        let given = if args.len() == 2 {
            args.pop().unwrap_or_default()
        } else {
            Value::Nil
        };
        let fallback = args.pop().unwrap_or_default();
        Ok(if given.is_true() { given } else { fallback })
    });
    funcs.add1("empty", |v: Value| Ok(!v.is_true()));
    funcs.add_variadic("coalesce", Arity::AtLeast(0), |args| {
        Ok(args.into_iter().find(Value::is_true).unwrap_or_default())
    });
    funcs.add3("ternary", |yes: Value, no: Value, cond: bool| {
        Ok(if cond { yes } else { no })
    });
    funcs.add2("required", |message: String, v: Value| {
        if v.is_nil() || v == Value::from("") {
            Err(func_error(message))
        } else {
            Ok(v)
        }
    });
}

fn register_encoding(funcs: &mut FuncMap) {
    funcs.add1("b64enc", |data: Vec<u8>| Ok(STANDARD.encode(data)));
    funcs.add1("b64dec", |s: String| {
        let decoded = STANDARD
            .decode(s.trim())
            .into_report()
            .change_context(FuncError::new("cannot decode base64"))?;
        // keep undecodable text as bytes so it survives until `ungzip`
        Ok(match String::from_utf8(decoded) {
            Ok(s) => Value::String(s),
            Err(e) => Value::Bytes(e.into_bytes()),
        })
    });
    funcs.add1("toJson", |v: Value| {
        serde_json::to_string(&v)
            .into_report()
            .change_context(FuncError::new("cannot serialize to JSON"))
    });
    funcs.add1("sha256sum", |data: Vec<u8>| {
        Ok(format!("{:x}", Sha256::digest(data)))
    });
}

fn register_math(funcs: &mut FuncMap) {
    funcs.add_variadic("add", Arity::AtLeast(0), |args| {
        fold_numbers(args, 0, |a, b| a + b, |a, b| a.checked_add(b))
    });
    funcs.add_variadic("mul", Arity::AtLeast(1), |args| {
        fold_numbers(args, 1, |a, b| a * b, |a, b| a.checked_mul(b))
    });
    funcs.add1("add1", |v: Value| {
        number_op(v, Value::Int(1), |a, b| a + b, |a, b| a.checked_add(b))
    });
    funcs.add2("sub", |a: Value, b: Value| {
        number_op(a, b, |a, b| a - b, |a, b| a.checked_sub(b))
    });
    funcs.add2("div", |a: Value, b: Value| {
        if matches!(b, Value::Int(0)) {
            return Err(func_error("integer divide by zero"));
        }
        number_op(a, b, |a, b| a / b, |a, b| a.checked_div(b))
    });
    funcs.add2("mod", |a: i64, b: i64| {
        a.checked_rem(b)
            .ok_or_else(|| func_error("integer divide by zero"))
    });
    funcs.add_variadic("max", Arity::AtLeast(1), |args| {
        pick_number(args, std::cmp::Ordering::Greater)
    });
    funcs.add_variadic("min", Arity::AtLeast(1), |args| {
        pick_number(args, std::cmp::Ordering::Less)
    });
    funcs.add1("int", |v: Value| Ok(to_int(&v)));
    funcs.add1("atoi", |v: Value| Ok(to_int(&v)));
    funcs.add1("float64", |v: Value| {
        Ok(match v {
            Value::Int(i) => i as f64,
            Value::Float(f) => f,
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            Value::Bool(b) => f64::from(u8::from(b)),
            _ => 0.0,
        })
    });
}

fn to_int(v: &Value) -> i64 {
    match v {
        Value::Int(i) => *i,
        Value::Float(f) => *f as i64,
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn as_number(v: Value) -> Result<Value, FuncError> {
    match v {
        Value::Int(_) | Value::Float(_) => Ok(v),
        Value::String(ref s) => {
            if let Ok(i) = s.trim().parse::<i64>() {
                Ok(Value::Int(i))
            } else if let Ok(f) = s.trim().parse::<f64>() {
                Ok(Value::Float(f))
            } else {
                Err(func_error(format!("expected a number; got {s:?}")))
            }
        }
        Value::Nil => Ok(Value::Int(0)),
        other => Err(func_error(format!("expected a number; got {}", other.kind()))),
    }
}

/// Apply an operation on two numbers, staying integer unless a float is involved
fn number_op(
    a: Value,
    b: Value,
    float_op: impl Fn(f64, f64) -> f64,
    int_op: impl Fn(i64, i64) -> Option<i64>,
) -> Result<Value, FuncError> {
    match (as_number(a)?, as_number(b)?) {
        (Value::Int(a), Value::Int(b)) => int_op(a, b)
            .map(Value::Int)
            .ok_or_else(|| func_error("integer overflow")),
        (a, b) => Ok(Value::Float(float_op(as_float(&a), as_float(&b)))),
    }
}

fn as_float(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => 0.0,
    }
}

fn fold_numbers(
    args: Vec<Value>,
    init: i64,
    float_op: impl Fn(f64, f64) -> f64 + Copy,
    int_op: impl Fn(i64, i64) -> Option<i64> + Copy,
) -> Result<Value, FuncError> {
    args.into_iter()
        .try_fold(Value::Int(init), |acc, v| number_op(acc, v, float_op, int_op))
}

fn pick_number(args: Vec<Value>, keep: std::cmp::Ordering) -> Result<Value, FuncError> {
    let mut best: Option<Value> = None;
    for v in args {
        let v = as_number(v)?;
        best = match best {
            Some(b) if v.compare(&b) != Some(keep) => Some(b),
            _ => Some(v),
        };
    }
    Ok(best.unwrap_or_default())
}

fn register_collections(funcs: &mut FuncMap) {
    funcs.add_variadic("list", Arity::AtLeast(0), Ok);
    funcs.add_variadic("dict", Arity::AtLeast(0), |args| {
        if args.len() % 2 != 0 {
            return Err(func_error("dict expects an even number of arguments"));
        }
        let mut map = BTreeMap::new();
        let mut args = args.into_iter();
        while let (Some(k), Some(v)) = (args.next(), args.next()) {
            map.insert(k.to_text(), v);
        }
        Ok(map)
    });
    funcs.add1("first", |l: Vec<Value>| Ok(l.into_iter().next().unwrap_or_default()));
    funcs.add1("last", |l: Vec<Value>| Ok(l.into_iter().last().unwrap_or_default()));
    funcs.add2("has", |needle: Value, l: Vec<Value>| Ok(l.contains(&needle)));
    funcs.add1("keys", |m: BTreeMap<String, Value>| {
        Ok(m.into_keys().map(Value::from).collect::<Vec<_>>())
    });
    funcs.add2("hasKey", |m: BTreeMap<String, Value>, key: String| {
        Ok(m.contains_key(&key))
    });
    funcs.add2("get", |m: BTreeMap<String, Value>, key: String| {
        Ok(m.get(&key).cloned().unwrap_or_else(|| Value::from("")))
    });
    funcs.add1("until", |n: i64| {
        generated_len(n, 1, 0)?;
        Ok((0..n.max(0)).map(Value::Int).collect::<Vec<_>>())
    });
}

#[cfg(test)]
mod ut {
    use super::*;

    fn funcs() -> FuncMap<'static> {
        let mut funcs = FuncMap::new();
        register(&mut funcs);
        funcs
    }

    fn call(name: &str, args: Vec<Value>) -> Value {
        funcs().get(name).unwrap().call(args).unwrap()
    }

    #[test]
    fn test_strings() {
        assert_eq!(Value::from("HELLO"), call("upper", vec![Value::from("hello")]));
        assert_eq!(Value::from("Hello World"), call("title", vec![Value::from("hello world")]));
        assert_eq!(
            Value::from("app"),
            call("trimSuffix", vec![Value::from("-dev"), Value::from("app-dev")])
        );
        assert_eq!(
            Value::from("a-b"),
            call("replace", vec![Value::from(" "), Value::from("-"), Value::from("a b")])
        );
        assert_eq!(
            Value::from("\"a\" \"b\""),
            call("quote", vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(Value::from("ab"), call("trunc", vec![Value::Int(2), Value::from("abc")]));
        assert_eq!(Value::from("bc"), call("trunc", vec![Value::Int(-2), Value::from("abc")]));
    }

    #[test]
    fn test_indent() {
        assert_eq!(
            Value::from("  a\n  b"),
            call("indent", vec![Value::Int(2), Value::from("a\nb")])
        );
        assert_eq!(
            Value::from("\n a"),
            call("nindent", vec![Value::Int(1), Value::from("a")])
        );
    }

    #[test]
    fn test_generated_len_is_bounded() {
        let funcs = funcs();
        let huge = Value::Int(i64::MAX);
        let err = funcs
            .get("repeat")
            .unwrap()
            .call(vec![huge.clone(), Value::from("ab")])
            .unwrap_err();
        assert!(err.current_context().reason.starts_with("result would exceed"));
        for name in ["indent", "nindent"] {
            assert!(funcs
                .get(name)
                .unwrap()
                .call(vec![huge.clone(), Value::from("a\nb")])
                .is_err());
        }
        assert!(funcs.get("until").unwrap().call(vec![huge]).is_err());
        assert_eq!(Value::from(""), call("repeat", vec![Value::Int(-3), Value::from("ab")]));
        assert_eq!(Value::from("abab"), call("repeat", vec![Value::Int(2), Value::from("ab")]));
    }

    #[test]
    fn test_default() {
        assert_eq!(Value::from("x"), call("default", vec![Value::from("x"), Value::Nil]));
        assert_eq!(Value::from("y"), call("default", vec![Value::from("x"), Value::from("y")]));
        assert_eq!(Value::from("x"), call("default", vec![Value::from("x")]));
        assert_eq!(Value::Int(3), call("coalesce", vec![Value::Nil, Value::Int(0), Value::Int(3)]));
    }

    #[test]
    fn test_required() {
        let err = funcs()
            .get("required")
            .unwrap()
            .call(vec![Value::from("name is required"), Value::Nil])
            .unwrap_err();
        assert_eq!("name is required", err.current_context().reason);
    }

    #[test]
    fn test_base64() {
        assert_eq!(Value::from("aGk="), call("b64enc", vec![Value::from("hi")]));
        assert_eq!(Value::from("hi"), call("b64dec", vec![Value::from("aGk=")]));
        assert_eq!(Value::Bytes(vec![0xff, 0x00]), call("b64dec", vec![Value::from("/wA=")]));
    }

    #[test]
    fn test_sha256() {
        assert_eq!(
            Value::from("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"),
            call("sha256sum", vec![Value::from("hello")])
        );
    }

    #[test]
    fn test_math() {
        assert_eq!(Value::Int(6), call("add", vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        assert_eq!(Value::Float(3.5), call("add", vec![Value::Int(1), Value::Float(2.5)]));
        assert_eq!(Value::Int(4), call("add1", vec![Value::Int(3)]));
        assert_eq!(Value::Int(-1), call("sub", vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(Value::Int(3), call("div", vec![Value::Int(7), Value::Int(2)]));
        assert_eq!(Value::Int(1), call("mod", vec![Value::Int(7), Value::Int(2)]));
        assert_eq!(Value::Int(9), call("max", vec![Value::Int(1), Value::Int(9), Value::Int(3)]));
        assert_eq!(Value::Int(1), call("min", vec![Value::Int(4), Value::Int(1)]));
        assert!(funcs()
            .get("div")
            .unwrap()
            .call(vec![Value::Int(1), Value::Int(0)])
            .is_err());
    }

    #[test]
    fn test_collections() {
        let list = call("list", vec![Value::from("a"), Value::from("b")]);
        assert_eq!(Value::from("a,b"), call("join", vec![Value::from(","), list.clone()]));
        assert_eq!(Value::from("b"), call("last", vec![list.clone()]));
        assert_eq!(Value::Bool(true), call("has", vec![Value::from("a"), list]));
        let dict = call("dict", vec![Value::from("k"), Value::Int(1)]);
        assert_eq!("map[k:1]", dict.to_string());
        assert_eq!(Value::Bool(true), call("hasKey", vec![dict.clone(), Value::from("k")]));
        assert_eq!(Value::List(vec![Value::from("k")]), call("keys", vec![dict]));
        assert_eq!(
            Value::List(vec![Value::Int(0), Value::Int(1)]),
            call("until", vec![Value::Int(2)])
        );
    }
}
