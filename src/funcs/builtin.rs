//! Builtin functions of the template language

use super::{func_error, Arity, FuncMap, FuncResult};
use crate::value::{format_float, go_exponent, Value};
use std::cmp::Ordering;

pub fn register(funcs: &mut FuncMap) {
    // the executor evaluates `and`/`or` lazily, these apply to values computed up front
    funcs.add_variadic("and", Arity::AtLeast(1), |args| {
        let mut last = Value::Nil;
        for a in args {
            if !a.is_true() {
                return Ok(a);
            }
            last = a;
        }
        Ok(last)
    });
    funcs.add_variadic("or", Arity::AtLeast(1), |args| {
        let mut last = Value::Nil;
        for a in args {
            if a.is_true() {
                return Ok(a);
            }
            last = a;
        }
        Ok(last)
    });
    funcs.add1("not", |a: Value| Ok(!a.is_true()));
    funcs.add1("len", |a: Value| match a.len() {
        Some(n) => Ok(n as i64),
        None => Err(func_error(format!("len of type {}", a.kind()))),
    });
    funcs.add_variadic("index", Arity::AtLeast(1), index);
    funcs.add_variadic("print", Arity::AtLeast(0), |args| Ok(sprint(&args)));
    funcs.add_variadic("println", Arity::AtLeast(0), |args| {
        let mut s = args
            .iter()
            .map(Value::to_text)
            .collect::<Vec<_>>()
            .join(" ");
        s.push('\n');
        Ok(s)
    });
    funcs.add_variadic("printf", Arity::AtLeast(1), |mut args| {
        let format = args.remove(0).to_text();
        Ok(sprintf(&format, &args))
    });
    funcs.add_variadic("eq", Arity::AtLeast(2), |args| {
        let first = &args[0];
        for other in &args[1..] {
            if compare(first, other)? == Ordering::Equal {
                return Ok(true);
            }
        }
        Ok(false)
    });
    funcs.add2("ne", |a: Value, b: Value| {
        Ok(compare(&a, &b)? != Ordering::Equal)
    });
    funcs.add2("lt", |a: Value, b: Value| Ok(ordered(&a, &b)? == Ordering::Less));
    funcs.add2("le", |a: Value, b: Value| Ok(ordered(&a, &b)? != Ordering::Greater));
    funcs.add2("gt", |a: Value, b: Value| Ok(ordered(&a, &b)? == Ordering::Greater));
    funcs.add2("ge", |a: Value, b: Value| Ok(ordered(&a, &b)? != Ordering::Less));
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, error_stack::Report<crate::error::FuncError>> {
    a.compare(b).ok_or_else(|| {
        func_error(format!(
            "incompatible types for comparison: {} and {}",
            a.kind(),
            b.kind()
        ))
    })
}

/// Like [`compare`] but only for values with an order
fn ordered(a: &Value, b: &Value) -> Result<Ordering, error_stack::Report<crate::error::FuncError>> {
    if matches!(a, Value::Nil | Value::Bool(_)) || matches!(b, Value::Nil | Value::Bool(_)) {
        return Err(func_error(format!("invalid type for comparison: {}", a.kind())));
    }
    compare(a, b)
}

fn index(mut args: Vec<Value>) -> FuncResult {
    let mut item = args.remove(0);
    for key in args {
        item = match (item, key) {
            (Value::List(mut l), Value::Int(i)) => {
                if i < 0 || i as usize >= l.len() {
                    return Err(func_error(format!("index out of range: {i}")));
                }
                l.swap_remove(i as usize)
            }
            (Value::Map(mut m), Value::String(k)) => m.remove(&k).unwrap_or_default(),
            (Value::Nil, _) => return Err(func_error("index of untyped nil")),
            (item, key) => {
                return Err(func_error(format!(
                    "can't index item of type {} with {}",
                    item.kind(),
                    key.kind()
                )))
            }
        };
    }
    Ok(item)
}

/// Concatenate values, adding spaces between operands when neither is a string
pub(crate) fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, a) in args.iter().enumerate() {
        let is_string = |v: &Value| matches!(v, Value::String(_));
        if i > 0 && !is_string(a) && !is_string(&args[i - 1]) {
            out.push(' ');
        }
        out.push_str(&a.to_text());
    }
    out
}

/// A small `printf`: `%v %s %d %q %t %x %X %f %e %g %%` with optional width and precision
pub(crate) fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut left_align = false;
        let mut zero_pad = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                '+' | ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                p.push(d);
                chars.next();
            }
            precision = Some(p.parse::<usize>().unwrap_or(0));
        }
        let verb = match chars.next() {
            Some(v) => v,
            None => {
                out.push_str("%!(NOVERB)");
                break;
            }
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let arg = match args.next() {
            Some(a) => a,
            None => {
                out.push_str(&format!("%!{verb}(MISSING)"));
                continue;
            }
        };
        let formatted = format_verb(verb, arg, precision);
        let width = width.parse::<usize>().unwrap_or(0);
        let len = formatted.chars().count();
        if len >= width {
            out.push_str(&formatted);
        } else if left_align {
            out.push_str(&formatted);
            out.push_str(&" ".repeat(width - len));
        } else {
            let pad = if zero_pad { "0" } else { " " };
            out.push_str(&pad.repeat(width - len));
            out.push_str(&formatted);
        }
    }
    out
}

fn format_verb(verb: char, arg: &Value, precision: Option<usize>) -> String {
    let as_float = |v: &Value| match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    };
    match verb {
        'v' | 's' => {
            let s = arg.to_text();
            match (verb, precision) {
                ('s', Some(p)) => s.chars().take(p).collect(),
                _ => s,
            }
        }
        'd' => match arg {
            Value::Int(i) => i.to_string(),
            other => format!("%!d({})", other.to_text()),
        },
        'q' => format!("{:?}", arg.to_text()),
        't' => match arg {
            Value::Bool(b) => b.to_string(),
            other => format!("%!t({})", other.to_text()),
        },
        'x' | 'X' => {
            let s = match arg {
                Value::Int(i) => format!("{i:x}"),
                Value::String(s) => s.bytes().map(|b| format!("{b:02x}")).collect(),
                Value::Bytes(b) => b.iter().map(|b| format!("{b:02x}")).collect(),
                other => format!("%!x({})", other.to_text()),
            };
            if verb == 'X' {
                s.to_uppercase()
            } else {
                s
            }
        }
        'f' | 'F' => match as_float(arg) {
            Some(f) => format!("{:.*}", precision.unwrap_or(6), f),
            None => format!("%!f({})", arg.to_text()),
        },
        'e' => match as_float(arg) {
            Some(f) => go_exponent(&format!("{:.*e}", precision.unwrap_or(6), f)),
            None => format!("%!e({})", arg.to_text()),
        },
        'g' => match as_float(arg) {
            Some(f) => match precision {
                Some(p) => format!("{:.*}", p, f),
                None => format_float(f),
            },
            None => format!("%!g({})", arg.to_text()),
        },
        other => format!("%!{other}({})", arg.to_text()),
    }
}
