//! Functions available inside templates
//!
//! A [`FuncMap`] is built fresh for every render call by [`build`]. It layers:
//! - the builtins of the template language (`and`, `len`, `printf`, `eq`, ...)
//! - a library of generic helpers (strings, math, encoding, collections)
//! - the custom functions `render`, `readFile`, `toYaml`, `gzip` and `ungzip`,
//!   which replace any generic helper with the same name.
//!
//! Functions are registered from typed Rust closures. The argument count of each
//! function is recorded when it is registered and checked when a template is parsed,
//! so a call with the wrong number of arguments never reaches execution.

use crate::error::{FuncError, RenderError};
use crate::value::Value;
use error_stack::{Report, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

mod builtin;
mod custom;
mod helpers;

pub type FuncResult = Result<Value, FuncError>;

/// What the custom functions need from the renderer that owns the table
pub trait RenderHost {
    /// Run the whole render pipeline on a nested template
    fn simple_render(&self, text: &str) -> Result<String, RenderError>;
    /// Directory relative paths are resolved against
    fn root(&self) -> &Path;
}

/// Build the complete function table for one render call
pub fn build(host: &dyn RenderHost) -> FuncMap<'_> {
    let mut funcs = FuncMap::new();
    builtin::register(&mut funcs);
    helpers::register(&mut funcs);
    custom::register(&mut funcs, host);
    log::debug!("built function table with {} function(s)", funcs.len());
    funcs
}

/// Number of arguments a function takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Between(usize, usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Self::Exact(e) => n == e,
            Self::AtLeast(min) => n >= min,
            Self::Between(min, max) => n >= min && n <= max,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(e) => write!(f, "{e}"),
            Self::AtLeast(min) => write!(f, "at least {min}"),
            Self::Between(min, max) => write!(f, "{min} to {max}"),
        }
    }
}

type Callable<'r> = Box<dyn Fn(Vec<Value>) -> FuncResult + 'r>;

/// A function callable from a template
pub struct Function<'r> {
    arity: Arity,
    call: Callable<'r>,
}

impl<'r> Function<'r> {
    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn call(&self, args: Vec<Value>) -> FuncResult {
        if !self.arity.accepts(args.len()) {
            return Err(Report::new(FuncError::new(format!(
                "wrong number of args: want {} got {}",
                self.arity,
                args.len()
            ))));
        }
        (self.call)(args)
    }
}

/// Function table, keyed by the name templates call the function with
#[derive(Default)]
pub struct FuncMap<'r> {
    funcs: HashMap<String, Function<'r>>,
}

impl fmt::Debug for FuncMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.funcs.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("FuncMap").field("funcs", &names).finish()
    }
}

impl<'r> FuncMap<'r> {
    pub fn new() -> Self {
        Self {
            funcs: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Function<'r>> {
        self.funcs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    fn insert(&mut self, name: &str, arity: Arity, call: Callable<'r>) {
        if self
            .funcs
            .insert(name.to_string(), Function { arity, call })
            .is_some()
        {
            log::debug!("function `{name}` replaced");
        }
    }

    /// Register a function taking no argument
    pub fn add0<R, F>(&mut self, name: &str, f: F)
    where
        R: Into<Value>,
        F: Fn() -> Result<R, FuncError> + 'r,
    {
        self.insert(name, Arity::Exact(0), Box::new(move |_| f().map(Into::into)));
    }

    /// Register a function taking one argument
    pub fn add1<A, R, F>(&mut self, name: &str, f: F)
    where
        A: FromValue,
        R: Into<Value>,
        F: Fn(A) -> Result<R, FuncError> + 'r,
    {
        self.insert(
            name,
            Arity::Exact(1),
            Box::new(move |args| {
                let mut args = args.into_iter();
                let a = A::from_value(args.next().unwrap_or_default())?;
                f(a).map(Into::into)
            }),
        );
    }

    /// Register a function taking two arguments
    pub fn add2<A, B, R, F>(&mut self, name: &str, f: F)
    where
        A: FromValue,
        B: FromValue,
        R: Into<Value>,
        F: Fn(A, B) -> Result<R, FuncError> + 'r,
    {
        self.insert(
            name,
            Arity::Exact(2),
            Box::new(move |args| {
                let mut args = args.into_iter();
                let a = A::from_value(args.next().unwrap_or_default())?;
                let b = B::from_value(args.next().unwrap_or_default())?;
                f(a, b).map(Into::into)
            }),
        );
    }

    /// Register a function taking three arguments
    pub fn add3<A, B, C, R, F>(&mut self, name: &str, f: F)
    where
        A: FromValue,
        B: FromValue,
        C: FromValue,
        R: Into<Value>,
        F: Fn(A, B, C) -> Result<R, FuncError> + 'r,
    {
        self.insert(
            name,
            Arity::Exact(3),
            Box::new(move |args| {
                let mut args = args.into_iter();
                let a = A::from_value(args.next().unwrap_or_default())?;
                let b = B::from_value(args.next().unwrap_or_default())?;
                let c = C::from_value(args.next().unwrap_or_default())?;
                f(a, b, c).map(Into::into)
            }),
        );
    }

    /// Register a function taking a variable number of arguments
    pub fn add_variadic<R, F>(&mut self, name: &str, arity: Arity, f: F)
    where
        R: Into<Value>,
        F: Fn(Vec<Value>) -> Result<R, FuncError> + 'r,
    {
        self.insert(name, arity, Box::new(move |args| f(args).map(Into::into)));
    }
}

pub(crate) fn func_error(reason: impl Into<String>) -> Report<FuncError> {
    Report::new(FuncError::new(reason))
}

fn wrong_type(expected: &str, v: &Value) -> Report<FuncError> {
    func_error(format!(
        "wrong type for value; expected {expected}; got {}",
        v.kind()
    ))
}

/// Conversion from a template value into a typed function argument
pub trait FromValue: Sized {
    fn from_value(v: Value) -> Result<Self, FuncError>;
}

impl FromValue for Value {
    fn from_value(v: Value) -> Result<Self, FuncError> {
        Ok(v)
    }
}

impl FromValue for String {
    fn from_value(v: Value) -> Result<Self, FuncError> {
        match v {
            Value::String(s) => Ok(s),
            Value::Bytes(b) => Ok(String::from_utf8(b)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(v.to_string()),
            v => Err(wrong_type("string", &v)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(v: Value) -> Result<Self, FuncError> {
        match v {
            Value::Int(i) => Ok(i),
            Value::Float(f) => Ok(f as i64),
            Value::String(ref s) => s.trim().parse().map_err(|_| wrong_type("int", &v)),
            v => Err(wrong_type("int", &v)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(v: Value) -> Result<Self, FuncError> {
        match v {
            Value::Int(i) => Ok(i as f64),
            Value::Float(f) => Ok(f),
            Value::String(ref s) => s.trim().parse().map_err(|_| wrong_type("float64", &v)),
            v => Err(wrong_type("float64", &v)),
        }
    }
}

impl FromValue for bool {
    fn from_value(v: Value) -> Result<Self, FuncError> {
        match v {
            Value::Bool(b) => Ok(b),
            v => Err(wrong_type("bool", &v)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(v: Value) -> Result<Self, FuncError> {
        match v {
            Value::Bytes(b) => Ok(b),
            Value::String(s) => Ok(s.into_bytes()),
            v => Err(wrong_type("[]uint8", &v)),
        }
    }
}

impl FromValue for Vec<Value> {
    fn from_value(v: Value) -> Result<Self, FuncError> {
        match v {
            Value::List(l) => Ok(l),
            Value::Nil => Ok(vec![]),
            v => Err(wrong_type("list", &v)),
        }
    }
}

impl FromValue for BTreeMap<String, Value> {
    fn from_value(v: Value) -> Result<Self, FuncError> {
        match v {
            Value::Map(m) => Ok(m),
            Value::Nil => Ok(BTreeMap::new()),
            v => Err(wrong_type("map", &v)),
        }
    }
}
