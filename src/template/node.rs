//! Parse tree of a template
//!
//! Every node keeps the byte offset it starts at, so errors found while executing
//! can point back into the source. The [`Display`](fmt::Display) impls print
//! nodes back as template source for error messages.

use crate::value::Value;
use std::fmt;

pub type List = Vec<Node>;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// `{{ pipeline }}`
    Action(Pipeline),
    If(Branch),
    Range(Branch),
    With(Branch),
    /// `{{ template "name" pipeline }}`
    Template {
        pos: usize,
        name: String,
        pipe: Option<Pipeline>,
    },
    Break(usize),
    Continue(usize),
}

/// Body of `if`, `range` and `with`
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub pos: usize,
    pub pipe: Pipeline,
    pub list: List,
    pub else_list: Option<List>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub pos: usize,
    /// Variables declared or assigned by the pipeline
    pub decl: Vec<String>,
    /// `=` instead of `:=`
    pub is_assign: bool,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub pos: usize,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// `.`
    Dot(usize),
    /// `.a.b`
    Field { pos: usize, path: Vec<String> },
    /// `$x.a.b`
    Variable {
        pos: usize,
        name: String,
        path: Vec<String>,
    },
    /// `(pipeline).a.b`
    Chain {
        pos: usize,
        pipe: Box<Pipeline>,
        path: Vec<String>,
    },
    /// `(pipeline)`
    Pipe(Box<Pipeline>),
    /// Function name
    Identifier { pos: usize, name: String },
    Literal { pos: usize, value: Value },
}

impl Arg {
    pub fn pos(&self) -> usize {
        match self {
            Self::Dot(pos) => *pos,
            Self::Field { pos, .. }
            | Self::Variable { pos, .. }
            | Self::Chain { pos, .. }
            | Self::Identifier { pos, .. }
            | Self::Literal { pos, .. } => *pos,
            Self::Pipe(pipe) => pipe.pos,
        }
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &[String]) -> fmt::Result {
    for p in path {
        write!(f, ".{p}")?;
    }
    Ok(())
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dot(_) => write!(f, "."),
            Self::Field { path, .. } => write_path(f, path),
            Self::Variable { name, path, .. } => {
                write!(f, "{name}")?;
                write_path(f, path)
            }
            Self::Chain { pipe, path, .. } => {
                write!(f, "({pipe})")?;
                write_path(f, path)
            }
            Self::Pipe(pipe) => write!(f, "({pipe})"),
            Self::Identifier { name, .. } => write!(f, "{name}"),
            Self::Literal { value, .. } => match value {
                Value::String(s) => write!(f, "{s:?}"),
                Value::Nil => write!(f, "nil"),
                v => write!(f, "{v}"),
            },
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{arg}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decl.is_empty() {
            write!(f, "{}", self.decl.join(", "))?;
            write!(f, " {} ", if self.is_assign { "=" } else { ":=" })?;
        }
        for (i, cmd) in self.cmds.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{cmd}")?;
        }
        Ok(())
    }
}
