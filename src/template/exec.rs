//! Walks the node tree and writes the output

use super::node::*;
use super::{MissingKey, Template};
use crate::constants::MAX_EXEC_DEPTH;
use crate::error::ExecError;
use crate::value::Value;
use error_stack::{Report, Result};
use std::fmt::Display;

static NIL: Value = Value::Nil;

/// What to do after a node was executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

pub struct Exec<'t, 'r> {
    tmpl: &'t Template<'r>,
    data: &'t Value,
    out: String,
    /// Variables in scope, innermost last
    vars: Vec<(String, Value)>,
    /// Name of the template or `define` being executed
    executing: String,
    depth: usize,
}

impl<'t, 'r> Exec<'t, 'r> {
    pub fn new(tmpl: &'t Template<'r>, data: &'t Value) -> Self {
        Self {
            tmpl,
            data,
            out: String::new(),
            vars: vec![],
            executing: tmpl.name.clone(),
            depth: 0,
        }
    }

    pub fn run(mut self) -> Result<String, ExecError> {
        let tmpl = self.tmpl;
        let dot = self.data.clone();
        self.vars.push(("$".to_string(), dot.clone()));
        self.walk_list(&dot, &tmpl.root)?;
        Ok(self.out)
    }

    fn error_at(&self, pos: usize, node: &dyn Display, message: String) -> Report<ExecError> {
        Report::new(self.exec_error(pos, node, message))
    }

    fn exec_error(&self, pos: usize, node: &dyn Display, message: String) -> ExecError {
        ExecError {
            location: self.tmpl.locate(pos),
            executing: self.executing.clone(),
            node: node.to_string(),
            message,
        }
    }

    fn walk_list(&mut self, dot: &Value, list: &'t List) -> Result<Flow, ExecError> {
        for node in list {
            let flow = self.walk(dot, node)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn walk(&mut self, dot: &Value, node: &'t Node) -> Result<Flow, ExecError> {
        match node {
            Node::Text(s) => self.out.push_str(s),
            Node::Action(pipe) => {
                let v = self.eval_pipeline(dot, pipe)?;
                if pipe.decl.is_empty() {
                    self.out.push_str(&v.to_text());
                }
            }
            Node::If(branch) => {
                let mark = self.vars.len();
                let v = self.eval_pipeline(dot, &branch.pipe)?;
                let flow = if v.is_true() {
                    self.walk_list(dot, &branch.list)
                } else if let Some(else_list) = &branch.else_list {
                    self.walk_list(dot, else_list)
                } else {
                    Ok(Flow::Normal)
                };
                self.vars.truncate(mark);
                return flow;
            }
            Node::With(branch) => {
                let mark = self.vars.len();
                let v = self.eval_pipeline(dot, &branch.pipe)?;
                let flow = if v.is_true() {
                    self.walk_list(&v, &branch.list)
                } else if let Some(else_list) = &branch.else_list {
                    self.walk_list(dot, else_list)
                } else {
                    Ok(Flow::Normal)
                };
                self.vars.truncate(mark);
                return flow;
            }
            Node::Range(branch) => return self.walk_range(dot, branch),
            Node::Template { pos, name, pipe } => self.walk_template(dot, *pos, name, pipe)?,
            Node::Break(_) => return Ok(Flow::Break),
            Node::Continue(_) => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn walk_range(&mut self, dot: &Value, branch: &'t Branch) -> Result<Flow, ExecError> {
        let v = self.eval_commands(dot, &branch.pipe)?;
        let items: Vec<(Value, Value)> = match v {
            Value::List(l) => l
                .into_iter()
                .enumerate()
                .map(|(i, e)| (Value::Int(i as i64), e))
                .collect(),
            Value::Map(m) => m.into_iter().map(|(k, e)| (Value::String(k), e)).collect(),
            Value::Int(n) => {
                if branch.pipe.decl.len() > 1 {
                    return Err(self.error_at(
                        branch.pos,
                        &branch.pipe,
                        "can't use two iteration variables with an integer".to_string(),
                    ));
                }
                (0..n.max(0)).map(|i| (Value::Int(i), Value::Int(i))).collect()
            }
            Value::Nil => vec![],
            other => {
                return Err(self.error_at(
                    branch.pos,
                    &branch.pipe,
                    format!("range can't iterate over {other}"),
                ))
            }
        };
        if items.is_empty() {
            return match &branch.else_list {
                Some(else_list) => {
                    let mark = self.vars.len();
                    let flow = self.walk_list(dot, else_list);
                    self.vars.truncate(mark);
                    flow.map(|_| Flow::Normal)
                }
                None => Ok(Flow::Normal),
            };
        }
        for (key, elem) in items {
            let mark = self.vars.len();
            match branch.pipe.decl.as_slice() {
                [e] => self.vars.push((e.clone(), elem.clone())),
                [k, e] => {
                    self.vars.push((k.clone(), key));
                    self.vars.push((e.clone(), elem.clone()));
                }
                _ => {}
            }
            let flow = self.walk_list(&elem, &branch.list);
            self.vars.truncate(mark);
            if flow? == Flow::Break {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    fn walk_template(
        &mut self,
        dot: &Value,
        pos: usize,
        name: &str,
        pipe: &'t Option<Pipeline>,
    ) -> Result<(), ExecError> {
        let tmpl = self.tmpl;
        let node = format!("template \"{name}\"");
        let list = match tmpl.defines.get(name) {
            Some(list) => list,
            None => {
                return Err(self.error_at(pos, &node, format!("no such template \"{name}\"")))
            }
        };
        if self.depth >= MAX_EXEC_DEPTH {
            return Err(self.error_at(
                pos,
                &node,
                format!("exceeded maximum template depth ({MAX_EXEC_DEPTH})"),
            ));
        }
        let new_dot = match pipe {
            Some(pipe) => self.eval_pipeline(dot, pipe)?,
            None => Value::Nil,
        };
        let vars = std::mem::replace(&mut self.vars, vec![("$".to_string(), new_dot.clone())]);
        let executing = std::mem::replace(&mut self.executing, name.to_string());
        self.depth += 1;
        let result = self.walk_list(&new_dot, list);
        self.depth -= 1;
        self.executing = executing;
        self.vars = vars;
        result.map(|_| ())
    }

    /// Evaluate a pipeline and bind its declared variables
    fn eval_pipeline(&mut self, dot: &Value, pipe: &'t Pipeline) -> Result<Value, ExecError> {
        let v = self.eval_commands(dot, pipe)?;
        for name in &pipe.decl {
            if pipe.is_assign {
                match self.vars.iter_mut().rev().find(|(n, _)| n == name) {
                    Some((_, slot)) => *slot = v.clone(),
                    None => {
                        return Err(self.error_at(
                            pipe.pos,
                            pipe,
                            format!("undefined variable: {name}"),
                        ))
                    }
                }
            } else {
                self.vars.push((name.clone(), v.clone()));
            }
        }
        Ok(v)
    }

    /// Evaluate the commands of a pipeline, feeding each result to the next command
    fn eval_commands(&mut self, dot: &Value, pipe: &'t Pipeline) -> Result<Value, ExecError> {
        let mut last = None;
        for cmd in &pipe.cmds {
            last = Some(self.eval_command(dot, cmd, last)?);
        }
        Ok(last.unwrap_or_default())
    }

    fn eval_command(
        &mut self,
        dot: &Value,
        cmd: &'t Command,
        piped: Option<Value>,
    ) -> Result<Value, ExecError> {
        let first = &cmd.args[0];
        if let Arg::Identifier { pos, name } = first {
            return self.eval_function(dot, *pos, name, &cmd.args[1..], piped);
        }
        if cmd.args.len() > 1 || piped.is_some() {
            return Err(self.error_at(
                first.pos(),
                first,
                format!("can't give argument to non-function {first}"),
            ));
        }
        self.eval_arg(dot, first)
    }

    fn eval_arg(&mut self, dot: &Value, arg: &'t Arg) -> Result<Value, ExecError> {
        match arg {
            Arg::Dot(_) => Ok(dot.clone()),
            Arg::Literal { value, .. } => Ok(value.clone()),
            Arg::Field { pos, path } => self.eval_fields(dot, path, *pos, arg),
            Arg::Variable { pos, name, path } => {
                let v = match self.vars.iter().rev().find(|(n, _)| n == name) {
                    Some((_, v)) => v,
                    None => {
                        return Err(self.error_at(*pos, arg, format!("undefined variable: {name}")))
                    }
                };
                self.eval_fields(v, path, *pos, arg)
            }
            Arg::Pipe(pipe) => self.eval_pipeline(dot, pipe),
            Arg::Chain { pos, pipe, path } => {
                let v = self.eval_pipeline(dot, pipe)?;
                self.eval_fields(&v, path, *pos, arg)
            }
            Arg::Identifier { pos, name } => self.eval_function(dot, *pos, name, &[], None),
        }
    }

    fn eval_fields(
        &self,
        receiver: &Value,
        path: &[String],
        pos: usize,
        node: &Arg,
    ) -> Result<Value, ExecError> {
        path.iter()
            .try_fold(receiver, |v, name| self.eval_field(v, name, pos, node))
            .map(Value::clone)
    }

    fn eval_field<'v>(
        &self,
        receiver: &'v Value,
        name: &str,
        pos: usize,
        node: &Arg,
    ) -> Result<&'v Value, ExecError> {
        let fail = self.tmpl.missing_key == MissingKey::Error;
        match receiver {
            Value::Map(m) => match m.get(name) {
                Some(v) => Ok(v),
                None if fail => Err(self.error_at(
                    pos,
                    node,
                    format!("map has no entry for key \"{name}\""),
                )),
                None => Ok(&NIL),
            },
            Value::Nil if fail => Err(self.error_at(
                pos,
                node,
                format!("nil data; no entry for key \"{name}\""),
            )),
            Value::Nil => Ok(receiver),
            other => Err(self.error_at(
                pos,
                node,
                format!("can't evaluate field {name} in type {}", other.kind()),
            )),
        }
    }

    fn eval_function(
        &mut self,
        dot: &Value,
        pos: usize,
        name: &str,
        args: &'t [Arg],
        piped: Option<Value>,
    ) -> Result<Value, ExecError> {
        let tmpl = self.tmpl;
        let f = match tmpl.funcs.get(name) {
            Some(f) => f,
            None => {
                return Err(self.error_at(pos, &name, format!("function \"{name}\" not defined")))
            }
        };
        // `and` and `or` stop evaluating arguments once the result is known
        let stop_when = match name {
            "and" => Some(false),
            "or" => Some(true),
            _ => None,
        };
        if let Some(stop_when) = stop_when {
            let mut last = Value::Nil;
            for a in args {
                last = self.eval_arg(dot, a)?;
                if last.is_true() == stop_when {
                    return Ok(last);
                }
            }
            return Ok(piped.unwrap_or(last));
        }
        let mut values = Vec::with_capacity(args.len() + 1);
        for a in args {
            values.push(self.eval_arg(dot, a)?);
        }
        values.extend(piped);
        f.call(values).map_err(|e| {
            let reason = e.current_context().to_string();
            log::debug!("function `{name}` failed: {reason}");
            e.change_context(self.exec_error(pos, &name, format!("error calling {name}: {reason}")))
        })
    }
}
