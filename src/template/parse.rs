//! Builds the node tree from tokens
//!
//! Besides the grammar, the parser checks everything that can be known before
//! execution: function names and argument counts against the [`FuncMap`],
//! variables against their scope, and `break`/`continue` placement.

use super::lexer::{Keyword, Spanned, Token};
use super::node::*;
use super::SyntaxError;
use crate::funcs::FuncMap;
use crate::value::Value;
use std::collections::HashMap;

type PResult<T> = Result<T, SyntaxError>;

/// How a list of nodes ended
enum Terminator {
    Eof,
    End(usize),
    Else(usize),
}

/// What closes a pipeline
#[derive(Clone, Copy, PartialEq)]
enum Close {
    Delim,
    Paren,
}

pub struct Parser<'a, 'r> {
    tokens: Vec<Spanned>,
    idx: usize,
    last_end: usize,
    funcs: &'a FuncMap<'r>,
    /// Variables in scope, innermost last
    vars: Vec<String>,
    range_depth: usize,
    list_depth: usize,
    defines: HashMap<String, List>,
}

impl<'a, 'r> Parser<'a, 'r> {
    pub fn new(tokens: Vec<Spanned>, funcs: &'a FuncMap<'r>) -> Self {
        Self {
            tokens,
            idx: 0,
            last_end: 0,
            funcs,
            vars: vec!["$".to_string()],
            range_depth: 0,
            list_depth: 0,
            defines: HashMap::new(),
        }
    }

    /// Parse the whole token stream into the main list and the `define`d lists
    pub fn parse(mut self) -> PResult<(List, HashMap<String, List>)> {
        let (list, term) = self.parse_list()?;
        match term {
            Terminator::Eof => Ok((list, self.defines)),
            Terminator::End(pos) => Err(SyntaxError::new(pos, "unexpected {{end}}")),
            Terminator::Else(pos) => Err(SyntaxError::new(pos, "unexpected {{else}}")),
        }
    }

    fn next(&mut self) -> Option<Spanned> {
        let t = self.tokens.get(self.idx).cloned();
        if let Some(t) = &t {
            self.idx += 1;
            self.last_end = t.end;
        }
        t
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.idx).map(|s| &s.token)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.idx + n).map(|s| &s.token)
    }

    fn peek_pos(&self) -> usize {
        self.tokens
            .get(self.idx)
            .map(|s| s.pos)
            .unwrap_or(self.last_end)
    }

    /// The next token must exist, otherwise the action was cut short
    fn expect_next(&mut self, context: &str) -> PResult<Spanned> {
        let pos = self.last_end;
        self.next()
            .ok_or_else(|| SyntaxError::new(pos, format!("unexpected EOF in {context}")))
    }

    fn expect_right_delim(&mut self, context: &str) -> PResult<()> {
        let t = self.expect_next(context)?;
        match t.token {
            Token::RightDelim => Ok(()),
            other => Err(SyntaxError::new(
                t.pos,
                format!("unexpected {} in {context}", describe(&other)),
            )),
        }
    }

    fn parse_list(&mut self) -> PResult<(List, Terminator)> {
        self.list_depth += 1;
        let result = self.parse_list_inner();
        self.list_depth -= 1;
        result
    }

    fn parse_list_inner(&mut self) -> PResult<(List, Terminator)> {
        let mut list = vec![];
        while let Some(t) = self.next() {
            match t.token {
                Token::Text(s) => list.push(Node::Text(s)),
                Token::LeftDelim => match self.peek() {
                    Some(Token::Keyword(Keyword::End)) => {
                        let pos = self.peek_pos();
                        self.next();
                        self.expect_right_delim("end")?;
                        return Ok((list, Terminator::End(pos)));
                    }
                    Some(Token::Keyword(Keyword::Else)) => {
                        let pos = self.peek_pos();
                        self.next();
                        return Ok((list, Terminator::Else(pos)));
                    }
                    Some(Token::Keyword(k)) => {
                        let k = *k;
                        let pos = self.peek_pos();
                        self.next();
                        if let Some(node) = self.parse_keyword(k, pos)? {
                            list.push(node);
                        }
                    }
                    _ => list.push(Node::Action(self.parse_pipeline("command", 1, Close::Delim)?)),
                },
                other => {
                    return Err(SyntaxError::new(
                        t.pos,
                        format!("unexpected {}", describe(&other)),
                    ))
                }
            }
        }
        Ok((list, Terminator::Eof))
    }

    fn parse_keyword(&mut self, k: Keyword, pos: usize) -> PResult<Option<Node>> {
        let node = match k {
            Keyword::If => Node::If(self.parse_branch(k, pos)?),
            Keyword::Range => Node::Range(self.parse_branch(k, pos)?),
            Keyword::With => Node::With(self.parse_branch(k, pos)?),
            Keyword::Define => {
                self.parse_define(pos)?;
                return Ok(None);
            }
            Keyword::Template => {
                let name = self.parse_template_name("template clause")?;
                let pipe = if self.peek() == Some(&Token::RightDelim) {
                    self.next();
                    None
                } else {
                    Some(self.parse_pipeline("template clause", 0, Close::Delim)?)
                };
                Node::Template { pos, name, pipe }
            }
            Keyword::Block => {
                let name = self.parse_template_name("block clause")?;
                let pipe = self.parse_pipeline("block clause", 0, Close::Delim)?;
                let body = self.parse_detached_body("block", pos)?;
                self.defines.insert(name.clone(), body);
                Node::Template {
                    pos,
                    name,
                    pipe: Some(pipe),
                }
            }
            Keyword::Break | Keyword::Continue => {
                if self.range_depth == 0 {
                    return Err(SyntaxError::new(
                        pos,
                        format!("{{{{{}}}}} outside {{{{range}}}}", k.as_str()),
                    ));
                }
                self.expect_right_delim(k.as_str())?;
                if k == Keyword::Break {
                    Node::Break(pos)
                } else {
                    Node::Continue(pos)
                }
            }
            Keyword::Else | Keyword::End => {
                return Err(SyntaxError::new(
                    pos,
                    format!("unexpected {{{{{}}}}}", k.as_str()),
                ))
            }
        };
        Ok(Some(node))
    }

    fn parse_template_name(&mut self, context: &str) -> PResult<String> {
        let t = self.expect_next(context)?;
        match t.token {
            Token::String(name) => Ok(name),
            other => Err(SyntaxError::new(
                t.pos,
                format!("unexpected {} in {context}", describe(&other)),
            )),
        }
    }

    fn parse_define(&mut self, pos: usize) -> PResult<()> {
        if self.list_depth > 1 {
            return Err(SyntaxError::new(pos, "{{define}} is only allowed at top level"));
        }
        let name = self.parse_template_name("define clause")?;
        self.expect_right_delim("define clause")?;
        let body = self.parse_detached_body("define", pos)?;
        if self.defines.insert(name.clone(), body).is_some() {
            return Err(SyntaxError::new(
                pos,
                format!("template: multiple definition of template \"{name}\""),
            ));
        }
        Ok(())
    }

    /// Body of `define`/`block`: its own variable scope, closed by `{{end}}`
    fn parse_detached_body(&mut self, context: &str, pos: usize) -> PResult<List> {
        let vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let range_depth = std::mem::replace(&mut self.range_depth, 0);
        let result = self.parse_list();
        self.vars = vars;
        self.range_depth = range_depth;
        let (body, term) = result?;
        match term {
            Terminator::End(_) => Ok(body),
            Terminator::Else(p) => Err(SyntaxError::new(
                p,
                format!("unexpected {{{{else}}}} in {context}"),
            )),
            Terminator::Eof => Err(SyntaxError::new(
                pos,
                format!("unexpected EOF, expected {{{{end}}}} for {{{{{context}}}}}"),
            )),
        }
    }

    fn parse_branch(&mut self, k: Keyword, pos: usize) -> PResult<Branch> {
        let mark = self.vars.len();
        let max_decl = if k == Keyword::Range { 2 } else { 1 };
        let pipe = self.parse_pipeline(k.as_str(), max_decl, Close::Delim)?;
        if k == Keyword::Range {
            self.range_depth += 1;
        }
        let body = self.parse_list();
        if k == Keyword::Range {
            self.range_depth -= 1;
        }
        let (list, term) = body?;
        let else_list = match term {
            Terminator::Eof => {
                return Err(SyntaxError::new(
                    pos,
                    format!("unexpected EOF, expected {{{{end}}}} for {{{{{}}}}}", k.as_str()),
                ))
            }
            Terminator::End(_) => None,
            Terminator::Else(else_pos) => {
                let chained = matches!(
                    (k, self.peek()),
                    (Keyword::If, Some(Token::Keyword(Keyword::If)))
                        | (Keyword::With, Some(Token::Keyword(Keyword::With)))
                );
                if chained {
                    // `{{else if}}` is an `if` nested in the else branch, sharing our `{{end}}`
                    self.next();
                    let nested = self.parse_branch(k, else_pos)?;
                    Some(vec![if k == Keyword::If {
                        Node::If(nested)
                    } else {
                        Node::With(nested)
                    }])
                } else {
                    self.expect_right_delim("else")?;
                    let (else_list, term) = self.parse_list()?;
                    match term {
                        Terminator::End(_) => Some(else_list),
                        Terminator::Else(p) => {
                            return Err(SyntaxError::new(p, "expected end; found {{else}}"))
                        }
                        Terminator::Eof => {
                            return Err(SyntaxError::new(
                                pos,
                                format!(
                                    "unexpected EOF, expected {{{{end}}}} for {{{{{}}}}}",
                                    k.as_str()
                                ),
                            ))
                        }
                    }
                }
            }
        };
        self.vars.truncate(mark);
        Ok(Branch {
            pos,
            pipe,
            list,
            else_list,
        })
    }

    fn parse_pipeline(
        &mut self,
        context: &str,
        max_decl: usize,
        close: Close,
    ) -> PResult<Pipeline> {
        let pos = self.peek_pos();
        let (decl, is_assign) = self.parse_declarations(max_decl)?;
        let mut cmds: Vec<Command> = vec![];
        loop {
            let cmd = self.parse_command()?;
            self.check_command(&cmd, !cmds.is_empty())?;
            if !cmds.is_empty() {
                // literals and dot cannot be called, so they cannot receive piped values
                if let Some(a @ (Arg::Literal { .. } | Arg::Dot(_))) = cmd.args.first() {
                    return Err(SyntaxError::new(
                        a.pos(),
                        format!("non executable command in pipeline stage {}", cmds.len() + 1),
                    ));
                }
            }
            cmds.push(cmd);
            let t = self.expect_next(context)?;
            match (t.token, close) {
                (Token::Pipe, _) => continue,
                (Token::RightDelim, Close::Delim) | (Token::RightParen, Close::Paren) => break,
                (other, _) => {
                    return Err(SyntaxError::new(
                        t.pos,
                        format!("unexpected {} in {context}", describe(&other)),
                    ))
                }
            }
        }
        Ok(Pipeline {
            pos,
            decl,
            is_assign,
            cmds,
        })
    }

    /// `$x :=`, `$x =` or (in `range`) `$i, $e :=`
    fn parse_declarations(&mut self, max_decl: usize) -> PResult<(Vec<String>, bool)> {
        if max_decl == 0 {
            return Ok((vec![], false));
        }
        let first = match self.peek() {
            Some(Token::Variable(v)) => v.clone(),
            _ => return Ok((vec![], false)),
        };
        match self.peek_at(1) {
            Some(Token::Declare) => {
                self.next();
                self.next();
                self.vars.push(first.clone());
                Ok((vec![first], false))
            }
            Some(Token::Assign) => {
                let pos = self.peek_pos();
                if !self.vars.contains(&first) {
                    return Err(SyntaxError::new(pos, format!("undefined variable \"{first}\"")));
                }
                self.next();
                self.next();
                Ok((vec![first], true))
            }
            Some(Token::Comma) if max_decl >= 2 => {
                let second = match (self.peek_at(2), self.peek_at(3)) {
                    (Some(Token::Variable(v)), Some(Token::Declare)) => v.clone(),
                    _ => {
                        let pos = self.peek_pos();
                        return Err(SyntaxError::new(pos, "too many declarations in range"));
                    }
                };
                for _ in 0..4 {
                    self.next();
                }
                self.vars.push(first.clone());
                self.vars.push(second.clone());
                Ok((vec![first, second], false))
            }
            _ => Ok((vec![], false)),
        }
    }

    fn parse_command(&mut self) -> PResult<Command> {
        let pos = self.peek_pos();
        let mut args = vec![];
        while let Some(t) = self.peek() {
            if matches!(t, Token::RightDelim | Token::RightParen | Token::Pipe) {
                break;
            }
            args.push(self.parse_operand()?);
        }
        if args.is_empty() {
            return Err(SyntaxError::new(pos, "missing value for command"));
        }
        Ok(Command { pos, args })
    }

    /// Check function names used in a command take the number of arguments given
    fn check_command(&self, cmd: &Command, piped: bool) -> PResult<()> {
        for (i, arg) in cmd.args.iter().enumerate() {
            if let Arg::Identifier { pos, name } = arg {
                let given = if i == 0 {
                    cmd.args.len() - 1 + usize::from(piped)
                } else {
                    0
                };
                // existence is checked in parse_operand
                if let Some(f) = self.funcs.get(name) {
                    if !f.arity().accepts(given) {
                        return Err(SyntaxError::new(
                            *pos,
                            format!(
                                "wrong number of args for {name}: want {} got {given}",
                                f.arity()
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_operand(&mut self) -> PResult<Arg> {
        let t = self.expect_next("operand")?;
        let pos = t.pos;
        let arg = match t.token {
            Token::Identifier(name) => {
                if !self.funcs.contains(&name) {
                    return Err(SyntaxError::new(pos, format!("function \"{name}\" not defined")));
                }
                Arg::Identifier { pos, name }
            }
            Token::Dot => Arg::Dot(pos),
            Token::Nil => Arg::Literal {
                pos,
                value: Value::Nil,
            },
            Token::Bool(b) => Arg::Literal {
                pos,
                value: Value::Bool(b),
            },
            Token::Int(i) => Arg::Literal {
                pos,
                value: Value::Int(i),
            },
            Token::Float(f) => Arg::Literal {
                pos,
                value: Value::Float(f),
            },
            Token::String(s) => Arg::Literal {
                pos,
                value: Value::String(s),
            },
            Token::Field(name) => {
                let mut path = vec![name];
                path.extend(self.adjacent_fields());
                Arg::Field { pos, path }
            }
            Token::Variable(name) => {
                if !self.vars.contains(&name) {
                    return Err(SyntaxError::new(pos, format!("undefined variable \"{name}\"")));
                }
                let path = self.adjacent_fields();
                Arg::Variable { pos, name, path }
            }
            Token::LeftParen => {
                let pipe =
                    Box::new(self.parse_pipeline("parenthesized pipeline", 0, Close::Paren)?);
                let path = self.adjacent_fields();
                if path.is_empty() {
                    Arg::Pipe(pipe)
                } else {
                    Arg::Chain { pos, pipe, path }
                }
            }
            other => {
                return Err(SyntaxError::new(
                    pos,
                    format!("unexpected {} in operand", describe(&other)),
                ))
            }
        };
        Ok(arg)
    }

    /// Field names directly following the previous token, as in `$x.a.b`
    fn adjacent_fields(&mut self) -> Vec<String> {
        let mut path = vec![];
        while let Some(s) = self.tokens.get(self.idx) {
            match &s.token {
                Token::Field(name) if s.pos == self.last_end => {
                    path.push(name.clone());
                    self.next();
                }
                _ => break,
            }
        }
        path
    }
}

fn describe(t: &Token) -> String {
    match t {
        Token::Text(_) => "text".to_string(),
        Token::LeftDelim => "left delim".to_string(),
        Token::RightDelim => "right delim".to_string(),
        Token::Identifier(s) => format!("\"{s}\""),
        Token::Keyword(k) => format!("<{}>", k.as_str()),
        Token::Field(s) => format!("<.{s}>"),
        Token::Dot => "<.>".to_string(),
        Token::Variable(s) => format!("<{s}>"),
        Token::String(s) => format!("{s:?}"),
        Token::Int(i) => format!("<{i}>"),
        Token::Float(f) => format!("<{f}>"),
        Token::Bool(b) => format!("<{b}>"),
        Token::Nil => "<nil>".to_string(),
        Token::LeftParen => "\"(\"".to_string(),
        Token::RightParen => "\")\"".to_string(),
        Token::Pipe => "\"|\"".to_string(),
        Token::Declare => "\":=\"".to_string(),
        Token::Assign => "\"=\"".to_string(),
        Token::Comma => "\",\"".to_string(),
    }
}
