//! Template parsing and execution
//!
//! The template language is the action language of Go's `text/template`:
//! `{{ .field }}`, pipelines with `|`, variables, `if`/`range`/`with`,
//! `define`/`template`/`block` and trim markers. A [`Template`] is parsed once
//! with a delimiter pair, a missing-key policy and a [`FuncMap`], and can then be
//! executed against any data root.

use crate::error::{ExecError, Location, ParseError};
use crate::funcs::FuncMap;
use crate::value::Value;
use error_stack::{Report, Result};
use std::collections::HashMap;

mod exec;
mod lexer;
mod node;
mod parse;

pub use node::*;

/// What happens when a map lookup finds no entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingKey {
    /// Continue and print `<no value>`
    #[default]
    Placeholder,
    /// Stop execution with an error
    Error,
}

/// Error found while lexing or parsing, located by byte offset
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub pos: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(pos: usize, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

/// A parsed template, ready to be executed
pub struct Template<'r> {
    name: String,
    text: String,
    root: List,
    defines: HashMap<String, List>,
    funcs: FuncMap<'r>,
    missing_key: MissingKey,
}

impl std::fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("defines", &self.defines)
            .field("missing_key", &self.missing_key)
            .finish()
    }
}

impl<'r> Template<'r> {
    /// Parse `text` into a template called `name`
    ///
    /// The name is only used in error messages.
    pub fn parse(
        name: &str,
        text: &str,
        delims: (&str, &str),
        missing_key: MissingKey,
        funcs: FuncMap<'r>,
    ) -> Result<Self, ParseError> {
        let located = |e: SyntaxError| {
            Report::new(ParseError {
                location: Location::new(name, text, e.pos),
                message: e.message,
            })
        };
        let tokens = lexer::Lexer::new(text, delims.0, delims.1)
            .tokenize()
            .map_err(located)?;
        let (root, defines) = parse::Parser::new(tokens, &funcs)
            .parse()
            .map_err(located)?;
        log::debug!(
            "parsed template `{name}`: {} node(s), {} define(s)",
            root.len(),
            defines.len()
        );
        Ok(Self {
            name: name.to_string(),
            text: text.to_string(),
            root,
            defines,
            funcs,
            missing_key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the templates declared with `define` or `block`
    pub fn defined(&self) -> Vec<&str> {
        let mut names = self.defines.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Execute the template with `data` as dot
    pub fn execute(&self, data: &Value) -> Result<String, ExecError> {
        exec::Exec::new(self, data).run()
    }

    fn locate(&self, pos: usize) -> Location {
        Location::new(&self.name, &self.text, pos)
    }
}

#[cfg(test)]
mod ut {
    use super::*;

    fn funcs() -> FuncMap<'static> {
        let mut funcs = FuncMap::new();
        funcs.add1("upper", |s: String| Ok(s.to_uppercase()));
        funcs.add2("join", |sep: String, l: Vec<Value>| {
            Ok(l.iter().map(Value::to_text).collect::<Vec<_>>().join(&sep))
        });
        funcs.add1("fail", |_: Value| -> Result<Value, crate::error::FuncError> {
            Err(crate::funcs::func_error("boom"))
        });
        funcs
    }

    fn data(yaml: &str) -> Value {
        Value::from(serde_yaml::from_str::<serde_yaml::Value>(yaml).unwrap())
    }

    fn parse(text: &str, missing_key: MissingKey) -> Result<Template<'static>, ParseError> {
        Template::parse("t", text, ("{{", "}}"), missing_key, funcs())
    }

    fn render(text: &str, yaml: &str) -> String {
        parse(text, MissingKey::Placeholder)
            .unwrap()
            .execute(&data(yaml))
            .unwrap()
    }

    fn parse_err(text: &str) -> String {
        parse(text, MissingKey::Placeholder)
            .unwrap_err()
            .current_context()
            .to_string()
    }

    fn exec_err(text: &str, yaml: &str) -> ExecError {
        parse(text, MissingKey::Error)
            .unwrap()
            .execute(&data(yaml))
            .unwrap_err()
            .current_context()
            .clone()
    }

    #[test]
    fn test_fields() {
        assert_eq!("Hello World", render("Hello {{ .name }}", "name: World"));
        assert_eq!("x=3", render("x={{ .a.b.c }}", "a: {b: {c: 3}}"));
        assert_eq!("<no value>", render("{{ .missing }}", "a: 1"));
        assert_eq!("<no value>", render("{{ .a.b }}", "x: 1"));
    }

    #[test]
    fn test_pipelines() {
        assert_eq!("WORLD", render("{{ .name | upper }}", "name: world"));
        assert_eq!("a-b", render("{{ join \"-\" .l }}", "l: [a, b]"));
        assert_eq!("a,b", render("{{ .l | join \",\" }}", "l: [a, b]"));
        assert_eq!("X", render("{{ (upper .n) }}", "n: x"));
    }

    #[test]
    fn test_control_flow() {
        let text = "{{ if .on }}yes{{ else if .maybe }}maybe{{ else }}no{{ end }}";
        assert_eq!("yes", render(text, "on: true"));
        assert_eq!("maybe", render(text, "maybe: 1"));
        assert_eq!("no", render(text, "on: false"));
        assert_eq!(
            "a:1 b:2 ",
            render("{{ range $k, $v := .m }}{{ $k }}:{{ $v }} {{ end }}", "m: {b: 2, a: 1}")
        );
        assert_eq!(
            "0=x 1=y ",
            render("{{ range $i, $e := .l }}{{ $i }}={{ . }} {{ end }}", "l: [x, y]")
        );
        assert_eq!("empty", render("{{ range .l }}x{{ else }}empty{{ end }}", "l: []"));
        assert_eq!("inner", render("{{ with .a }}{{ .b }}{{ end }}", "a: {b: inner}"));
        assert_eq!("none", render("{{ with .a }}x{{ else }}none{{ end }}", "b: 1"));
    }

    #[test]
    fn test_break_continue() {
        let text = concat!(
            "{{ range .l }}",
            "{{ if eq . 2 }}{{ continue }}{{ end }}",
            "{{ if eq . 4 }}{{ break }}{{ end }}",
            "{{ . }}{{ end }}"
        );
        let mut funcs = funcs();
        funcs.add2("eq", |a: Value, b: Value| Ok(a == b));
        let t = Template::parse("t", text, ("{{", "}}"), MissingKey::Error, funcs).unwrap();
        assert_eq!("13", t.execute(&data("l: [1, 2, 3, 4, 5]")).unwrap());
    }

    #[test]
    fn test_variables() {
        assert_eq!("1-2", render("{{ $x := 1 }}{{ $x }}-{{ $x = 2 }}{{ $x }}", "{}"));
        assert_eq!(
            "top",
            render("{{ with .a }}{{ $.name }}{{ end }}", "{name: top, a: {name: inner}}")
        );
    }

    #[test]
    fn test_field_access_leaves_data_intact() {
        let t = parse(
            "{{ $m := .m }}{{ $m.a }}{{ $m.a }}{{ .m.a }}{{ .m.b.c }}{{ .m.b.c }}",
            MissingKey::Error,
        )
        .unwrap();
        let data = data("m: {a: 1, b: {c: 2}}");
        assert_eq!("11122", t.execute(&data).unwrap());
        assert_eq!("11122", t.execute(&data).unwrap());
        assert_eq!("<no value>", render("{{ $x := .none }}{{ $x.a.b }}", "{}"));
    }

    #[test]
    fn test_trim_and_comments() {
        assert_eq!("ab", render("a  {{- /* comment */ -}}  b", "{}"));
        assert_eq!("a\nb", render("a\n{{- \"\" }}\nb", "{}"));
    }

    #[test]
    fn test_define_and_template() {
        let text = r#"{{ define "greet" }}hi {{ .who }}{{ end }}{{ template "greet" .p }}!"#;
        let t = parse(text, MissingKey::Placeholder).unwrap();
        assert_eq!(vec!["greet"], t.defined());
        assert_eq!("hi bob!", t.execute(&data("p: {who: bob}")).unwrap());
        assert_eq!(
            "[default]",
            render(r#"[{{ block "b" . }}default{{ end }}]"#, "{}")
        );
    }

    #[test]
    fn test_custom_delims() {
        let t = Template::parse(
            "t",
            "{{ keep }} [[ .name ]]",
            ("[[", "]]"),
            MissingKey::Placeholder,
            funcs(),
        )
        .unwrap();
        assert_eq!("{{ keep }} x", t.execute(&data("name: x")).unwrap());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "template: t:1:3: function \"nope\" not defined",
            parse_err("{{ nope }}")
        );
        assert!(parse_err("{{ .a ").contains("unclosed action"));
        assert!(parse_err("{{ if .a }}x").contains("unexpected EOF"));
        assert!(parse_err("{{ end }}").contains("unexpected {{end}}"));
        assert!(parse_err("{{ $x }}").contains("undefined variable \"$x\""));
        assert!(parse_err("{{ break }}").contains("{{break}} outside {{range}}"));
        assert!(parse_err("{{ upper }}").contains("wrong number of args for upper: want 1 got 0"));
        assert!(parse_err("{{ .a | upper \"x\" }}")
            .contains("wrong number of args for upper: want 1 got 2"));
        assert!(parse_err("{{ .a | 3 }}").contains("non executable command in pipeline stage 2"));
    }

    #[test]
    fn test_missing_key_error() {
        let err = exec_err("{{ .missing }}", "a: 1");
        assert_eq!("t:1:3", err.location.to_string());
        assert_eq!(".missing", err.node);
        assert_eq!("map has no entry for key \"missing\"", err.message);

        let err = exec_err("line\n  {{ .a.b.c }}", "a: {x: 1}");
        assert_eq!("t:2:5", err.location.to_string());
        assert_eq!("map has no entry for key \"b\"", err.message);
    }

    #[test]
    fn test_exec_errors() {
        let err = exec_err("{{ fail .a }}", "a: 1");
        assert_eq!("error calling fail: boom", err.message);
        assert_eq!("fail", err.node);

        let err = exec_err("{{ .a.b }}", "a: 3");
        assert_eq!("can't evaluate field b in type int", err.message);

        let err = exec_err("{{ .a \"x\" }}", "a: 3");
        assert!(err.message.starts_with("can't give argument to non-function"));

        let err = exec_err(r#"{{ define "d" }}{{ .x }}{{ end }}{{ template "d" . }}"#, "{}");
        assert_eq!("d", err.executing);
    }

    #[test]
    fn test_unbounded_template_recursion() {
        let err = exec_err(
            r#"{{ define "r" }}{{ template "r" . }}{{ end }}{{ template "r" }}"#,
            "{}",
        );
        assert!(err.message.starts_with("exceeded maximum template depth"));
    }
}
