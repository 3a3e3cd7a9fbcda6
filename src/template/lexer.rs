//! Splits template text into tokens
//!
//! Text outside the delimiters becomes a single [`Token::Text`]. Inside an action
//! the lexer produces operands, punctuation and keywords until the right delimiter.
//! Trim markers (`{{- ` and ` -}}`) are applied here, so the parser never sees them.

use super::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),
    LeftDelim,
    RightDelim,
    /// Function name
    Identifier(String),
    Keyword(Keyword),
    /// `.name`
    Field(String),
    /// `.` on its own
    Dot,
    /// `$` or `$name`, stored with the `$`
    Variable(String),
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    LeftParen,
    RightParen,
    Pipe,
    /// `:=`
    Declare,
    /// `=`
    Assign,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    End,
    Range,
    With,
    Define,
    Template,
    Block,
    Break,
    Continue,
}

impl Keyword {
    fn from_ident(s: &str) -> Option<Self> {
        Some(match s {
            "if" => Self::If,
            "else" => Self::Else,
            "end" => Self::End,
            "range" => Self::Range,
            "with" => Self::With,
            "define" => Self::Define,
            "template" => Self::Template,
            "block" => Self::Block,
            "break" => Self::Break,
            "continue" => Self::Continue,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Else => "else",
            Self::End => "end",
            Self::Range => "range",
            Self::With => "with",
            Self::Define => "define",
            Self::Template => "template",
            Self::Block => "block",
            Self::Break => "break",
            Self::Continue => "continue",
        }
    }
}

/// A token with its byte span in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
    pub end: usize,
}

pub struct Lexer<'a> {
    src: &'a str,
    left: &'a str,
    right: &'a str,
    pos: usize,
    tokens: Vec<Spanned>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, left: &'a str, right: &'a str) -> Self {
        Self {
            src,
            left,
            right,
            pos: 0,
            tokens: vec![],
        }
    }

    /// Tokenize the whole source
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, SyntaxError> {
        // whether the previous action ended with a trim marker
        let mut trim_next = false;
        while self.pos < self.src.len() {
            let rest = &self.src[self.pos..];
            let (text_len, found) = match rest.find(self.left) {
                Some(i) => (i, true),
                None => (rest.len(), false),
            };
            let mut text = &rest[..text_len];
            let text_pos = self.pos;
            if trim_next {
                let trimmed = text.trim_start();
                let skipped = text.len() - trimmed.len();
                self.pos += skipped;
                text = trimmed;
                trim_next = false;
            }
            let action_pos = text_pos + text_len;
            let mut inner = action_pos + self.left.len();
            if found && self.has_left_trim(inner) {
                text = text.trim_end();
                // marker and the space after it
                inner += 2;
            }
            if !text.is_empty() {
                self.push(Token::Text(text.to_string()), self.pos, self.pos + text.len());
            }
            if !found {
                break;
            }
            self.pos = inner;
            trim_next = self.lex_action(action_pos)?;
        }
        Ok(self.tokens)
    }

    fn has_left_trim(&self, i: usize) -> bool {
        let b = self.src.as_bytes();
        i + 1 < b.len() && b[i] == b'-' && b[i + 1].is_ascii_whitespace()
    }

    fn push(&mut self, token: Token, pos: usize, end: usize) {
        self.tokens.push(Spanned { token, pos, end });
    }

    /// Check for the right delimiter at the current position.
    ///
    /// Returns `Some(trim)` and moves past it if found.
    fn try_right_delim(&mut self) -> Option<bool> {
        let rest = &self.src[self.pos..];
        if rest.starts_with(self.right) {
            self.pos += self.right.len();
            return Some(false);
        }
        let preceded_by_space = self.pos > 0
            && self.src.as_bytes()[self.pos - 1].is_ascii_whitespace();
        if preceded_by_space && rest.starts_with('-') && rest[1..].starts_with(self.right) {
            self.pos += 1 + self.right.len();
            return Some(true);
        }
        None
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.src[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    /// Lex one action. `self.pos` is right after the left delimiter (and trim marker).
    ///
    /// Returns whether the action ends with a trim marker.
    fn lex_action(&mut self, action_pos: usize) -> Result<bool, SyntaxError> {
        // a comment must start right after the delimiter or trim marker
        if self.src[self.pos..].starts_with("/*") {
            return self.lex_comment(action_pos);
        }
        self.skip_whitespace();
        self.push(Token::LeftDelim, action_pos, self.pos);
        let mut depth = 0usize;
        loop {
            self.skip_whitespace();
            if self.pos >= self.src.len() {
                return Err(SyntaxError::new(action_pos, "unclosed action"));
            }
            if depth == 0 {
                let start = self.pos;
                if let Some(trim) = self.try_right_delim() {
                    self.push(Token::RightDelim, start, self.pos);
                    return Ok(trim);
                }
            }
            let start = self.pos;
            let c = self.peek_char();
            let token = match c {
                '(' => {
                    depth += 1;
                    self.pos += 1;
                    Token::LeftParen
                }
                ')' => {
                    if depth == 0 {
                        return Err(SyntaxError::new(start, "unexpected right paren"));
                    }
                    depth -= 1;
                    self.pos += 1;
                    Token::RightParen
                }
                '|' => {
                    self.pos += 1;
                    Token::Pipe
                }
                ',' => {
                    self.pos += 1;
                    Token::Comma
                }
                '=' => {
                    self.pos += 1;
                    Token::Assign
                }
                ':' => {
                    if self.src[self.pos..].starts_with(":=") {
                        self.pos += 2;
                        Token::Declare
                    } else {
                        return Err(SyntaxError::new(start, "expected :="));
                    }
                }
                '"' => self.lex_quoted(start)?,
                '`' => self.lex_raw(start)?,
                '$' => {
                    self.pos += 1;
                    let name = self.take_ident();
                    Token::Variable(format!("${name}"))
                }
                '.' => {
                    let next = self.src[self.pos + 1..].chars().next();
                    match next {
                        Some(n) if n.is_ascii_digit() => self.lex_number(start)?,
                        Some(n) if is_ident_char(n) => {
                            self.pos += 1;
                            Token::Field(self.take_ident().to_string())
                        }
                        _ => {
                            self.pos += 1;
                            Token::Dot
                        }
                    }
                }
                c if c.is_ascii_digit() || c == '-' || c == '+' => self.lex_number(start)?,
                c if is_ident_char(c) => {
                    let ident = self.take_ident();
                    match ident {
                        "true" => Token::Bool(true),
                        "false" => Token::Bool(false),
                        "nil" => Token::Nil,
                        _ => match Keyword::from_ident(ident) {
                            Some(k) => Token::Keyword(k),
                            None => Token::Identifier(ident.to_string()),
                        },
                    }
                }
                c => {
                    return Err(SyntaxError::new(
                        start,
                        format!("unrecognized character in action: {c:?}"),
                    ))
                }
            };
            self.push(token, start, self.pos);
        }
    }

    fn lex_comment(&mut self, action_pos: usize) -> Result<bool, SyntaxError> {
        let body_start = self.pos + 2;
        let close = match self.src[body_start..].find("*/") {
            Some(i) => body_start + i + 2,
            None => return Err(SyntaxError::new(action_pos, "unclosed comment")),
        };
        // and end right before the delimiter or trim marker
        let rest = &self.src[close..];
        if rest.starts_with(self.right) {
            self.pos = close + self.right.len();
            return Ok(false);
        }
        let trimmed = rest.as_bytes().first().is_some_and(u8::is_ascii_whitespace)
            && rest[1..].starts_with('-')
            && rest[2..].starts_with(self.right);
        if trimmed {
            self.pos = close + 2 + self.right.len();
            return Ok(true);
        }
        Err(SyntaxError::new(
            action_pos,
            "comment ends before closing delimiter",
        ))
    }

    fn peek_char(&self) -> char {
        self.src[self.pos..].chars().next().unwrap_or('\0')
    }

    fn take_ident(&mut self) -> &'a str {
        let rest = &self.src[self.pos..];
        let len = rest
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, SyntaxError> {
        let rest = &self.src[self.pos..];
        let len = rest
            .char_indices()
            .find(|&(i, c)| {
                let sign_ok = (c == '-' || c == '+')
                    && (i == 0 || matches!(rest.as_bytes()[i - 1], b'e' | b'E'));
                !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || sign_ok)
            })
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let literal = &rest[..len];
        self.pos += len;
        parse_number(literal)
            .ok_or_else(|| SyntaxError::new(start, format!("bad number syntax: {literal:?}")))
    }

    fn lex_quoted(&mut self, start: usize) -> Result<Token, SyntaxError> {
        let mut out = String::new();
        let mut chars = self.src[self.pos + 1..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += 1 + i + 1;
                    return Ok(Token::String(out));
                }
                '\n' => break,
                '\\' => {
                    let (_, e) = match chars.next() {
                        Some(x) => x,
                        None => break,
                    };
                    let escaped = match e {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        'a' => '\x07',
                        'b' => '\x08',
                        'f' => '\x0c',
                        'v' => '\x0b',
                        '0' => '\0',
                        '\\' => '\\',
                        '"' => '"',
                        '\'' => '\'',
                        'x' | 'u' | 'U' => {
                            let n = match e {
                                'x' => 2,
                                'u' => 4,
                                _ => 8,
                            };
                            let mut code = 0u32;
                            for _ in 0..n {
                                let d = chars.next().and_then(|(_, d)| d.to_digit(16));
                                match d {
                                    Some(d) => code = code * 16 + d,
                                    None => {
                                        return Err(SyntaxError::new(
                                            start,
                                            "invalid syntax in quoted string",
                                        ))
                                    }
                                }
                            }
                            match char::from_u32(code) {
                                Some(c) => c,
                                None => {
                                    return Err(SyntaxError::new(
                                        start,
                                        "invalid syntax in quoted string",
                                    ))
                                }
                            }
                        }
                        _ => {
                            return Err(SyntaxError::new(
                                start,
                                format!("unknown escape sequence: \\{e}"),
                            ))
                        }
                    };
                    out.push(escaped);
                }
                c => out.push(c),
            }
        }
        Err(SyntaxError::new(start, "unterminated quoted string"))
    }

    fn lex_raw(&mut self, start: usize) -> Result<Token, SyntaxError> {
        let body = self.pos + 1;
        match self.src[body..].find('`') {
            Some(i) => {
                self.pos = body + i + 1;
                Ok(Token::String(self.src[body..body + i].to_string()))
            }
            None => Err(SyntaxError::new(start, "unterminated raw quoted string")),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn parse_number(literal: &str) -> Option<Token> {
    let cleaned = literal.replace('_', "");
    let (sign, digits) = match cleaned.strip_prefix('-') {
        Some(d) => ("-", d),
        None => ("", cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let radix = if digits.starts_with("0x") || digits.starts_with("0X") {
        Some((16, &digits[2..]))
    } else if digits.starts_with("0o") || digits.starts_with("0O") {
        Some((8, &digits[2..]))
    } else if digits.starts_with("0b") || digits.starts_with("0B") {
        Some((2, &digits[2..]))
    } else {
        None
    };
    if let Some((radix, body)) = radix {
        if body.starts_with(['+', '-']) {
            return None;
        }
        let i = i64::from_str_radix(&format!("{sign}{body}"), radix).ok()?;
        return Some(Token::Int(i));
    }
    // parse with the sign so `i64::MIN` stays an integer
    let signed = format!("{sign}{digits}");
    if let Ok(i) = signed.parse::<i64>() {
        return Some(Token::Int(i));
    }
    let f = signed.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Some(Token::Float(f))
}

#[cfg(test)]
mod ut {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::new(src, "{{", "}}")
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_text_only() {
        assert_eq!(vec![Token::Text("hello".to_string())], lex("hello"));
        assert!(lex("").is_empty());
    }

    #[test]
    fn test_field_action() {
        assert_eq!(
            vec![
                Token::Text("test-".to_string()),
                Token::LeftDelim,
                Token::Field("something".to_string()),
                Token::RightDelim,
                Token::Text("-test".to_string()),
            ],
            lex("test-{{ .something }}-test")
        );
    }

    #[test]
    fn test_field_positions() {
        let tokens = Lexer::new("{{ .missing }}", "{{", "}}").tokenize().unwrap();
        assert_eq!(3, tokens[1].pos);
        assert_eq!(11, tokens[1].end);
    }

    #[test]
    fn test_string_containing_delims() {
        assert_eq!(
            vec![
                Token::LeftDelim,
                Token::Identifier("render".to_string()),
                Token::String("{{ 1 }}".to_string()),
                Token::RightDelim,
            ],
            lex(r#"{{ render "{{ 1 }}" }}"#)
        );
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(
            vec![
                Token::Text("a".to_string()),
                Token::LeftDelim,
                Token::Int(1),
                Token::RightDelim,
                Token::Text("b".to_string()),
            ],
            lex("a  \n {{- 1 -}} \n b")
        );
    }

    #[test]
    fn test_negative_number_not_trim() {
        assert_eq!(
            vec![Token::LeftDelim, Token::Int(-3), Token::RightDelim],
            lex("{{-3}}")
        );
    }

    #[test]
    fn test_comment() {
        assert_eq!(
            vec![Token::Text("a".to_string()), Token::Text("b".to_string())],
            lex("a{{/* hidden }} */}}b")
        );
        assert_eq!(
            vec![Token::Text("a".to_string()), Token::Text("b".to_string())],
            lex("a {{- /* x */ -}} b")
        );
    }

    #[test]
    fn test_comment_placement() {
        let err = |src: &str| Lexer::new(src, "{{", "}}").tokenize().unwrap_err().message;
        assert_eq!("unrecognized character in action: '/'", err("{{ /* c */ }}"));
        assert_eq!("comment ends before closing delimiter", err("{{/* c */ }}"));
        assert_eq!("unrecognized character in action: '/'", err("{{-  /* c */ -}}"));
        assert!(Lexer::new("{{/* c */ -}}", "{{", "}}").tokenize().is_ok());
    }

    #[test]
    fn test_signed_integers() {
        assert_eq!(
            vec![Token::LeftDelim, Token::Int(i64::MIN), Token::RightDelim],
            lex("{{ -9223372036854775808 }}")
        );
        assert_eq!(
            vec![Token::LeftDelim, Token::Int(-255), Token::RightDelim],
            lex("{{ -0xff }}")
        );
        assert_eq!(
            vec![Token::LeftDelim, Token::Float(-9223372036854775809.0), Token::RightDelim],
            lex("{{ -9223372036854775809 }}")
        );
    }

    #[test]
    fn test_custom_delims() {
        assert_eq!(
            vec![
                Token::Text("{{ x }}".to_string()),
                Token::LeftDelim,
                Token::Dot,
                Token::RightDelim,
            ],
            Lexer::new("{{ x }}<% . %>", "<%", "%>")
                .tokenize()
                .unwrap()
                .into_iter()
                .map(|s| s.token)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_operators_and_keywords() {
        assert_eq!(
            vec![
                Token::LeftDelim,
                Token::Keyword(Keyword::Range),
                Token::Variable("$i".to_string()),
                Token::Comma,
                Token::Variable("$e".to_string()),
                Token::Declare,
                Token::Field("list".to_string()),
                Token::Pipe,
                Token::Identifier("len".to_string()),
                Token::RightDelim,
            ],
            lex("{{ range $i, $e := .list | len }}")
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            vec![
                Token::LeftDelim,
                Token::Float(1.5),
                Token::Int(255),
                Token::Bool(true),
                Token::Nil,
                Token::String("a\tb".to_string()),
                Token::String("raw\\n".to_string()),
                Token::RightDelim,
            ],
            lex("{{ 1.5 0xff true nil \"a\\tb\" `raw\\n` }}")
        );
    }

    #[test]
    fn test_chained_fields_adjacent() {
        let tokens = Lexer::new("{{ .a.b }}", "{{", "}}").tokenize().unwrap();
        assert_eq!(Token::Field("a".to_string()), tokens[1].token);
        assert_eq!(Token::Field("b".to_string()), tokens[2].token);
        assert_eq!(tokens[1].end, tokens[2].pos);
    }

    #[test]
    fn test_unclosed_action() {
        let err = Lexer::new("ab {{ .x", "{{", "}}").tokenize().unwrap_err();
        assert_eq!(3, err.pos);
        assert_eq!("unclosed action", err.message);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("{{ \"abc }}", "{{", "}}").tokenize().unwrap_err();
        assert_eq!(3, err.pos);
    }
}
