//! The render pipeline: validate, build functions, parse, execute

use crate::config::Configuration;
use crate::constants::{
    DEFAULT_MAX_DEPTH, LEFT_DELIM, MISSING_KEY_ERROR, MISSING_KEY_INVALID, NAMELESS, OUTPUT_MODE,
    RIGHT_DELIM, STDIN,
};
use crate::error::{OptionError, RenderError};
use crate::funcs::{self, FuncMap, RenderHost};
use crate::fs;
use crate::template::{MissingKey, Template};
use error_stack::{IntoReport, Report, Result, ResultExt};
use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Rendering options
///
/// The two options are mutually exclusive. If both are given, the last one wins.
/// Without either, missing keys are replaced with `<no value>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOption {
    /// Continue on missing key and print `<no value>` (`missingkey=invalid`)
    MissingKeyInvalid,
    /// Stop with an error on missing key (`missingkey=error`)
    MissingKeyError,
}

impl FromStr for RenderOption {
    type Err = OptionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            MISSING_KEY_INVALID => Ok(Self::MissingKeyInvalid),
            MISSING_KEY_ERROR => Ok(Self::MissingKeyError),
            _ => Err(OptionError {
                literal: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for RenderOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKeyInvalid => write!(f, "{MISSING_KEY_INVALID}"),
            Self::MissingKeyError => write!(f, "{MISSING_KEY_ERROR}"),
        }
    }
}

/// Renders templates against a configuration
///
/// A renderer can be reused for any number of renders. Templates rendering nested
/// templates with the `render` function go through the same renderer, so a renderer
/// is not meant to be shared between threads; create one per thread instead and
/// share the configuration.
#[derive(Debug)]
pub struct Renderer {
    configuration: Option<Arc<dyn Configuration>>,
    options: Vec<RenderOption>,
    left_delim: String,
    right_delim: String,
    root: PathBuf,
    max_depth: usize,
    /// Renders currently on the stack
    depth: Cell<usize>,
}

impl Renderer {
    /// Create a renderer with the default delimiters `{{` and `}}`
    pub fn new(configuration: Option<Arc<dyn Configuration>>, options: Vec<RenderOption>) -> Self {
        Self {
            configuration,
            options,
            left_delim: LEFT_DELIM.to_string(),
            right_delim: RIGHT_DELIM.to_string(),
            root: PathBuf::from("."),
            max_depth: DEFAULT_MAX_DEPTH,
            depth: Cell::new(0),
        }
    }

    /// Set the delimiters. They are checked by [`Renderer::validate`]
    pub fn delim(&mut self, left: &str, right: &str) -> &mut Self {
        self.left_delim = left.to_string();
        self.right_delim = right.to_string();
        self
    }

    /// Set the directory `readFile` resolves relative paths against
    pub fn root_dir(&mut self, root: impl Into<PathBuf>) -> &mut Self {
        self.root = root.into();
        self
    }

    /// Set how many renders may be nested with the `render` function,
    /// the outermost render included
    pub fn max_depth(&mut self, max_depth: usize) -> &mut Self {
        self.max_depth = max_depth;
        self
    }

    /// Left and right delimiters templates are parsed with
    pub fn delims(&self) -> (&str, &str) {
        (&self.left_delim, &self.right_delim)
    }

    /// Options in the order they were given
    pub fn options(&self) -> &[RenderOption] {
        &self.options
    }

    /// What happens on missing keys, according to the last option given
    pub fn missing_key(&self) -> MissingKey {
        match self.options().last() {
            Some(RenderOption::MissingKeyError) => MissingKey::Error,
            Some(RenderOption::MissingKeyInvalid) | None => MissingKey::Placeholder,
        }
    }

    /// Check the renderer is ready to render
    ///
    /// Fails if the configuration is absent or invalid, or if a delimiter is empty.
    pub fn validate(&self) -> Result<(), RenderError> {
        let configuration = self.configuration()?;
        configuration
            .validate()
            .change_context(RenderError::Configuration)?;
        let (left, right) = self.delims();
        if left.is_empty() {
            return Err(Report::new(RenderError::Delimiter)
                .attach_printable("left delimiter is empty"));
        }
        if right.is_empty() {
            return Err(Report::new(RenderError::Delimiter)
                .attach_printable("right delimiter is empty"));
        }
        Ok(())
    }

    /// Parse `text` as a template named `name` with the configured delimiters,
    /// options and the given functions
    pub fn parse<'r>(
        &self,
        name: &str,
        text: &str,
        funcs: FuncMap<'r>,
    ) -> Result<Template<'r>, RenderError> {
        Template::parse(
            name,
            text,
            self.delims(),
            self.missing_key(),
            funcs,
        )
        .change_context(RenderError::Parse)
    }

    /// Execute a parsed template against the configuration
    pub fn execute(&self, template: &Template) -> Result<String, RenderError> {
        let data = self.configuration()?.data();
        template
            .execute(data)
            .change_context(RenderError::Execution)
            .attach_printable_lazy(|| {
                format!("Error evaluating the template named: '{}'", template.name())
            })
    }

    /// Validate, parse and execute `text` as a template named `name`
    pub fn render(&self, name: &str, text: &str) -> Result<String, RenderError> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(Report::new(RenderError::RecursionLimit).attach_printable(format!(
                "more than {} nested renders while rendering `{name}`",
                self.max_depth
            )));
        }
        self.depth.set(depth + 1);
        let result = self.render_stages(name, text);
        self.depth.set(depth);
        result
    }

    fn render_stages(&self, name: &str, text: &str) -> Result<String, RenderError> {
        log::debug!("rendering `{name}` (depth {})", self.depth.get());
        self.validate().map_err(|e| {
            log::error!("Invalid renderer state while rendering `{name}`");
            e
        })?;
        let template = self.parse(name, text, funcs::build(self)).map_err(|e| {
            log::error!("Can't parse the template `{name}`");
            e
        })?;
        self.execute(&template).map_err(|e| {
            log::error!("Can't execute the template `{name}`");
            e
        })
    }

    /// Render a template named `nameless`. This is what the `render` function calls
    pub fn simple_render(&self, text: &str) -> Result<String, RenderError> {
        self.render(NAMELESS, text)
    }

    /// Render the template at `input` into `output`
    ///
    /// An empty `input` reads stdin and names the template `stdin`, an empty
    /// `output` writes to stdout.
    pub fn file_render(&self, input: &str, output: &str) -> Result<(), RenderError> {
        let bytes = fs::read_input(input)
            .change_context(RenderError::Io)
            .map_err(|e| {
                log::debug!("Can't open the template: {input}");
                e
            })?;
        let text = String::from_utf8(bytes)
            .into_report()
            .change_context(RenderError::Io)
            .attach_printable("the template is not valid UTF-8")?;
        let name = if input.is_empty() { STDIN } else { input };
        let result = self.render(name, &text)?;
        fs::write_output(output, result.as_bytes(), OUTPUT_MODE)
            .change_context(RenderError::Io)
            .map_err(|e| {
                log::debug!("Can't save the rendered output: {output}");
                e
            })
    }

    fn configuration(&self) -> Result<&dyn Configuration, RenderError> {
        match &self.configuration {
            Some(c) => Ok(c.as_ref()),
            None => Err(Report::new(RenderError::Configuration)
                .attach_printable("no configuration was given")),
        }
    }
}

impl RenderHost for Renderer {
    fn simple_render(&self, text: &str) -> Result<String, RenderError> {
        Renderer::simple_render(self, text)
    }

    fn root(&self) -> &Path {
        &self.root
    }
}
