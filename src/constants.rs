pub const NAME: &str = "render";
pub const DESCRIPTION: &str = "Universal data-driven templates for generating textual output";

/// Left template delimiter used unless [`Renderer::delim`](crate::Renderer::delim) says otherwise
pub const LEFT_DELIM: &str = "{{";
/// Right template delimiter used unless [`Renderer::delim`](crate::Renderer::delim) says otherwise
pub const RIGHT_DELIM: &str = "}}";

/// Option literal: continue on missing key and print [`NO_VALUE`]
pub const MISSING_KEY_INVALID: &str = "missingkey=invalid";
/// Option literal: stop execution with an error on missing key
pub const MISSING_KEY_ERROR: &str = "missingkey=error";

/// Text printed in place of a value that could not be looked up
pub const NO_VALUE: &str = "<no value>";

/// Template name used by [`Renderer::simple_render`](crate::Renderer::simple_render)
pub const NAMELESS: &str = "nameless";
/// Template name used by [`Renderer::file_render`](crate::Renderer::file_render) when reading stdin
pub const STDIN: &str = "stdin";

/// Permission bits of rendered output files (`rw-r--r--`)
pub const OUTPUT_MODE: u32 = 0o644;

/// How many nested `render` calls are allowed by default
pub const DEFAULT_MAX_DEPTH: usize = 64;
/// How deep `template`/`block` invocations may nest during one execution
pub const MAX_EXEC_DEPTH: usize = 100;
/// Largest string or list a helper function may build, in bytes or elements
pub const MAX_GENERATED_LEN: usize = 64 * 1024 * 1024;
