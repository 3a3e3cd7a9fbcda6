use clap::{CommandFactory, FromArgMatches, Parser};
use error_stack::{Result, ResultExt};
use render::constants::{DEFAULT_MAX_DEPTH, DESCRIPTION, LEFT_DELIM, NAME, RIGHT_DELIM};
use render::error::RenderError;
use render::{Config, RenderOption, Renderer};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(Parser, Debug)]
#[command(name = NAME, version)]
struct Cli {
    /// Print debug logs
    #[arg(short, long)]
    debug: bool,
    /// Template to render. Reads stdin if not given
    #[arg(long = "in", value_name = "PATH")]
    input: Option<String>,
    /// Where to write the result. Writes to stdout if not given
    #[arg(long = "out", value_name = "PATH")]
    output: Option<String>,
    /// YAML or JSON configuration file, can be given multiple times.
    /// Later files are merged over earlier ones
    #[arg(long = "config", value_name = "PATH")]
    configs: Vec<PathBuf>,
    /// Set a configuration value, can be given multiple times. Dots in the key
    /// create nested maps
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
    /// Print `<no value>` for missing keys instead of failing
    #[arg(long)]
    unsafe_ignore_missing_keys: bool,
    /// Left template delimiter
    #[arg(long, value_name = "DELIM", default_value = LEFT_DELIM)]
    left_delim: String,
    /// Right template delimiter
    #[arg(long, value_name = "DELIM", default_value = RIGHT_DELIM)]
    right_delim: String,
    /// How many renders may be nested with the `render` function
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

fn main() {
    let matches = Cli::command()
        .about(format!("{NAME} - {DESCRIPTION}"))
        .get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let input = cli.input.clone().unwrap_or_default();
    if input.is_empty() {
        if std::io::stdin().is_terminal() {
            print_error("expected either stdin or --in parameter, for usage use --help");
            std::process::exit(1);
        }
        log::debug!("using piped stdin");
    }

    if let Err(e) = run(&cli, &input) {
        print_error(&format!("{e:?}"));
        std::process::exit(1);
    }
}

fn run(cli: &Cli, input: &str) -> Result<(), RenderError> {
    let config = Config::load(&cli.configs, &cli.vars)
        .change_context(RenderError::Configuration)?;
    log::debug!("configuration: {config:?}");
    let option = if cli.unsafe_ignore_missing_keys {
        RenderOption::MissingKeyInvalid
    } else {
        RenderOption::MissingKeyError
    };
    let mut renderer = Renderer::new(Some(Arc::new(config)), vec![option]);
    renderer
        .delim(&cli.left_delim, &cli.right_delim)
        .max_depth(cli.max_depth);
    let output = cli.output.clone().unwrap_or_default();
    renderer.file_render(input, &output)
}

fn print_error(message: &str) {
    let mut err = StandardStream::stderr(ColorChoice::Auto);
    let printed = err
        .set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Red)))
        .and_then(|_| write!(err, "error:"))
        .and_then(|_| err.reset())
        .and_then(|_| writeln!(err, " {message}"));
    if printed.is_err() {
        eprintln!("error: {message}");
    }
}

