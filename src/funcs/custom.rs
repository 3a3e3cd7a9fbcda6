//! Functions that only make sense inside this renderer
//!
//! - `render`: render a nested template with the same renderer
//! - `readFile`: embed a file, relative paths are resolved against the renderer root
//! - `toYaml`: dump a piece of the configuration as YAML
//! - `gzip` / `ungzip`: compress and extract, best used with `b64enc` / `b64dec`

use super::{FuncMap, RenderHost};
use crate::error::FuncError;
use crate::fs;
use crate::value::Value;
use error_stack::{IntoReport, Result, ResultExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub fn register<'r>(funcs: &mut FuncMap<'r>, host: &'r dyn RenderHost) {
    funcs.add1("render", move |text: String| {
        host.simple_render(&text)
            .change_context(FuncError::new("nested render failed"))
    });
    funcs.add1("readFile", move |path: String| read_file(host, &path));
    funcs.add1("toYaml", |v: Value| to_yaml(&v));
    funcs.add1("gzip", |data: Vec<u8>| gzip(&data));
    funcs.add1("ungzip", |data: Vec<u8>| ungzip(&data));
}

fn read_file(host: &dyn RenderHost, path: &str) -> Result<Value, FuncError> {
    let path = fs::resolve(host.root(), path);
    log::debug!("reading file: {}", path.display());
    let bytes = std::fs::read(&path)
        .into_report()
        .change_context_lazy(|| FuncError::new(format!("cannot read file: {}", path.display())))?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => Value::String(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    })
}

pub fn to_yaml(v: &Value) -> Result<String, FuncError> {
    serde_yaml::to_string(v)
        .into_report()
        .change_context(FuncError::new("cannot serialize to YAML"))
}

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, FuncError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .into_report()
        .change_context(FuncError::new("cannot compress"))
}

pub fn ungzip(data: &[u8]) -> Result<String, FuncError> {
    let mut out = String::new();
    GzDecoder::new(data)
        .read_to_string(&mut out)
        .into_report()
        .change_context(FuncError::new("cannot extract"))?;
    Ok(out)
}
