//! Common utils for integration tests
//!
//! Each case is a directory under `tests/examples`. It is copied to a scratch
//! directory before running, so cases can write their outputs next to the inputs.

use copy_dir::copy_dir;
use error_stack::Result;
use murmur3::murmur3_32;
use render::{error::RenderError, *};
use std::{
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

pub struct ItEnv {
    options: Vec<RenderOption>,
    delims: Option<(String, String)>,
    test_description: String,
    test_dir: PathBuf,
}

impl ItEnv {
    pub fn new(example_dir_name: &str) -> Self {
        let test_description = example_dir_name.to_string();
        let mut read = BufReader::new(test_description.as_bytes());
        let test_name = format!(
            "test-{}",
            murmur3_32(&mut read, test_description.len().try_into().unwrap()).unwrap()
        );
        // create test directory
        let root_path = Path::new("target/test_out");
        if !root_path.exists() {
            std::fs::create_dir_all(root_path).unwrap();
        }
        let path = root_path.join(test_name);
        if path.exists() {
            std::fs::remove_dir_all(&path).unwrap();
        }

        // copy example directory to test directory
        copy_dir(example_dir_name, &path).unwrap();

        Self {
            options: vec![RenderOption::MissingKeyError],
            delims: None,
            test_description,
            test_dir: path,
        }
    }

    #[inline]
    pub fn execute<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self),
    {
        f(self)
    }

    #[inline]
    #[allow(dead_code)]
    pub fn options(&mut self, options: Vec<RenderOption>) {
        self.options = options;
    }

    #[inline]
    #[allow(dead_code)]
    pub fn delim(&mut self, left: &str, right: &str) {
        self.delims = Some((left.to_string(), right.to_string()));
    }

    /// Render `input` into `output` with `config.yaml` of the case as configuration
    pub fn run(&self, input: &str, output: &str) -> Result<(), RenderError> {
        let config_path = self.test_dir.join("config.yaml");
        let config = if config_path.exists() {
            Config::load(&[config_path], &[]).unwrap()
        } else {
            Config::default()
        };
        let mut renderer = Renderer::new(Some(Arc::new(config)), self.options.clone());
        renderer.root_dir(&self.test_dir);
        if let Some((left, right)) = &self.delims {
            renderer.delim(left, right);
        }
        let input = self.test_dir.join(input);
        let output = self.test_dir.join(output);
        renderer.file_render(input.to_str().unwrap(), output.to_str().unwrap())
    }

    pub fn assert_file_eq(&self, file_name: &str, expected_file_name: &str) {
        let expected_path = self.test_dir.join(expected_file_name);
        assert!(
            expected_path.exists(),
            "expected file `{}` does not exist in test `{}` ({})",
            expected_file_name,
            self.test_description,
            self.test_dir.display()
        );
        let actual_path = self.test_dir.join(file_name);
        assert!(
            actual_path.exists(),
            "expected output file `{}` does not exist in test `{}` ({})",
            file_name,
            self.test_description,
            self.test_dir.display()
        );
        let actual = std::fs::read_to_string(actual_path).unwrap();
        let expected = std::fs::read_to_string(expected_path).unwrap();
        assert_eq!(
            actual,
            expected,
            "file comparison failed in test `{}` ({})",
            self.test_description,
            self.test_dir.display()
        );
    }

    #[inline]
    pub fn assert_path_exists(&self, path_name: &str, exists: bool) {
        assert_eq!(
            exists,
            self.test_dir.join(path_name).exists(),
            "file existence test failed in test `{}` ({})",
            self.test_description,
            self.test_dir.display()
        );
    }
}

macro_rules! testit {
    ($test_name:ident, $fnonce:expr) => {
        #[test]
        #[allow(non_snake_case)]
        fn $test_name() {
            let mut env = ItEnv::new(&stringify!($test_name).replace("__", "/"));
            env.execute($fnonce);
        }
    };
}

pub(crate) use testit;
