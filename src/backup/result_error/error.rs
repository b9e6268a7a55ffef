use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error("Scan loop detected: {path:?} points back to its ancestor {ancestor:?}")]
    ScanLoop { path: PathBuf, ancestor: PathBuf },
    #[error("Configuration failed ({0})")]
    Config(String),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(Error::into_iter).collect_vec())
    }
}

impl Error {
    pub fn config<S: Into<String>>(reason: S) -> Self {
        Self::Config(reason.into())
    }

    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(Error::into_iter)),
            e => Box::new(std::iter::once(e)),
        }
    }

    /// First OS error code found in the error chain, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(e) => e.raw_os_error(),
            Error::WithMsg { error, .. } | Error::WithDebugObjAndFnName { error, .. } => {
                error.raw_os_error()
            }
            Error::LotsOfError(v) => v.iter().find_map(Error::raw_os_error),
            _ => None,
        }
    }

    /// Process exit code: the OS error code when one fits in a byte, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        self.raw_os_error()
            .and_then(|code| u8::try_from(code).ok())
            .filter(|code| *code != 0)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_error(code: i32) -> Error {
        Error::from(std::io::Error::from_raw_os_error(code))
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error);

        match error {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_with_msg() {
        let error = Error::config("destination_dir is empty").with_msg("Custom message");

        match error {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_with_debug_object_and_fn_name_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error).with_debug_object_and_fn_name("notes.txt", "test_function");
        let error_str = error.to_string();

        assert!(error_str.contains("\"notes.txt\" test_function"));
        assert!(error_str.contains("failed"));
        assert!(error_str.contains("file not found"));
    }

    #[test]
    fn test_error_from_vec_flattens() {
        let nested = Error::from(vec![Error::config("a"), Error::config("b")]);
        let combined = Error::from(vec![nested, Error::config("c")]);
        match combined {
            Error::LotsOfError(error_vec) => assert_eq!(error_vec.len(), 3),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    #[should_panic(expected = "Should not create lots of errors when error is empty")]
    fn test_error_from_empty_vec_panics() {
        let errors: Vec<Error> = vec![];
        let _error = Error::from(errors);
    }

    #[test]
    fn test_config_error_display() {
        let error = Error::config("destination_dir is absolute path");
        assert_eq!(
            error.to_string(),
            "Configuration failed (destination_dir is absolute path)"
        );
    }

    #[test]
    fn test_exit_code_passes_os_error_through() {
        assert_eq!(os_error(13).exit_code(), 13);
    }

    #[test]
    fn test_exit_code_finds_os_error_behind_context() {
        let error = os_error(2)
            .with_msg("Copy failed")
            .with_debug_object_and_fn_name(PathBuf::from("a.txt"), "create_backup");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_defaults_to_one() {
        assert_eq!(Error::config("bad").exit_code(), 1);
        let no_code = std::io::Error::new(std::io::ErrorKind::Other, "custom");
        assert_eq!(Error::from(no_code).exit_code(), 1);
    }

    #[test]
    fn test_exit_code_out_of_range_is_one() {
        assert_eq!(os_error(1000).exit_code(), 1);
    }
}
