//! Validation functions for configuration values.
//!
//! Provides custom validation functions for paths, directory names
//! and datetime formats.

use crate::backup::archive_pattern::check_datetime_format;

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

pub fn validate_non_empty_path<P: AsRef<Path>>(path: P) -> Result<(), ValidationError> {
    if path.as_ref().as_os_str().is_empty() {
        return Err(ValidationError::new("EmptyPath").with_message("path must not be empty".into()));
    }

    Ok(())
}

pub fn validate_non_empty_str<S: AsRef<str>>(value: S) -> Result<(), ValidationError> {
    if value.as_ref().is_empty() {
        return Err(ValidationError::new("EmptyValue").with_message("value must not be empty".into()));
    }

    Ok(())
}

/// The archive directory is created next to every source file, so it must be
/// a single plain directory name.
pub fn validate_destination_dir<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    validate_non_empty_str(name)?;
    if Path::new(name).is_absolute() {
        return Err(ValidationError::new("InvalidDestinationDir")
            .with_message(format!("{name:?} must be relative").into()));
    }
    if !is_sanitized(name) || name == "." || name == ".." {
        return Err(ValidationError::new("InvalidDestinationDir").with_message(
            format!("Invalid directory name, try sanitizing like {:?}", sanitize(name)).into(),
        ));
    }

    Ok(())
}

pub fn validate_datetime_format<S: AsRef<str>>(format: S) -> Result<(), ValidationError> {
    check_datetime_format(format.as_ref())
        .map_err(|e| ValidationError::new("InvalidDatetimeFormat").with_message(e.into()))
}
