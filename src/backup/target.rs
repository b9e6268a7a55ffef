use crate::backup::result_error::error::Error;
use crate::backup::result_error::WithMsg;
use crate::backup::validate::validate_non_empty_path;

use bon::Builder;
use derive_more::{Deref, Display};
use getset::Getters;
use regex::Regex;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use validator::Validate;

use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::result;
use std::str::FromStr;

/// A directory to back up and the rules selecting files inside it.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct Target {
    #[validate(custom(function = validate_non_empty_path))]
    #[builder(into)]
    path: PathBuf,
    #[serde(default = "default_catch_regex")]
    #[builder(default = default_catch_regex(), into)]
    catch_regex: FullMatchRegex,
    #[serde(default = "default_ignore_regex")]
    #[builder(default = default_ignore_regex(), into)]
    ignore_regex: FullMatchRegex,
    #[serde(default)]
    #[builder(default)]
    catch_hidden: bool,
    #[serde(default)]
    #[builder(default)]
    catch_link: bool,
    #[serde(default = "default_recursive")]
    #[builder(default = true)]
    recursive: bool,
}

/// Parses the JSON form given on the command line.
impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        serde_json::from_str(s)
            .map_err(Error::from)
            .with_msg(format!("Invalid target JSON {s:?}"))
    }
}

fn default_catch_regex() -> FullMatchRegex {
    FullMatchRegex::new(".*").unwrap()
}

fn default_ignore_regex() -> FullMatchRegex {
    FullMatchRegex::new("").unwrap()
}

fn default_recursive() -> bool {
    true
}

/// A regex that only accepts a match spanning the whole input.
///
/// Keeps the pattern as written for display and serialization.
#[derive(Clone, Display, Deref)]
#[display("{source}")]
pub struct FullMatchRegex {
    source: String,
    #[deref]
    regex: Regex,
}

impl FullMatchRegex {
    pub fn new<S: Into<String>>(pattern: S) -> result::Result<Self, regex::Error> {
        let source = pattern.into();
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(FullMatchRegex { source, regex })
    }

    pub fn full_match<S: AsRef<str>>(&self, text: S) -> bool {
        self.regex.is_match(text.as_ref())
    }

    pub fn as_source(&self) -> &str {
        &self.source
    }
}

impl Debug for FullMatchRegex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

impl TryFrom<&str> for FullMatchRegex {
    type Error = regex::Error;

    fn try_from(value: &str) -> result::Result<Self, Self::Error> {
        FullMatchRegex::new(value)
    }
}

impl Serialize for FullMatchRegex {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

struct FullMatchRegexVisitor;

impl Visitor<'_> for FullMatchRegexVisitor {
    type Value = FullMatchRegex;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a regular expression")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        FullMatchRegex::new(v).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for FullMatchRegex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(FullMatchRegexVisitor)
    }
}
