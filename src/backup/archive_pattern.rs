//! Reverse parsing of archive file names.
//!
//! Archive names embed an strftime-rendered timestamp. To find archive copies
//! again, the datetime format is translated directive by directive into a
//! regex fragment. Textual directives (month and weekday names, AM/PM, zone
//! names, locale formats) can only be matched loosely with `.*`, so a
//! deliberately odd file name can be misparsed.

use crate::backup::found_file::normcase;

use chrono::format::{Item, StrftimeItems};
use chrono::DateTime;

use std::fmt::Write;
use std::path::MAIN_SEPARATOR;

// 2023-01-23 04:56:12.345678 UTC
const SAMPLE_TIMESTAMP: (i64, u32) = (1_674_449_772, 345_678_000);

/// Regex fragment for a single strftime directive character.
pub fn directive_regex(directive: char) -> Option<&'static str> {
    let fragment = match directive {
        'b' | 'B' | 'a' | 'A' | 'p' | 'Z' | 'c' | 'x' | 'X' => ".*",
        'y' => "[0-9]{2}",
        'Y' => "[0-9]{4}",
        'm' => "[01][0-9]",
        'd' => "[0-3][0-9]",
        'H' => "[012][0-9]",
        'I' => "[01][0-9]",
        'M' => "[0-5][0-9]",
        'S' => "[0-5][0-9]",
        'f' => "[0-9]{6}",
        'z' => "(?:|[+-][01][0-9][0-5][0-9])",
        'w' => "[0-6]",
        'j' => "[0-3][0-9][0-9]",
        'U' | 'W' => "[0-5][0-9]",
        '%' => "%",
        _ => return None,
    };
    Some(fragment)
}

/// chrono's spelling of a directive when it differs from C strftime.
fn chrono_directive(directive: char) -> &'static str {
    match directive {
        // microseconds, as C strftime renders them
        'f' => "%6f",
        _ => "",
    }
}

/// Rewrites a C-style datetime format into one chrono renders identically.
pub fn to_chrono_format(datetime_format: &str) -> String {
    let mut result = String::with_capacity(datetime_format.len());
    let mut chars = datetime_format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some(d) => match chrono_directive(d) {
                "" => {
                    result.push('%');
                    result.push(d);
                }
                replacement => result.push_str(replacement),
            },
            None => result.push('%'),
        }
    }
    result
}

/// Translates a datetime format into a regex matching its rendered output.
///
/// Returns the offending directive when the format contains one that has no
/// translation.
pub fn datetime_format_to_regex(datetime_format: &str) -> Result<String, String> {
    let mut result = String::new();
    let mut chars = datetime_format.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let directive = chars
                .next()
                .ok_or_else(|| "trailing '%'".to_owned())?;
            let fragment =
                directive_regex(directive).ok_or_else(|| format!("%{directive}"))?;
            result.push_str(fragment);
        } else {
            result.push_str(&regex::escape(&normcase(c.to_string())));
        }
    }
    Ok(result)
}

/// Checks that the format can be both rendered and reverse parsed.
pub fn check_datetime_format(datetime_format: &str) -> Result<(), String> {
    datetime_format_to_regex(datetime_format)
        .map_err(|d| format!("unsupported directive {d} in datetime_format"))?;
    let chrono_format = to_chrono_format(datetime_format);
    if StrftimeItems::new(&chrono_format).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid datetime_format {datetime_format:?}"));
    }

    let (secs, nanos) = SAMPLE_TIMESTAMP;
    let sample = DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| "sample timestamp out of range".to_owned())?;
    let mut rendered = String::new();
    write!(rendered, "{}", sample.format(&chrono_format))
        .map_err(|_| format!("datetime_format {datetime_format:?} cannot be rendered"))?;
    if rendered.contains(['/', MAIN_SEPARATOR]) {
        return Err(format!(
            "datetime_format {datetime_format:?} renders a path separator ({rendered:?})"
        ));
    }
    Ok(())
}
