//! Minimal reader for `.properties` style key/value files
//!
//! Module search paths and service settings are kept in this format. Supported:
//! `#` and `!` comments, `=`, `:` or whitespace separators, and lines continued
//! with a trailing backslash. Unicode escapes are not interpreted.

use std::collections::BTreeMap;
use std::path::Path;
use crate::Result;

pub type Properties = BTreeMap<String, String>;

/// Parse properties text into a sorted map. Later keys override earlier ones.
pub fn parse(text: &str) -> Properties {
    let mut props = Properties::new();
    let mut pending = String::new();

    for raw in text.lines() {
        let line = raw.trim_start();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        if let Some(stripped) = continued(line) {
            pending.push_str(stripped);
            continue;
        }

        pending.push_str(line);
        insert_entry(&mut props, &pending);
        pending.clear();
    }

    if !pending.is_empty() {
        insert_entry(&mut props, &pending);
    }

    props
}

/// Load and parse a properties file
pub fn load(path: impl AsRef<Path>) -> Result<Properties> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse(&text))
}

// An odd number of trailing backslashes continues the line.
fn continued(line: &str) -> Option<&str> {
    let slashes = line.chars().rev().take_while(|c| *c == '\\').count();
    (slashes % 2 == 1).then(|| &line[..line.len() - 1])
}

fn insert_entry(props: &mut Properties, entry: &str) {
    let entry = entry.trim();
    if entry.is_empty() {
        return;
    }

    let split = entry.find(|c: char| c == '=' || c == ':' || c.is_whitespace());
    let (key, value) = match split {
        Some(idx) => {
            let rest = entry[idx..].trim_start();
            let rest = rest
                .strip_prefix('=')
                .or_else(|| rest.strip_prefix(':'))
                .unwrap_or(rest);
            (&entry[..idx], rest.trim())
        }
        None => (entry, ""),
    };

    props.insert(key.to_string(), value.to_string());
}
