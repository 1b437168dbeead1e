//! `{{ name }}` substitution in command lines

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Replace `{{ name }}` placeholders with job variables
///
/// Unknown placeholders are left verbatim. Shell-native references such as
/// `%PYTHON%` or `$PYTHON` are not touched; the shell expands those from the
/// job environment.
pub fn render(line: &str, variables: &HashMap<String, String>) -> String {
    placeholder()
        .replace_all(line, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Placeholder names used in a line
pub fn placeholders(line: &str) -> Vec<String> {
    placeholder()
        .captures_iter(line)
        .map(|caps| caps[1].to_string())
        .collect()
}
