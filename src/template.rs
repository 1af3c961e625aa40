//! Variable substitution for step configuration
//!
//! Handles `${NAME}` placeholders in configured strings such as the
//! destination path. Names are looked up in an explicit [`Variables`] map
//! first and in the process environment second.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex for matching variables: ${NAME} or ${ NAME }
static VARIABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([a-zA-Z_][a-zA-Z0-9_.]*)\s*\}").unwrap()
});

/// Variable space used for substitution
#[derive(Debug, Clone, Default)]
pub struct Variables {
    vars: HashMap<String, String>,
    use_env: bool,
}

impl Variables {
    /// Create a variable space that falls back to the process environment
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
            use_env: true,
        }
    }

    /// Create a variable space that never consults the environment
    pub fn isolated() -> Self {
        Self::default()
    }

    /// Set a variable
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Parse a `KEY=VALUE` assignment and set it
    pub fn set_assignment(&mut self, assignment: &str) -> Result<&mut Self> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| Error::config(format!("Expected KEY=VALUE, got '{assignment}'")))?;
        if key.trim().is_empty() {
            return Err(Error::config(format!(
                "Empty variable name in '{assignment}'"
            )));
        }
        Ok(self.set(key.trim(), value))
    }

    /// Get a variable by name
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.vars.get(name) {
            return Some(value.clone());
        }
        if self.use_env {
            return std::env::var(name).ok();
        }
        None
    }
}

/// Substitute all `${NAME}` placeholders in `input`
pub fn substitute(input: &str, vars: &Variables) -> Result<String> {
    let mut missing = Vec::new();

    let result = VARIABLE_REGEX.replace_all(input, |cap: &regex::Captures<'_>| {
        let name = &cap[1];
        vars.get(name).unwrap_or_else(|| {
            missing.push(name.to_string());
            String::new()
        })
    });

    if missing.is_empty() {
        Ok(result.into_owned())
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

/// Check if a string contains variables
pub fn has_variables(s: &str) -> bool {
    VARIABLE_REGEX.is_match(s)
}

/// Extract all variable names from a string
pub fn extract_variables(input: &str) -> Vec<String> {
    VARIABLE_REGEX
        .captures_iter(input)
        .map(|cap| cap[1].to_string())
        .collect()
}
