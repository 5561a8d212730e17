//! Interpolation environment
//!
//! Expands `${VAR}` and `${VAR:default}` references in raw configuration
//! text before it is parsed. Lookups fall back to the process environment;
//! explicit overrides take precedence, which also keeps tests hermetic.

use std::collections::HashMap;

use sluice_component::{Error, Result};

/// Variable lookup environment for config interpolation
#[derive(Debug, Clone, Default)]
pub struct Environment {
    overrides: HashMap<String, String>,
}

impl Environment {
    /// Create an environment backed by the process environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override that shadows the process environment
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.overrides
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    /// Expand every `${VAR}` / `${VAR:default}` reference in `input`
    ///
    /// A reference to an unset variable without a default is an error; an
    /// unterminated reference is an error.
    pub fn interpolate(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| Error::other("unterminated ${ in configuration"))?;
            let reference = &after[..end];

            let (name, default) = match reference.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (reference, None),
            };

            match self.lookup(name) {
                Some(value) => out.push_str(&value),
                None => match default {
                    Some(default) => out.push_str(default),
                    None => {
                        return Err(Error::other(format!(
                            "environment variable '{name}' is not set"
                        )))
                    }
                },
            }

            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}
