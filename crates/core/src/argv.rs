//! Argument vector construction for program invocations.
//!
//! Flags are `&'static str` so they can only come from the catalog, never
//! from call arguments. Caller-supplied values are pushed as standalone
//! tokens and are never concatenated with a flag or with each other,
//! except for [`ArgvBuilder::joined`] which combines the items of one
//! already validated array.

use crate::types::ArgToken;

#[derive(Debug, Default, Clone)]
pub struct ArgvBuilder {
    tokens: Vec<ArgToken>,
}

impl ArgvBuilder {
    /// Start with literal leading tokens, e.g. `["issue", "list"]`.
    pub fn new(command: &[&'static str]) -> Self {
        Self {
            tokens: command
                .iter()
                .map(|t| ArgToken::Value((*t).to_string()))
                .collect(),
        }
    }

    /// A positional value.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.tokens.push(ArgToken::Value(value.into()));
        self
    }

    pub fn opt_arg(self, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.arg(value),
            None => self,
        }
    }

    /// A literal flag with no value.
    pub fn flag(mut self, flag: &'static str) -> Self {
        self.tokens.push(ArgToken::Value(flag.to_string()));
        self
    }

    /// A presence flag, emitted only when `enabled`.
    pub fn switch(self, flag: &'static str, enabled: bool) -> Self {
        if enabled {
            self.flag(flag)
        } else {
            self
        }
    }

    /// `flag` followed by `value` as two tokens.
    pub fn value(self, flag: &'static str, value: impl Into<String>) -> Self {
        self.flag(flag).arg(value)
    }

    pub fn opt_value(self, flag: &'static str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.value(flag, value),
            None => self,
        }
    }

    /// `flag` followed by `value`, or the literal `fallback` flag when the value is absent.
    pub fn value_or_flag(
        self,
        flag: &'static str,
        value: Option<impl Into<String>>,
        fallback: &'static str,
    ) -> Self {
        match value {
            Some(value) => self.value(flag, value),
            None => self.flag(fallback),
        }
    }

    /// `flag` followed by the items joined with `delimiter` as one token.
    /// Nothing is emitted for an empty list.
    pub fn joined(self, flag: &'static str, items: &[String], delimiter: char) -> Self {
        if items.is_empty() {
            return self;
        }
        let mut buf = String::new();
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                buf.push(delimiter);
            }
            buf.push_str(item);
        }
        self.value(flag, buf)
    }

    /// Emit the flag mapped to `selected` in `table`, or `default` when
    /// nothing was selected or the selection is not in the table.
    pub fn choice(
        self,
        selected: Option<&str>,
        table: &[(&str, &'static str)],
        default: &'static str,
    ) -> Self {
        let flag = selected
            .and_then(|s| table.iter().find(|(key, _)| *key == s))
            .map(|(_, flag)| *flag)
            .unwrap_or(default);
        self.flag(flag)
    }

    /// `--`: later tokens are positional even if they start with `-`.
    pub fn end_of_flags(self) -> Self {
        self.flag("--")
    }

    /// Placeholder for the scratch file path.
    pub fn scratch_path(mut self) -> Self {
        self.tokens.push(ArgToken::ScratchPath);
        self
    }

    pub fn build(self) -> Vec<ArgToken> {
        self.tokens
    }
}
