use serde_json::{Map, Value};
use toolbridge_core::{BridgeError, ValidatedArgs, ValidationRule};

/// Required string that will be used as a positional argument. A leading
/// `-` would be read as a flag by the program, so it is rejected.
pub fn positional<'a>(args: &'a ValidatedArgs, name: &str) -> Result<&'a str, BridgeError> {
    let value = args.require_str(name)?;
    check_not_flag(name, value)?;
    Ok(value)
}

pub fn opt_positional<'a>(
    args: &'a ValidatedArgs,
    name: &str,
) -> Result<Option<&'a str>, BridgeError> {
    match args.str(name) {
        Some(value) => check_not_flag(name, value).map(|_| Some(value)),
        None => Ok(None),
    }
}

fn check_not_flag(name: &str, value: &str) -> Result<(), BridgeError> {
    if value.starts_with('-') {
        return Err(BridgeError::validation(
            name,
            ValidationRule::BadFormat {
                expected: "a value that does not start with '-'",
                found: value.to_string(),
            },
        ));
    }
    Ok(())
}

/// `owner/name` with the characters GitHub allows in each part.
pub fn repo_slug<'a>(args: &'a ValidatedArgs, name: &str) -> Result<&'a str, BridgeError> {
    let value = args.require_str(name)?;
    let valid = value.split_once('/').is_some_and(|(owner, repo)| {
        slug_part(owner) && slug_part(repo)
    });
    if !valid {
        return Err(BridgeError::validation(
            name,
            ValidationRule::BadFormat {
                expected: "in owner/repo form",
                found: value.to_string(),
            },
        ));
    }
    Ok(value)
}

fn slug_part(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && !part.starts_with('-')
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Login names: ASCII alphanumerics and inner hyphens.
pub fn login<'a>(args: &'a ValidatedArgs, name: &str) -> Result<Option<&'a str>, BridgeError> {
    let Some(value) = args.str(name) else {
        return Ok(None);
    };
    let valid = !value.starts_with('-')
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(BridgeError::validation(
            name,
            ValidationRule::BadFormat {
                expected: "a GitHub login",
                found: value.to_string(),
            },
        ));
    }
    Ok(Some(value))
}

/// Integer argument rendered as one decimal token.
pub fn number_token(args: &ValidatedArgs, name: &str) -> Result<String, BridgeError> {
    Ok(args.require_i64(name)?.to_string())
}

pub fn limit_token(args: &ValidatedArgs, default: i64) -> String {
    args.i64("limit").unwrap_or(default).to_string()
}

/// Parameter map for a remote operation; `None` values are left out.
#[derive(Debug, Default)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn maybe(self, name: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.set(name, value),
            None => self,
        }
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}
