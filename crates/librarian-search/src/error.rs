use librarian_state::StateError;

/// Errors raised while compiling or running a search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The search text or one of its clauses is malformed.
    #[error("{0}")]
    Parse(String),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

pub type SearchResult<T> = Result<T, SearchError>;

impl SearchError {
    pub(crate) fn clause(clause: &str, expected: &str, got: &serde_json::Value) -> Self {
        SearchError::Parse(format!(
            "can't parse \"{clause}\" clause: contents must be {expected}, but got {}",
            json_type_name(got)
        ))
    }
}

/// Name of a JSON value's type, as shown in parse errors.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
