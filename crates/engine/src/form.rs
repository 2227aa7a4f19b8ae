//! The query form's fields and the parameter list parser.

use serde::Deserialize;
use sqlpad_executor::Param;

/// Parameters are separated by a comma followed by one space.
const PARAM_SEPARATOR: &str = ", ";
const QUOTES: [char; 2] = ['"', '\''];

#[derive(Debug, Default, Clone, Deserialize)]
pub struct QueryForm {
    #[serde(rename = "query-input")]
    pub query: Option<String>,
    #[serde(rename = "db-input")]
    pub db: Option<String>,
    #[serde(rename = "params-input")]
    pub params: Option<String>,
    #[serde(rename = "commit-input")]
    pub commit: Option<String>,
}

/// Split the raw `params-input` text into positional parameters.
///
/// A token of ASCII digits becomes [`Param::Int`]. Anything else, including
/// digits wrapped in quotes or too large for `i64`, becomes [`Param::Text`]
/// with surrounding quote characters removed. An empty field means no parameters.
pub fn parse_params(input: Option<&str>) -> Vec<Param> {
    match input {
        None | Some("") => Vec::new(),
        Some(raw) => raw.split(PARAM_SEPARATOR).map(classify).collect(),
    }
}

fn classify(token: &str) -> Param {
    let token = token.trim();
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = token.parse::<i64>() {
            return Param::Int(i);
        }
    }
    Param::Text(token.trim_matches(QUOTES).to_string())
}
