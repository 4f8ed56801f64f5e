//! Query-string builders for the list and mapping convenience forms
//!
//! Raw builders splice terms into query syntax unchanged, so a term holding
//! `AND`, `OR` or `field:` changes the meaning of the query. Callers that
//! pass user input should opt into `Escaping::Quoted`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Boolean operator joining a list of terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl fmt::Display for BoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolOp::And => f.write_str("AND"),
            BoolOp::Or => f.write_str("OR"),
        }
    }
}

/// How terms are spliced into a query string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escaping {
    /// Terms are query syntax
    #[default]
    Raw,
    /// Each term becomes a quoted phrase
    Quoted,
}

fn quote_breakers() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["\\]+"#).expect("valid regex"))
}

/// Quote `term` as a phrase; `"` and `\` are replaced by spaces
pub fn quote_term(term: &str) -> String {
    let cleaned = quote_breakers().replace_all(term, " ");
    format!("\"{}\"", cleaned.trim())
}

/// Join `terms` with `op`
pub fn list_to_query<S: AsRef<str>>(terms: &[S], op: BoolOp, escaping: Escaping) -> String {
    let separator = format!(" {} ", op);
    terms
        .iter()
        .map(|term| match escaping {
            Escaping::Raw => term.as_ref().to_string(),
            Escaping::Quoted => quote_term(term.as_ref()),
        })
        .collect::<Vec<_>>()
        .join(&separator)
}

/// Render `field:value` clauses for every pair with a non-empty value.
///
/// Returns the surviving fields in input order and the space-joined clauses.
pub fn dict_to_query<I, K, V>(pairs: I) -> (Vec<String>, String)
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut fields = Vec::new();
    let mut clauses = Vec::new();

    for (key, value) in pairs {
        let Some(value) = value else { continue };
        let value = value.as_ref();
        if value.is_empty() {
            continue;
        }
        fields.push(key.as_ref().to_string());
        clauses.push(format!("{}:{}", key.as_ref(), value));
    }

    (fields, clauses.join(" "))
}
