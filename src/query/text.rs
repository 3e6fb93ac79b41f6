//! `$text` search over the fields of a collection's text index.
//!
//! Terms are lower-cased, split on anything that is not alphanumeric and
//! lightly stemmed (a trailing plural `s` is dropped). A document matches
//! when any positive term occurs in an indexed field and no negated term
//! (`-term`) does.

use std::collections::HashMap;

use serde_json::Value;

use crate::app_response::{AppResponse, Result};
use crate::document::path_values;

#[derive(Debug, Clone, PartialEq)]
pub struct TextQuery {
    pub search: String,
    terms: Vec<String>,
    negated: Vec<String>,
    /// Indexed fields; empty until bound to a text index.
    fields: Vec<String>,
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| stem(&token.to_lowercase()))
        .collect()
}

fn stem(token: &str) -> String {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

impl TextQuery {
    pub fn parse(value: &Value) -> Result<TextQuery> {
        let search = value
            .get("$search")
            .and_then(Value::as_str)
            .ok_or_else(|| AppResponse::invalid("$text requires a string $search field"))?;

        let mut terms = Vec::new();
        let mut negated = Vec::new();
        for word in search.split_whitespace() {
            match word.strip_prefix('-') {
                Some(rest) => negated.extend(tokenize(rest)),
                None => terms.extend(tokenize(word)),
            }
        }
        terms.sort();
        terms.dedup();

        Ok(TextQuery {
            search: search.to_string(),
            terms,
            negated,
            fields: Vec::new(),
        })
    }

    pub fn bind(&mut self, fields: &[String]) {
        self.fields = fields.to_vec();
    }

    pub fn is_bound(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Relevance score, or `None` when the document does not match.
    ///
    /// Each indexed field contributes `0.5 + 0.5 * freq / tokens` for every
    /// distinct term it contains, so short fields dense in matches rank
    /// highest.
    pub fn score(&self, doc: &Value) -> Result<Option<f64>> {
        if !self.is_bound() {
            return Err(AppResponse::IndexNotFound(
                "text index required for $text query".to_string(),
            ));
        }

        let mut score = 0.0;
        for field in &self.fields {
            let tokens = field_tokens(doc, field);
            if tokens.is_empty() {
                continue;
            }
            if self.negated.iter().any(|n| tokens.contains(n)) {
                return Ok(None);
            }

            let mut frequencies: HashMap<&str, usize> = HashMap::new();
            for token in &tokens {
                *frequencies.entry(token.as_str()).or_default() += 1;
            }
            for term in &self.terms {
                if let Some(freq) = frequencies.get(term.as_str()) {
                    score += 0.5 + 0.5 * (*freq as f64) / (tokens.len() as f64);
                }
            }
        }

        Ok(if score > 0.0 { Some(score) } else { None })
    }
}

fn field_tokens(doc: &Value, field: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for value in path_values(doc, field) {
        match value {
            Value::String(s) => tokens.extend(tokenize(s)),
            Value::Array(items) => {
                for item in items.iter().filter_map(Value::as_str) {
                    tokens.extend(tokenize(item));
                }
            }
            _ => {}
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bound(search: &str) -> TextQuery {
        let mut query = TextQuery::parse(&json!({"$search": search})).unwrap();
        query.bind(&["name".to_string(), "description".to_string()]);
        query
    }

    #[test]
    fn tokenizer_splits_and_stems() {
        assert_eq!(tokenize("Noise-cancelling Headphones"), vec!["noise", "cancelling", "headphone"]);
        assert_eq!(tokenize("glass"), vec!["glass"]);
    }

    #[test]
    fn unbound_query_needs_an_index() {
        let query = TextQuery::parse(&json!({"$search": "wireless"})).unwrap();
        let err = query.score(&json!({"name": "Wireless Mouse"})).unwrap_err();
        assert!(matches!(err, AppResponse::IndexNotFound(_)));
    }

    #[test]
    fn matching_terms_score_and_misses_do_not() {
        let query = bound("wireless");
        let mouse = json!({"name": "Wireless Mouse", "description": "Ergonomic wireless mouse"});
        let hub = json!({"name": "USB-C Hub", "description": "7-in-1 hub"});
        assert!(query.score(&mouse).unwrap().unwrap() > 1.0);
        assert_eq!(query.score(&hub).unwrap(), None);
    }

    #[test]
    fn negated_terms_exclude() {
        let query = bound("laptop -stand");
        let stand = json!({"name": "Laptop Stand", "description": "Adjustable laptop stand"});
        let laptop = json!({"name": "Laptop Pro 15", "description": "High-performance laptop"});
        assert_eq!(query.score(&stand).unwrap(), None);
        assert!(query.score(&laptop).unwrap().is_some());
    }

    #[test]
    fn repeated_terms_count_once() {
        let mouse = json!({"name": "Wireless Mouse", "description": "Ergonomic wireless mouse"});
        let once = bound("wireless mouse").score(&mouse).unwrap();
        let repeated = bound("wireless mouse wireless").score(&mouse).unwrap();
        assert_eq!(once, repeated);
    }
}
