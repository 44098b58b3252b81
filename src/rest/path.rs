use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Token {
    Literal(String),
    Variable(String),
}

/// One `/`-separated element, e.g. `items` or `{a}-{b}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Element {
    tokens: Vec<Token>,
}

impl Element {
    fn parse(s: &str, path: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut rest = s;
        while !rest.is_empty() {
            match rest.find('{') {
                Some(0) => {
                    let end = rest.find('}').ok_or_else(|| {
                        SearchError::InvalidTemplate(format!("unclosed variable in path {}", path))
                    })?;
                    let name = &rest[1..end];
                    if name.trim().is_empty() {
                        return Err(SearchError::InvalidTemplate(format!(
                            "empty variable name in path {}",
                            path
                        )));
                    }
                    tokens.push(Token::Variable(name.to_string()));
                    rest = &rest[end + 1..];
                }
                Some(start) => {
                    tokens.push(Token::Literal(rest[..start].to_string()));
                    rest = &rest[start..];
                }
                None => {
                    if rest.contains('}') {
                        return Err(SearchError::InvalidTemplate(format!(
                            "unbalanced brace in path {}",
                            path
                        )));
                    }
                    tokens.push(Token::Literal(rest.to_string()));
                    rest = "";
                }
            }
        }
        Ok(Self { tokens })
    }

    fn is_parameter(&self) -> bool {
        self.tokens.iter().any(|t| matches!(t, Token::Variable(_)))
    }

    /// Same literals at the same places; variables match any variable
    fn is_equivalent(&self, other: &Element) -> bool {
        self.tokens.len() == other.tokens.len()
            && self.tokens.iter().zip(other.tokens.iter()).all(|(a, b)| match (a, b) {
                (Token::Literal(x), Token::Literal(y)) => x == y,
                (Token::Variable(_), Token::Variable(_)) => true,
                _ => false,
            })
    }

    fn render(&self) -> String {
        self.tokens
            .iter()
            .map(|t| match t {
                Token::Literal(s) => s.clone(),
                Token::Variable(v) => format!("{{{}}}", v),
            })
            .collect()
    }
}

/// Endpoint path such as `/items/{id}/tags`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestPath {
    elements: Vec<Element>,
}

impl RestPath {
    pub fn new(path: &str) -> Result<Self> {
        let elements = path
            .split('/')
            .filter(|e| !e.is_empty())
            .map(|e| Element::parse(e, path))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { elements })
    }

    /// Number of elements; `/` has 0
    pub fn levels(&self) -> usize {
        self.elements.len()
    }

    pub fn is_root(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is_last_element_a_parameter(&self) -> bool {
        self.elements.last().map(|e| e.is_parameter()).unwrap_or(false)
    }

    pub fn has_variable_path_parameters(&self) -> bool {
        self.elements.iter().any(|e| e.is_parameter())
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.elements
            .iter()
            .flat_map(|e| e.tokens.iter())
            .filter_map(|t| match t {
                Token::Variable(v) => Some(v.clone()),
                Token::Literal(_) => None,
            })
            .collect()
    }

    pub fn last_element(&self) -> String {
        self.elements.last().map(|e| e.render()).unwrap_or_default()
    }

    /// Same shape, regardless of variable names
    pub fn is_equivalent(&self, other: &RestPath) -> bool {
        self.elements.len() == other.elements.len()
            && self
                .elements
                .iter()
                .zip(other.elements.iter())
                .all(|(a, b)| a.is_equivalent(b))
    }

    /// True if this path is a prefix of `other` (equivalent paths included)
    pub fn is_ancestor_of(&self, other: &RestPath) -> bool {
        self.elements.len() <= other.elements.len()
            && self
                .elements
                .iter()
                .zip(other.elements.iter())
                .all(|(a, b)| a.is_equivalent(b))
    }

    /// Concrete path with variables replaced by `values`; unknown variables
    /// are left as they are
    pub fn resolve(&self, values: &HashMap<String, String>) -> String {
        let mut out = String::new();
        for e in &self.elements {
            out.push('/');
            for t in &e.tokens {
                match t {
                    Token::Literal(s) => out.push_str(s),
                    Token::Variable(v) => match values.get(v) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(v);
                            out.push('}');
                        }
                    },
                }
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }
}

impl std::fmt::Display for RestPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.elements.is_empty() {
            return write!(f, "/");
        }
        for e in &self.elements {
            write!(f, "/{}", e.render())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> RestPath {
        RestPath::new(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let p = path("/items/{id}/tags/{a}-{b}");
        assert_eq!(p.levels(), 4);
        assert_eq!(p.to_string(), "/items/{id}/tags/{a}-{b}");
        assert_eq!(p.variable_names(), vec!["id", "a", "b"]);
        assert!(p.is_last_element_a_parameter());
        assert_eq!(p.last_element(), "{a}-{b}");
        assert_eq!(path("/").to_string(), "/");
    }

    #[test]
    fn test_invalid_paths() {
        assert!(RestPath::new("/items/{id").is_err());
        assert!(RestPath::new("/items/id}").is_err());
        assert!(RestPath::new("/items/{}").is_err());
    }

    #[test]
    fn test_equivalence_ignores_variable_names() {
        assert!(path("/x/{id}").is_equivalent(&path("/x/{other}")));
        assert!(!path("/x/{id}").is_equivalent(&path("/x/y")));
        assert!(!path("/x").is_equivalent(&path("/x/{id}")));
    }

    #[test]
    fn test_ancestor() {
        assert!(path("/elements").is_ancestor_of(&path("/elements/{id}")));
        assert!(path("/x/{id}").is_ancestor_of(&path("/x/{id}")));
        assert!(!path("/elements/{id}").is_ancestor_of(&path("/elements")));
        assert!(!path("/other").is_ancestor_of(&path("/elements/{id}")));
        assert!(path("/").is_ancestor_of(&path("/a")));
    }

    #[test]
    fn test_resolve() {
        let mut values = HashMap::new();
        values.insert("id".to_string(), "42".to_string());
        assert_eq!(path("/x/{id}/{y}").resolve(&values), "/x/42/{y}");
    }
}
