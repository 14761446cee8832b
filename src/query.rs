//! # Boolean Query Compiler Module
//!
//! ## Purpose
//! Parses free-text queries with `AND`/`OR` operators and parentheses into
//! disjunctive normal form and compiles the result into line-scoped regex
//! patterns for the line matchers.
//!
//! ## Input/Output Specification
//! - **Input**: Raw query strings (Unicode, case-insensitive operators)
//! - **Output**: DNF as a list of conjunctions plus a `used_boolean` flag;
//!   lookahead-regex and alternation pattern strings
//! - **Grammar**: `expr := term (OR term)*`,
//!   `term := factor (AND? factor)*`, `factor := '(' expr ')' | TERM`
//!
//! ## Key Features
//! - Adjacent terms combine as an implicit AND, so multi-word phrases inside
//!   parentheses distribute correctly
//! - NOT is unsupported; orphan operators and unmatched parentheses are
//!   consumed defensively so malformed queries degrade to weaker matches
//!   instead of failing
//! - AND distributes over OR with first-seen order, duplicates removed per
//!   conjunction

use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// OR-of-ANDs query form: each inner vector is one conjunction of terms
pub type Dnf = Vec<Vec<String>>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Term(String),
}

/// Tokenize a query into parens, word-bounded operators, and Unicode terms
fn tokenize(query: &str) -> Vec<Token> {
    let normalized: String = query.nfc().collect();
    let mut tokens = Vec::new();
    for run in normalized.split_whitespace() {
        let mut rest = run;
        while !rest.is_empty() {
            if let Some(stripped) = rest.strip_prefix('(') {
                tokens.push(Token::Open);
                rest = stripped;
                continue;
            }
            if let Some(stripped) = rest.strip_prefix(')') {
                tokens.push(Token::Close);
                rest = stripped;
                continue;
            }
            let end = rest.find(['(', ')']).unwrap_or(rest.len());
            let word = &rest[..end];
            rest = &rest[end..];
            if word.eq_ignore_ascii_case("AND") {
                tokens.push(Token::And);
            } else if word.eq_ignore_ascii_case("OR") {
                tokens.push(Token::Or);
            } else {
                tokens.push(Token::Term(word.to_string()));
            }
        }
    }
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expr(&mut self) -> Dnf {
        let mut dnf = self.parse_term();
        while matches!(self.peek(), Some(Token::Or)) {
            self.consume();
            let rhs = self.parse_term();
            dnf.extend(rhs);
        }
        dnf
    }

    fn parse_term(&mut self) -> Dnf {
        let mut factors = self.parse_factor();
        loop {
            let explicit = matches!(self.peek(), Some(Token::And));
            let implicit = matches!(self.peek(), Some(Token::Term(_)) | Some(Token::Open));
            if !explicit && !implicit {
                break;
            }
            if explicit {
                self.consume();
            }
            let rhs = self.parse_factor();
            // distribute AND over existing conjunctions
            let mut combined = Dnf::new();
            for left in &factors {
                for right in &rhs {
                    combined.push(union_dedup(left, right));
                }
            }
            factors = combined;
        }
        factors
    }

    fn parse_factor(&mut self) -> Dnf {
        match self.peek() {
            None => vec![vec![]],
            Some(Token::Open) => {
                self.consume();
                let inner = self.parse_expr();
                if matches!(self.peek(), Some(Token::Close)) {
                    self.consume();
                }
                inner
            }
            Some(Token::Term(_)) => {
                if let Some(Token::Term(term)) = self.consume() {
                    vec![vec![term]]
                } else {
                    vec![vec![]]
                }
            }
            // orphan operator: skip it and carry on with an empty factor
            Some(_) => {
                self.consume();
                vec![vec![]]
            }
        }
    }
}

/// Merge two conjunctions, preserving first-seen order and dropping duplicates
fn union_dedup(left: &[String], right: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(left.len() + right.len());
    for term in left.iter().chain(right.iter()) {
        if seen.insert(term.clone()) {
            merged.push(term.clone());
        }
    }
    merged
}

/// Parse a boolean query with AND/OR and parentheses into DNF.
///
/// Returns `(used_boolean, dnf)`. `used_boolean` is true iff any operator or
/// parenthesis appeared in the raw token stream, letting callers decide how
/// to treat plain multi-word queries. NOT is not supported.
pub fn parse_to_dnf(query: &str) -> (bool, Dnf) {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return (false, Vec::new());
    }
    let used_boolean = tokens
        .iter()
        .any(|t| !matches!(t, Token::Term(_)));
    let mut parser = Parser { tokens, pos: 0 };
    let dnf = parser.parse_expr();
    let dnf: Dnf = dnf.into_iter().filter(|conj| !conj.is_empty()).collect();
    (used_boolean, dnf)
}

/// Compile DNF into a single line-scoped regex alternation.
///
/// Each conjunction becomes a chain of lookahead assertions
/// `(?=.*t1)(?=.*t2)....*` so one pass can test "all terms anywhere in the
/// line"; conjunctions are joined with `|`. Lookaheads require a PCRE-capable
/// matcher; the native matcher evaluates the DNF term sets directly instead.
pub fn dnf_to_line_regex(dnf: &Dnf, raw_regex: bool) -> String {
    let mut alternatives = Vec::with_capacity(dnf.len());
    for conj in dnf {
        let mut pattern = String::new();
        for term in conj {
            let escaped = if raw_regex {
                term.clone()
            } else {
                regex::escape(term)
            };
            pattern.push_str("(?=.*");
            pattern.push_str(&escaped);
            pattern.push(')');
        }
        pattern.push_str(".*");
        alternatives.push(pattern);
    }
    alternatives.join("|")
}

/// Convenience path for explicit `" OR "` queries: split on the
/// case-insensitive keyword and build a plain regex alternation of the
/// escaped parts. Returns `None` when the query carries no `OR` keyword.
pub fn or_alternation(query: &str) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in query.split_whitespace() {
        if word.eq_ignore_ascii_case("OR") {
            if !current.is_empty() {
                parts.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(word);
        }
    }
    if !current.is_empty() {
        parts.push(current.join(" "));
    }
    if parts.len() < 2 {
        return None;
    }
    Some(
        parts
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_query_is_not_boolean() {
        let (used, dnf) = parse_to_dnf("Kündigungsfrist");
        assert!(!used);
        assert_eq!(dnf, vec![vec!["Kündigungsfrist".to_string()]]);
    }

    #[test]
    fn test_and_over_or_distribution() {
        let (used, dnf) = parse_to_dnf("(BGB OR Bürgerliches Gesetzbuch) AND Kündigung");
        assert!(used);
        assert_eq!(
            dnf,
            vec![
                vec!["BGB".to_string(), "Kündigung".to_string()],
                vec![
                    "Bürgerliches".to_string(),
                    "Gesetzbuch".to_string(),
                    "Kündigung".to_string()
                ],
            ]
        );
    }

    #[test]
    fn test_duplicate_terms_deduplicated() {
        let (_, dnf) = parse_to_dnf("Miete AND Miete");
        assert_eq!(dnf, vec![vec!["Miete".to_string()]]);
    }

    #[test]
    fn test_orphan_operators_degrade() {
        let (used, dnf) = parse_to_dnf("OR Kündigung AND");
        assert!(used);
        assert_eq!(dnf, vec![vec!["Kündigung".to_string()]]);
    }

    #[test]
    fn test_unmatched_paren_degrades() {
        let (used, dnf) = parse_to_dnf("(BGB AND Miete");
        assert!(used);
        assert_eq!(dnf, vec![vec!["BGB".to_string(), "Miete".to_string()]]);
    }

    #[test]
    fn test_lowercase_operators_recognized() {
        let (used, dnf) = parse_to_dnf("BGB and Miete");
        assert!(used);
        assert_eq!(dnf, vec![vec!["BGB".to_string(), "Miete".to_string()]]);
    }

    #[test]
    fn test_empty_query() {
        let (used, dnf) = parse_to_dnf("   ");
        assert!(!used);
        assert!(dnf.is_empty());
    }

    #[test]
    fn test_dnf_to_line_regex_escapes_terms() {
        let dnf = vec![vec!["§ 573".to_string(), "BGB".to_string()]];
        let pattern = dnf_to_line_regex(&dnf, false);
        assert_eq!(pattern, "(?=.*§ 573)(?=.*BGB).*");
    }

    #[test]
    fn test_or_alternation() {
        assert_eq!(
            or_alternation("Bürgerliches Gesetzbuch OR BGB").as_deref(),
            Some("Bürgerliches Gesetzbuch|BGB")
        );
        assert!(or_alternation("Kündigung").is_none());
    }
}
