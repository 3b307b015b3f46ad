//! Condition-string evaluation for conditional steps.
//!
//! Conditions substitute `${var}` from the workflow context, then
//! evaluate a small boolean grammar: comparisons (`==`, `!=`, `<`, `<=`,
//! `>`, `>=`), conjunction/disjunction (`&&`, `||`), parentheses,
//! numbers, quoted strings, and bare words. Anything unparseable
//! evaluates to false.

use serde_json::Value;

/// Substitutes `${key}` occurrences with rendered context values.
#[must_use]
pub fn substitute(condition: &str, context: &serde_json::Map<String, Value>) -> String {
    let mut out = condition.to_string();
    for (key, value) in context {
        let needle = format!("${{{key}}}");
        if out.contains(&needle) {
            out = out.replace(&needle, &render(value));
        }
    }
    out
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Evaluates a condition string against workflow context.
///
/// Returns false for malformed input rather than erroring; the
/// conditional step records the boolean either way.
#[must_use]
pub fn evaluate(condition: &str, context: &serde_json::Map<String, Value>) -> bool {
    let substituted = substitute(condition, context);
    let tokens = tokenize(&substituted);
    let mut parser = Parser { tokens, pos: 0 };
    match parser.parse_or() {
        Some(result) if parser.pos == parser.tokens.len() => result,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Op(&'static str),
    Atom(String),
}

fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op("<="));
                    i += 2;
                } else {
                    tokens.push(Token::Op("<"));
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(">="));
                    i += 2;
                } else {
                    tokens.push(Token::Op(">"));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut atom = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    atom.push(chars[i]);
                    i += 1;
                }
                i += 1; // closing quote
                tokens.push(Token::Atom(atom));
            }
            _ => {
                let mut atom = String::new();
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '(' | ')' | '&' | '|' | '=' | '!' | '<' | '>')
                {
                    atom.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Atom(atom));
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

    fn parse_or(&mut self) -> Option<bool> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = left || right;
        }
        Some(left)
    }

    fn parse_and(&mut self) -> Option<bool> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = left && right;
        }
        Some(left)
    }

    fn parse_comparison(&mut self) -> Option<bool> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            if self.peek() != Some(&Token::RParen) {
                return None;
            }
            self.pos += 1;
            return Some(inner);
        }

        let left = self.parse_atom()?;
        let Some(Token::Op(op)) = self.peek().cloned() else {
            return Some(truthy(&left));
        };
        self.pos += 1;
        let right = self.parse_atom()?;
        Some(compare(&left, op, &right))
    }

    fn parse_atom(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Atom(atom)) => {
                let atom = atom.clone();
                self.pos += 1;
                Some(atom)
            }
            _ => None,
        }
    }
}

fn truthy(atom: &str) -> bool {
    match atom {
        "true" => true,
        "false" | "null" | "" => false,
        other if other.contains("${") => false, // unresolved substitution
        other => other.parse::<f64>().map_or(true, |n| n != 0.0),
    }
}

fn compare(left: &str, op: &str, right: &str) -> bool {
    // Numeric comparison when both sides parse; lexical otherwise.
    if let (Ok(l), Ok(r)) = (left.parse::<f64>(), right.parse::<f64>()) {
        return match op {
            "==" => (l - r).abs() < f64::EPSILON,
            "!=" => (l - r).abs() >= f64::EPSILON,
            "<" => l < r,
            "<=" => l <= r,
            ">" => l > r,
            ">=" => l >= r,
            _ => false,
        };
    }
    match op {
        "==" => left == right,
        "!=" => left != right,
        "<" => left < right,
        "<=" => left <= right,
        ">" => left > right,
        ">=" => left >= right,
        _ => false,
    }
}
