//! Expansion selectors
//!
//! ```text
//! relationships=2                               depth
//! relationships=author,categories.parent        dotted paths
//! relationships={ title author { name } }       graph
//! ```

use std::fmt;

/// Which relationships a read expands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipSelector {
    /// Every relationship, recursively, up to N levels
    Depth(usize),
    /// Explicit dotted relationship paths
    Paths(Vec<String>),
    Graph(GraphSelector),
}

impl RelationshipSelector {
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("empty relationship selector".to_string());
        }
        if input.starts_with('{') {
            return GraphSelector::parse(input).map(Self::Graph);
        }
        if input.bytes().all(|b| b.is_ascii_digit()) {
            return input.parse().map(Self::Depth).map_err(|e| format!("invalid depth {}: {}", input, e));
        }

        let paths: Vec<String> =
            input.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string).collect();
        if let Some(bad) = paths.iter().find(|p| p.split('.').any(|segment| !is_name(segment))) {
            return Err(format!("invalid relationship path {:?}", bad));
        }
        Ok(Self::Paths(paths))
    }
}

/// Nested shape naming the fields and relationships to return at each level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSelector {
    /// Plain fields; when non-empty, documents at this level are projected
    pub fields: Vec<String>,
    pub relations: Vec<(String, GraphSelector)>,
}

impl GraphSelector {
    pub fn parse(input: &str) -> Result<Self, String> {
        let tokens = tokenize(input)?;
        let mut pos = 0;
        expect_open(&tokens, &mut pos)?;
        let selector = parse_level(&tokens, &mut pos)?;
        if pos != tokens.len() {
            return Err(format!("unexpected {} after graph selector", tokens[pos]));
        }
        Ok(selector)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.relations.is_empty()
    }

    pub fn relation(&self, name: &str) -> Option<&GraphSelector> {
        self.relations.iter().find(|(n, _)| n == name).map(|(_, g)| g)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Name(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Open => write!(f, "'{{'"),
            Token::Close => write!(f, "'}}'"),
            Token::Name(name) => write!(f, "{:?}", name),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '$'
}

fn is_name(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(is_name_char)
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        match c {
            '{' => tokens.push(Token::Open),
            '}' => tokens.push(Token::Close),
            c if c.is_whitespace() || c == ',' => {}
            c if is_name_char(c) => {
                let mut name = c.to_string();
                while let Some(&(_, next)) = chars.peek() {
                    if !is_name_char(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                tokens.push(Token::Name(name));
            }
            other => return Err(format!("unexpected {:?} at {}", other, at)),
        }
    }
    Ok(tokens)
}

fn expect_open(tokens: &[Token], pos: &mut usize) -> Result<(), String> {
    match tokens.get(*pos) {
        Some(Token::Open) => {
            *pos += 1;
            Ok(())
        }
        Some(other) => Err(format!("expected '{{', found {}", other)),
        None => Err("expected '{'".to_string()),
    }
}

/// Parse names up to and including the closing brace of the current level
fn parse_level(tokens: &[Token], pos: &mut usize) -> Result<GraphSelector, String> {
    let mut level = GraphSelector::default();
    loop {
        match tokens.get(*pos) {
            Some(Token::Close) => {
                *pos += 1;
                return Ok(level);
            }
            Some(Token::Name(name)) => {
                *pos += 1;
                if tokens.get(*pos) == Some(&Token::Open) {
                    *pos += 1;
                    let nested = parse_level(tokens, pos)?;
                    level.relations.push((name.clone(), nested));
                } else if !level.fields.contains(name) {
                    level.fields.push(name.clone());
                }
            }
            Some(Token::Open) => return Err("'{' must follow a relationship name".to_string()),
            None => return Err("unterminated graph selector".to_string()),
        }
    }
}
