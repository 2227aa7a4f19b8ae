use crate::parser::{Block, Parser};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Where a tag's content starts in the page, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("{at}: unknown statement `{text}`")]
    UnknownStatement { at: Position, text: String },

    #[error("{at}: invalid path `{text}`")]
    InvalidPath { at: Position, text: String },

    #[error("{at}: block opened here is never closed")]
    Unclosed { at: Position },

    #[error("{at}: `}}` without a matching opening block")]
    UnexpectedClose { at: Position },

    #[error("{at}: `else` outside of an `if` block")]
    UnexpectedElse { at: Position },
}

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("{at}: `{path}` is not an array")]
    NotIterable { at: Position, path: String },
}

#[derive(Debug, Clone, PartialEq)]
struct Path(Vec<String>);

impl Path {
    fn parse(text: &str, at: Position) -> Result<Self, ParseError> {
        let text = text.trim();
        let segments: Vec<String> = text.split('.').map(str::to_string).collect();
        let valid = segments.iter().all(|s| {
            !s.is_empty()
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
        if !valid {
            return Err(ParseError::InvalidPath {
                at,
                text: text.to_string(),
            });
        }
        Ok(Self(segments))
    }

    fn display(&self) -> String {
        self.0.join(".")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Value(Path),
    If {
        path: Path,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    For {
        binding: String,
        path: Path,
        body: Vec<Node>,
        at: Position,
    },
}

enum Statement {
    If(Path),
    For(String, Path),
    Else,
    Close,
}

impl Statement {
    fn parse(text: &str, at: Position) -> Result<Self, ParseError> {
        let text = text.trim();
        let unknown = || ParseError::UnknownStatement {
            at,
            text: text.to_string(),
        };

        if text == "}" {
            return Ok(Statement::Close);
        }
        if let Some(rest) = text.strip_prefix('}') {
            return match rest.trim() {
                "else {" => Ok(Statement::Else),
                _ => Err(unknown()),
            };
        }

        let head = text.strip_suffix('{').ok_or_else(unknown)?.trim_end();
        if let Some(cond) = head.strip_prefix("if ") {
            return Ok(Statement::If(Path::parse(cond, at)?));
        }
        if let Some(rest) = head.strip_prefix("for ") {
            let (binding, source) = rest.split_once(" in ").ok_or_else(unknown)?;
            let binding = binding.trim();
            if binding.is_empty() || binding.contains('.') {
                return Err(unknown());
            }
            return Ok(Statement::For(binding.to_string(), Path::parse(source, at)?));
        }
        Err(unknown())
    }
}

#[derive(PartialEq)]
enum Terminator {
    Eof,
    Close,
    Else,
}

/// A compiled page. Compile once and render per request.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn compile(source: &str) -> Result<Self, ParseError> {
        let blocks = Parser::new(source).parse().blocks;
        let mut iter = blocks.into_iter();
        let (nodes, _) = compile_nodes(&mut iter, 0)?;
        Ok(Self { nodes })
    }

    pub fn render(&self, context: &Value) -> Result<String, RenderError> {
        let mut out = String::new();
        let mut scopes: Vec<(&str, &Value)> = Vec::new();
        render_nodes(&self.nodes, context, &mut scopes, &mut out)?;
        Ok(out)
    }
}

fn compile_nodes<I>(iter: &mut I, depth: usize) -> Result<(Vec<Node>, Terminator), ParseError>
where
    I: Iterator<Item = Block>,
{
    let mut nodes = Vec::new();
    while let Some(block) = iter.next() {
        let at = Position {
            line: block.content().lineno,
            column: block.content().colno,
        };
        let c = match block {
            Block::Html(c) => {
                nodes.push(Node::Text(c.content));
                continue;
            }
            Block::Expression(c) => {
                nodes.push(Node::Value(Path::parse(&c.content, at)?));
                continue;
            }
            Block::Statement(c) => c,
        };
        match Statement::parse(&c.content, at)? {
            Statement::If(path) => {
                let (then, term) = compile_nodes(iter, depth + 1)?;
                let otherwise = match term {
                    Terminator::Close => Vec::new(),
                    Terminator::Else => {
                        let (otherwise, term) = compile_nodes(iter, depth + 1)?;
                        if term != Terminator::Close {
                            return Err(ParseError::Unclosed { at });
                        }
                        otherwise
                    }
                    Terminator::Eof => return Err(ParseError::Unclosed { at }),
                };
                nodes.push(Node::If {
                    path,
                    then,
                    otherwise,
                });
            }
            Statement::For(binding, path) => {
                let (body, term) = compile_nodes(iter, depth + 1)?;
                match term {
                    Terminator::Close => {}
                    Terminator::Else => return Err(ParseError::UnexpectedElse { at }),
                    Terminator::Eof => return Err(ParseError::Unclosed { at }),
                }
                nodes.push(Node::For {
                    binding,
                    path,
                    body,
                    at,
                });
            }
            Statement::Close if depth > 0 => return Ok((nodes, Terminator::Close)),
            Statement::Close => return Err(ParseError::UnexpectedClose { at }),
            Statement::Else if depth > 0 => return Ok((nodes, Terminator::Else)),
            Statement::Else => return Err(ParseError::UnexpectedElse { at }),
        }
    }
    Ok((nodes, Terminator::Eof))
}

fn lookup<'v>(path: &Path, context: &'v Value, scopes: &[(&str, &'v Value)]) -> Option<&'v Value> {
    let (first, rest) = path.0.split_first()?;
    let mut current = scopes
        .iter()
        .rev()
        .find(|(name, _)| *name == first.as_str())
        .map(|(_, v)| *v)
        .or_else(|| context.get(first.as_str()))?;
    for segment in rest {
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            other => other.get(segment.as_str())?,
        };
    }
    Some(current)
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

fn render_nodes<'v>(
    nodes: &'v [Node],
    context: &'v Value,
    scopes: &mut Vec<(&'v str, &'v Value)>,
    out: &mut String,
) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Value(path) => match lookup(path, context, scopes) {
                None => {}
                Some(Value::Null) => out.push_str("NULL"),
                Some(Value::String(s)) => push_escaped(out, s),
                Some(other) => push_escaped(out, &other.to_string()),
            },
            Node::If {
                path,
                then,
                otherwise,
            } => {
                let branch = if truthy(lookup(path, context, scopes)) {
                    then
                } else {
                    otherwise
                };
                render_nodes(branch, context, scopes, out)?;
            }
            Node::For {
                binding,
                path,
                body,
                at,
            } => {
                let items = match lookup(path, context, scopes) {
                    None | Some(Value::Null) => continue,
                    Some(Value::Array(items)) => items,
                    Some(_) => {
                        return Err(RenderError::NotIterable {
                            at: *at,
                            path: path.display(),
                        });
                    }
                };
                for item in items {
                    scopes.push((binding.as_str(), item));
                    let res = render_nodes(body, context, scopes, out);
                    scopes.pop();
                    res?;
                }
            }
        }
    }
    Ok(())
}
