//! Minimal CSS selector matching over the scene arena.
//!
//! Supported: `*`, tag, `#id`, `.class`, `[attr]`, `[attr=value]`, descendant (` `) and
//! child (`>`) combinators, and comma-separated lists.

use super::SceneGraph;
use crate::types::NodeId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectorError {
    #[error("Empty selector")]
    Empty,
    #[error("Unexpected character '{ch}' in selector '{selector}'")]
    Unexpected { ch: char, selector: String },
    #[error("Unterminated attribute selector in '{0}'")]
    Unterminated(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

/// A compound chain: `parts[0] comb[0] parts[1] ...`.
#[derive(Clone, Debug, PartialEq)]
struct Complex {
    parts: Vec<Compound>,
    combinators: Vec<Combinator>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Selector {
    alternatives: Vec<Complex>,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == ':'
}

impl Selector {
    pub fn parse(source: &str) -> Result<Selector, SelectorError> {
        let alternatives = source
            .split(',')
            .map(|alt| parse_complex(alt.trim(), source))
            .collect::<Result<Vec<_>, _>>()?;
        if alternatives.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Selector { alternatives })
    }

    pub fn matches(&self, graph: &SceneGraph, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|c| matches_complex(graph, node, &c.parts, &c.combinators))
    }
}

fn parse_complex(text: &str, whole: &str) -> Result<Complex, SelectorError> {
    if text.is_empty() {
        return Err(SelectorError::Empty);
    }
    let chars: Vec<char> = text.chars().collect();
    let mut parts = Vec::new();
    let mut combinators = Vec::new();
    let mut current = Compound::default();
    let mut has_current = false;
    let mut pending: Option<Combinator> = None;
    let mut i = 0;

    let read_ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == '>' {
            if has_current {
                parts.push(std::mem::take(&mut current));
                has_current = false;
                pending = Some(Combinator::Descendant);
            }
            if c == '>' {
                if parts.is_empty() {
                    return Err(SelectorError::Unexpected {
                        ch: c,
                        selector: whole.to_string(),
                    });
                }
                pending = Some(Combinator::Child);
            }
            i += 1;
            continue;
        }

        if !has_current {
            if let Some(comb) = pending.take() {
                combinators.push(comb);
            }
            has_current = true;
        }

        match c {
            '*' => i += 1,
            '#' => {
                i += 1;
                current.id = Some(read_ident(&mut i));
            }
            '.' => {
                i += 1;
                current.classes.push(read_ident(&mut i));
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or_else(|| SelectorError::Unterminated(whole.to_string()))?;
                let inner: String = chars[i + 1..i + close].iter().collect();
                let attr = match inner.split_once('=') {
                    Some((name, value)) => (
                        name.trim().to_string(),
                        Some(value.trim().trim_matches(|q| q == '"' || q == '\'').to_string()),
                    ),
                    None => (inner.trim().to_string(), None),
                };
                current.attributes.push(attr);
                i += close + 1;
            }
            c if is_ident_char(c) => {
                current.tag = Some(read_ident(&mut i));
            }
            other => {
                return Err(SelectorError::Unexpected {
                    ch: other,
                    selector: whole.to_string(),
                })
            }
        }
    }

    if has_current {
        parts.push(current);
    } else if pending == Some(Combinator::Child) || parts.is_empty() {
        return Err(SelectorError::Empty);
    }
    Ok(Complex { parts, combinators })
}

fn matches_compound(graph: &SceneGraph, node: NodeId, compound: &Compound) -> bool {
    let Some(n) = graph.get_node(node) else {
        return false;
    };
    let Some(tag) = n.tag() else {
        return false;
    };
    if let Some(expected) = &compound.tag {
        let local = tag.rsplit(':').next().unwrap_or(tag);
        if !expected.eq_ignore_ascii_case(tag) && !expected.eq_ignore_ascii_case(local) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if n.attribute("id") != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.iter().all(|c| n.has_class(c)) {
        return false;
    }
    compound.attributes.iter().all(|(name, value)| match value {
        Some(v) => n.attribute(name) == Some(v.as_str()),
        None => n.attribute(name).is_some(),
    })
}

fn matches_complex(
    graph: &SceneGraph,
    node: NodeId,
    parts: &[Compound],
    combinators: &[Combinator],
) -> bool {
    let Some((last, rest)) = parts.split_last() else {
        return false;
    };
    if !matches_compound(graph, node, last) {
        return false;
    }
    let Some((comb, rest_combs)) = combinators.split_last() else {
        return rest.is_empty();
    };

    let mut ancestor = graph.get_node(node).and_then(|n| n.parent);
    while let Some(a) = ancestor {
        if matches_complex(graph, a, rest, rest_combs) {
            return true;
        }
        if *comb == Combinator::Child {
            return false;
        }
        ancestor = graph.get_node(a).and_then(|n| n.parent);
    }
    false
}
