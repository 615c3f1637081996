// The tag parser.
//
// Grammar: "{" name ("." attr)* ["(" modifier ")"] [":" argument (";" argument)*] "}"
//
// Nodes are found in one pass and rendered innermost first, so the arguments
// of an outer tag already contain the output of the tags nested inside it.
// All offsets are char indices.

use super::environment::{Environment, RenderedTag};
use super::registry::{TagCall, TagDefinition, TagError, TagRegistry};

/// Most chars a single tag may expand to.
pub const MAX_TAG_OUTPUT: usize = 6000;

/// A `{...}` span, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub start: usize,
    pub end: usize,
}

impl Node {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Find every tag span, innermost first.
///
/// Characters preceded by a backslash are skipped. Once a `{` is seen, any
/// parenthesised modifier is opaque until the argument `:` starts.
pub fn walk_nodes(text: &[char]) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_tag_head = false;
    let mut depth = 0usize;

    for (i, &ch) in text.iter().enumerate() {
        if i > 0 && text[i - 1] == '\\' {
            continue;
        }

        if ch == '(' && in_tag_head {
            depth += 1;
        } else if ch == ')' && in_tag_head && depth > 0 {
            depth -= 1;
        }

        if depth > 0 {
            continue;
        }

        match ch {
            ':' => in_tag_head = false,
            '{' => {
                open.push(i);
                in_tag_head = true;
            }
            '}' => {
                if let Some(start) = open.pop() {
                    nodes.push(Node { start, end: i + 1 });
                    in_tag_head = false;
                }
            }
            _ => {}
        }
    }

    nodes
}

/// The three parts of a tag body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagParts {
    pub name: String,
    pub modifier: String,
    pub args: String,
}

/// Split a tag body (without braces) into name, modifier and raw arguments.
///
/// The modifier is everything between the first `(` before the argument
/// colon and its matching `)`. Arguments are everything after the first
/// colon outside of parentheses.
pub fn split_tag(body: &str) -> TagParts {
    let chars: Vec<char> = body.chars().collect();
    let mut depth = 0usize;
    let mut paren_open: Option<usize> = None;
    let mut paren_close: Option<usize> = None;
    let mut colon: Option<usize> = None;

    for (i, &ch) in chars.iter().enumerate() {
        match ch {
            '(' => {
                if paren_open.is_none() {
                    paren_open = Some(i);
                }
                depth += 1;
            }
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 && paren_close.is_none() {
                    paren_close = Some(i);
                }
            }
            ':' if depth == 0 => {
                colon = Some(i);
                break;
            }
            _ => {}
        }
    }

    let head_end = colon.unwrap_or(chars.len());
    let collect = |from: usize, to: usize| chars[from..to].iter().collect::<String>();

    let (name, modifier) = match paren_open.filter(|&open| open < head_end) {
        Some(open) => {
            let close = paren_close.filter(|&c| c < head_end).unwrap_or(head_end);
            (collect(0, open), collect(open + 1, close))
        }
        None => (collect(0, head_end), String::new()),
    };

    let args = match colon {
        Some(c) => collect(c + 1, chars.len()),
        None => String::new(),
    };

    TagParts {
        name,
        modifier,
        args,
    }
}

/// Split on unescaped `;` and unescape `\;`. Empty input gives no arguments.
pub fn split_arguments(args: &str) -> Vec<String> {
    if args.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = args.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&';') => {
                current.push(';');
                chars.next();
            }
            ';' => out.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    out.push(current);
    out
}

enum Resolved<'r> {
    Builtin(&'r TagDefinition),
    Variable(String),
}

fn resolve<'r>(name: &str, registry: &'r TagRegistry, env: &Environment) -> Option<Resolved<'r>> {
    if let Some(def) = registry.resolve(name) {
        return Some(Resolved::Builtin(def));
    }

    let key = name.trim().to_lowercase();
    env.vars
        .contains_key(&key)
        .then_some(Resolved::Variable(key))
}

/// Render every tag in `text` against `env`.
///
/// Unknown tags are left as written. A failing tag becomes `{error: ...}`,
/// or is left as written when `silent` is set.
pub fn parse(text: &str, env: &mut Environment, registry: &TagRegistry, silent: bool) -> String {
    let mut text: Vec<char> = text.chars().collect();
    let mut nodes = walk_nodes(&text);

    for i in 0..nodes.len() {
        let Node { start, end } = nodes[i];
        let body: String = text[start + 1..end - 1].iter().collect();
        let parts = split_tag(&body);

        let Some(resolved) = resolve(&parts.name, registry, env) else {
            continue;
        };

        let outcome = match resolved {
            Resolved::Builtin(def) => {
                let args = if def.splits_args() {
                    split_arguments(&parts.args)
                } else {
                    vec![parts.args.clone()]
                };
                let modifier = if def.evaluates_modifier() {
                    parse(&parts.modifier, env, registry, silent)
                } else {
                    parts.modifier.clone()
                };

                let mut call = TagCall {
                    env: &mut *env,
                    registry,
                    modifier,
                    args,
                };
                def.call(&mut call)
            }
            Resolved::Variable(key) => {
                let args = split_arguments(&parts.args);
                Ok(super::builtins::variables::expand(env, &key, &args))
            }
        };

        let outcome = outcome.and_then(|value| match value {
            Some(v) if v.chars().count() > MAX_TAG_OUTPUT => {
                Err(TagError::invalid("tag output is too long"))
            }
            other => Ok(other),
        });

        let replacement = match outcome {
            Ok(value) => value.unwrap_or_default(),
            Err(_) if silent => continue,
            Err(err) => format!("{{error: {err}}}"),
        };

        let replacement: Vec<char> = replacement.chars().collect();
        let offset = replacement.len() as isize - (end - start) as isize;
        text.splice(start..end, replacement);

        if offset == 0 {
            continue;
        }

        for later in nodes.iter_mut().skip(i + 1) {
            if later.start > start {
                later.start = shift(later.start, offset);
            }
            if later.end > start {
                later.end = shift(later.end, offset);
            }
        }
    }

    text.into_iter().collect()
}

fn shift(position: usize, offset: isize) -> usize {
    (position as isize + offset).max(0) as usize
}

/// Render `content` and collect the side outputs left on the environment.
pub fn render(
    content: &str,
    mut env: Environment,
    registry: &TagRegistry,
    silent: bool,
) -> RenderedTag {
    let content = parse(content, &mut env, registry, silent);

    RenderedTag {
        content,
        embed: env.embed,
        buttons: env.buttons,
        should_reply: env.should_reply,
    }
}
