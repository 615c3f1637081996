// Tag definitions and lookup.
//
// A definition is a tree: `{embed.author.icon:...}` resolves `embed`, then its
// child `author`, then that child's `icon`. Names compare case-insensitively.

use super::environment::Environment;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TagError {
    /// A user-facing failure, rendered in place as `{error: ...}`.
    #[error("{0}")]
    Invalid(String),
}

impl TagError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TagError::Invalid(message.into())
    }
}

pub type TagResult = Result<Option<String>, TagError>;
pub type TagHandler = fn(&mut TagCall<'_>) -> TagResult;

/// Everything a handler gets to see for one invocation.
pub struct TagCall<'a> {
    pub env: &'a mut Environment,
    pub registry: &'a TagRegistry,
    pub modifier: String,
    pub args: Vec<String>,
}

impl TagCall<'_> {
    /// The single unsplit argument (or the first one), empty when absent.
    pub fn arg(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    /// The argument when given, otherwise the modifier.
    pub fn arg_or_modifier(&self) -> &str {
        let arg = self.arg();
        if arg.is_empty() {
            &self.modifier
        } else {
            arg
        }
    }
}

#[derive(Clone)]
pub struct TagDefinition {
    names: &'static [&'static str],
    handler: TagHandler,
    split_args: bool,
    evaluate_modifier: bool,
    children: Vec<TagDefinition>,
}

impl std::fmt::Debug for TagDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagDefinition")
            .field("names", &self.names)
            .field("split_args", &self.split_args)
            .field("evaluate_modifier", &self.evaluate_modifier)
            .field("children", &self.children)
            .finish()
    }
}

impl TagDefinition {
    /// `names[0]` is the canonical name, the rest are aliases.
    pub fn new(names: &'static [&'static str], handler: TagHandler) -> Self {
        Self {
            names,
            handler,
            split_args: true,
            evaluate_modifier: true,
            children: Vec::new(),
        }
    }

    /// Pass everything after `:` as one argument instead of splitting on `;`.
    pub fn unsplit(mut self) -> Self {
        self.split_args = false;
        self
    }

    /// Hand the modifier over verbatim instead of rendering it first.
    pub fn raw_modifier(mut self) -> Self {
        self.evaluate_modifier = false;
        self
    }

    pub fn child(mut self, child: TagDefinition) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &'static str {
        self.names.first().copied().unwrap_or("")
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        self.names.get(1..).unwrap_or(&[])
    }

    pub fn splits_args(&self) -> bool {
        self.split_args
    }

    pub fn evaluates_modifier(&self) -> bool {
        self.evaluate_modifier
    }

    pub fn children(&self) -> &[TagDefinition] {
        &self.children
    }

    pub fn matches(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn call(&self, call: &mut TagCall<'_>) -> TagResult {
        (self.handler)(call)
    }
}

/// The set of tags a render can use.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    definitions: Vec<TagDefinition>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in tag family.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for family in super::builtins::all() {
            registry.extend(family);
        }
        registry
    }

    pub fn add(&mut self, definition: TagDefinition) {
        self.definitions.push(definition);
    }

    pub fn extend(&mut self, definitions: impl IntoIterator<Item = TagDefinition>) {
        self.definitions.extend(definitions);
    }

    /// Remove a root definition by any of its names. Returns whether one was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.definitions.len();
        self.definitions.retain(|d| !d.matches(name));
        before != self.definitions.len()
    }

    pub fn definitions(&self) -> &[TagDefinition] {
        &self.definitions
    }

    /// Resolve a dotted path such as `user.avatar`.
    pub fn resolve(&self, path: &str) -> Option<&TagDefinition> {
        let mut segments = path.trim().split('.');
        let first = segments.next()?.trim();
        let mut current = self.definitions.iter().find(|d| d.matches(first))?;

        for segment in segments {
            let segment = segment.trim();
            current = current.children.iter().find(|d| d.matches(segment))?;
        }

        Some(current)
    }

    /// Dotted canonical names of every definition, depth first.
    pub fn qualified_names(&self) -> Vec<String> {
        fn walk(prefix: Option<&str>, defs: &[TagDefinition], out: &mut Vec<String>) {
            for def in defs {
                let name = match prefix {
                    Some(p) => format!("{p}.{}", def.name()),
                    None => def.name().to_string(),
                };
                walk(Some(&name), &def.children, out);
                out.push(name);
            }
        }

        let mut out = Vec::new();
        walk(None, &self.definitions, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut TagCall<'_>) -> TagResult {
        Ok(None)
    }

    fn registry() -> TagRegistry {
        let mut registry = TagRegistry::new();
        registry.add(
            TagDefinition::new(&["embed"], noop)
                .child(TagDefinition::new(&["author", "name"], noop).child(TagDefinition::new(
                    &["icon", "icon-url"],
                    noop,
                ))),
        );
        registry.add(TagDefinition::new(&["char-at", "charAt"], noop));
        registry
    }

    #[test]
    fn resolves_nested_paths_case_insensitively() {
        let registry = registry();
        let found = registry.resolve("Embed.NAME.icon-url").expect("nested tag");
        assert_eq!(found.name(), "icon");
        assert!(registry.resolve("charat").is_some());
        assert!(registry.resolve("embed.missing").is_none());
    }

    #[test]
    fn removing_by_alias_drops_the_definition() {
        let mut registry = registry();
        assert!(registry.remove("charAt"));
        assert!(registry.resolve("char-at").is_none());
        assert!(!registry.remove("charAt"));
    }

    #[test]
    fn qualified_names_list_children() {
        let names = registry().qualified_names();
        assert!(names.contains(&"embed.author.icon".to_string()));
        assert!(names.contains(&"char-at".to_string()));
    }
}
