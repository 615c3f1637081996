// Render-scoped variables.
//
// `{set(greet):Hello %1!}` stores a value, after which `{greet:world}` expands
// it with `%1` replaced by the first argument. Declarations never outlive the
// render that made them.

use crate::core::tags::environment::Environment;
use crate::core::tags::registry::{TagCall, TagDefinition, TagError, TagResult};

pub fn definitions() -> Vec<TagDefinition> {
    vec![
        TagDefinition::new(&["declare", "=", "var", "variable", "set"], declare).unsplit(),
        TagDefinition::new(&["get", "getvar", "valueof"], get),
    ]
}

fn variable_name(call: &TagCall<'_>) -> Result<String, TagError> {
    let name = call.modifier.trim().to_lowercase();
    if name.is_empty() {
        return Err(TagError::invalid(
            "name of this variable is required as a modifier",
        ));
    }
    Ok(name)
}

fn declare(call: &mut TagCall<'_>) -> TagResult {
    let name = variable_name(call)?;
    let value = call.arg().to_string();
    call.env.vars.insert(name, value);
    Ok(None)
}

fn get(call: &mut TagCall<'_>) -> TagResult {
    let name = variable_name(call)?;
    match call.env.vars.get(&name) {
        Some(value) => Ok(Some(value.clone())),
        None => Err(TagError::invalid(format!("variable '{name}' does not exist"))),
    }
}

/// Expand variable `key` with positional arguments.
///
/// Unescaped `%N` (one or two digits) becomes `args[N - 1]` and stays as
/// written when there is no such argument.
pub fn expand(env: &Environment, key: &str, args: &[String]) -> Option<String> {
    let content = env.vars.get(key)?;
    if !content.contains('%') {
        return Some(content.clone());
    }

    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let escaped = i > 0 && chars[i - 1] == '\\';
        if ch != '%' || escaped {
            out.push(ch);
            i += 1;
            continue;
        }

        let digits: String = chars[i + 1..]
            .iter()
            .take(2)
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            out.push(ch);
            i += 1;
            continue;
        }

        let replacement = digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|n| args.get(n));
        match replacement {
            Some(arg) => out.push_str(arg),
            None => {
                out.push('%');
                out.push_str(&digits);
            }
        }
        i += 1 + digits.chars().count();
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::expand;
    use crate::core::tags::environment::{Environment, TagUser};
    use crate::core::tags::parser::parse;
    use crate::core::tags::registry::TagRegistry;

    fn run(text: &str) -> String {
        let mut env = Environment::new(TagUser::default());
        parse(text, &mut env, &TagRegistry::with_defaults(), false)
    }

    #[test]
    fn declared_variables_can_be_called_and_read() {
        assert_eq!(run("{set(Greet):Hello %1!}{greet:world}"), "Hello world!");
        assert_eq!(run("{=(x):5}{get(X)}"), "5");
    }

    #[test]
    fn missing_variables_error() {
        assert_eq!(run("{get(nope)}"), "{error: variable 'nope' does not exist}");
        assert_eq!(
            run("{set:value}"),
            "{error: name of this variable is required as a modifier}"
        );
    }

    #[test]
    fn builtins_shadow_variables() {
        assert_eq!(run("{set(upper):nope}{upper:yes}"), "YES");
    }

    #[test]
    fn expansion_keeps_escaped_and_missing_placeholders() {
        let mut env = Environment::new(TagUser::default());
        env.vars.insert("v".into(), r"%1 \%1 %2 %10%".into());
        let out = expand(&env, "v", &["a".to_string()]).expect("declared");
        assert_eq!(out, r"a \%1 %2 %10%");
        assert!(expand(&env, "missing", &[]).is_none());
    }

    #[test]
    fn variables_do_not_leak_between_renders() {
        let registry = TagRegistry::with_defaults();
        let mut first = Environment::new(TagUser::default());
        parse("{set(leak):x}", &mut first, &registry, false);
        let mut second = Environment::new(TagUser::default());
        assert_eq!(parse("{leak}", &mut second, &registry, false), "{leak}");
    }
}
