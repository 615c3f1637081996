// String, number and argument helpers.

use crate::core::formatting::{cutoff, format_thousands, ordinal};
use crate::core::tags::parser::MAX_TAG_OUTPUT;
use crate::core::tags::registry::{TagCall, TagDefinition, TagError, TagResult};

pub fn definitions() -> Vec<TagDefinition> {
    vec![
        TagDefinition::new(&["char-at", "charAt", "getchar", "char"], char_at).unsplit(),
        TagDefinition::new(&["escape"], escape).unsplit().raw_modifier(),
        TagDefinition::new(&["length", "len", "size"], length).unsplit(),
        TagDefinition::new(&["lowercase", "lower"], lowercase).unsplit(),
        TagDefinition::new(&["uppercase", "upper"], uppercase).unsplit(),
        TagDefinition::new(&["replace", "repl", "sub"], replace),
        TagDefinition::new(&["repeat", "rep"], repeat).unsplit(),
        TagDefinition::new(&["strip", "trim", "truncate"], strip).unsplit(),
        TagDefinition::new(&["round", "rnd"], round).unsplit(),
        TagDefinition::new(&["comma", "commafy"], comma).unsplit(),
        TagDefinition::new(&["ordinal", "ord", "nth"], ordinal_tag).unsplit(),
        TagDefinition::new(&["max", "largest", "maximum", "greatest"], max),
        TagDefinition::new(&["min", "smallest", "minimum", "least"], min),
        TagDefinition::new(&["cutoff"], cutoff_tag).unsplit(),
        TagDefinition::new(&["comment", "//"], comment)
            .unsplit()
            .raw_modifier(),
        TagDefinition::new(&["arg", "getarg"], arg).unsplit(),
        TagDefinition::new(&["args"], args),
        TagDefinition::new(&["noreply", "norep", "nr"], noreply),
    ]
}

fn parse_int(value: &str, message: &str) -> Result<i64, TagError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| TagError::invalid(message))
}

fn parse_float(value: &str, message: &str) -> Result<f64, TagError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| TagError::invalid(message))
}

fn char_at(call: &mut TagCall<'_>) -> TagResult {
    if call.modifier.is_empty() || call.arg().is_empty() {
        return Err(TagError::invalid(
            "char-at requires a modifier (index) and an argument (string)",
        ));
    }

    let index = parse_int(&call.modifier, "index must be an integer")?;
    let chars: Vec<char> = call.arg().chars().collect();
    let position = if index > 0 {
        Some(index as usize - 1)
    } else if index == 0 {
        Some(0)
    } else {
        chars.len().checked_sub(index.unsigned_abs() as usize)
    };

    position
        .and_then(|p| chars.get(p))
        .map(|c| Some(c.to_string()))
        .ok_or_else(|| TagError::invalid("character out of range"))
}

fn escape(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(call.arg_or_modifier().replace(';', "\\;")))
}

fn length(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(call.arg_or_modifier().chars().count().to_string()))
}

fn lowercase(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(call.arg_or_modifier().to_lowercase()))
}

fn uppercase(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(call.arg_or_modifier().to_uppercase()))
}

fn replace(call: &mut TagCall<'_>) -> TagResult {
    let [from, to] = call.args.as_slice() else {
        return Err(TagError::invalid("replace requires exactly two arguments"));
    };

    Ok(Some(call.modifier.replace(from.as_str(), to)))
}

fn repeat(call: &mut TagCall<'_>) -> TagResult {
    if call.arg().is_empty() {
        return Err(TagError::invalid("repeat requires an argument"));
    }

    let times = parse_int(&call.modifier, "repeat requires an integer modifier")?;
    if times < 1 {
        return Err(TagError::invalid("repeat requires a positive integer"));
    }
    if times > 1000 {
        return Err(TagError::invalid("repeat modifier must be at most 1000"));
    }

    if call.arg().chars().count().saturating_mul(times as usize) > MAX_TAG_OUTPUT {
        return Err(TagError::invalid("repeat output is too long"));
    }

    Ok(Some(call.arg().repeat(times as usize)))
}

fn strip(call: &mut TagCall<'_>) -> TagResult {
    let set: Vec<char> = if call.modifier.is_empty() {
        vec![' ', '\n']
    } else {
        call.modifier.chars().collect()
    };

    Ok(Some(call.arg().trim_matches(set.as_slice()).to_string()))
}

fn round(call: &mut TagCall<'_>) -> TagResult {
    let value = parse_float(call.arg_or_modifier(), "round requires a number argument")?;
    // `+ 0.0` turns -0 into 0.
    Ok(Some(format!("{:.0}", value.round_ties_even() + 0.0)))
}

fn comma(call: &mut TagCall<'_>) -> TagResult {
    let value = parse_float(call.arg_or_modifier(), "comma requires a number argument")?;
    Ok(Some(format_thousands(value)))
}

fn ordinal_tag(call: &mut TagCall<'_>) -> TagResult {
    let value = parse_int(call.arg_or_modifier(), "ordinal requires a number argument")?;
    Ok(Some(ordinal(value)))
}

/// Key used by `max`/`min`. The modifier may name another tag, e.g. `length`.
fn sort_key(call: &mut TagCall<'_>, value: &str) -> Result<f64, TagError> {
    let key_tag = call.modifier.trim();
    let resolved = if key_tag.is_empty() {
        None
    } else {
        call.registry.resolve(key_tag)
    };

    let keyed = match resolved {
        Some(def) => {
            let mut inner = TagCall {
                env: &mut *call.env,
                registry: call.registry,
                modifier: String::new(),
                args: vec![value.to_string()],
            };
            def.call(&mut inner)?.unwrap_or_default()
        }
        None => value.to_string(),
    };

    keyed.trim().parse::<f64>().map_err(|_| TagError::invalid(""))
}

fn extreme(call: &mut TagCall<'_>, name: &str, wants_greater: bool) -> TagResult {
    let message = format!("{name} only takes number arguments");
    let values = call.args.clone();
    let mut best: Option<(f64, String)> = None;

    for value in values {
        let key = sort_key(call, &value).map_err(|_| TagError::invalid(message.clone()))?;
        let replace = match &best {
            None => true,
            Some((current, _)) if wants_greater => key > *current,
            Some((current, _)) => key < *current,
        };
        if replace {
            best = Some((key, value));
        }
    }

    best.map(|(_, value)| Some(value))
        .ok_or_else(|| TagError::invalid(message))
}

fn max(call: &mut TagCall<'_>) -> TagResult {
    extreme(call, "max", true)
}

fn min(call: &mut TagCall<'_>) -> TagResult {
    extreme(call, "min", false)
}

fn cutoff_tag(call: &mut TagCall<'_>) -> TagResult {
    if call.modifier.is_empty() || call.arg().is_empty() {
        return Err(TagError::invalid(
            "cutoff requires a modifier (max length) and an argument (string)",
        ));
    }

    let max_length = parse_int(&call.modifier, "max length must be an integer")?;
    if max_length < 1 {
        return Err(TagError::invalid("max length must be greater than 0"));
    }

    Ok(Some(cutoff(call.arg(), max_length as usize, false)))
}

fn comment(_: &mut TagCall<'_>) -> TagResult {
    Ok(None)
}

fn arg(call: &mut TagCall<'_>) -> TagResult {
    let index = call.arg_or_modifier().to_string();
    if index.is_empty() {
        return Err(TagError::invalid("arg requires a modifier (index)"));
    }

    let index = parse_int(&index, "arg requires an integer modifier")?;
    if index <= 0 {
        return Err(TagError::invalid("arg requires a positive integer modifier"));
    }

    Ok(Some(
        call.env
            .args
            .get(index as usize - 1)
            .cloned()
            .unwrap_or_default(),
    ))
}

fn args(call: &mut TagCall<'_>) -> TagResult {
    let joiner = if call.modifier.is_empty() {
        ";".to_string()
    } else {
        call.modifier.clone()
    };

    let entries: &[String] = match call.args.as_slice() {
        [] => &call.env.args,
        [lower, upper] => {
            let bounds_error =
                "args requires no arguments or two positive integer arguments";
            let lower = parse_int(lower, bounds_error)?;
            let upper = parse_int(upper, bounds_error)?;
            if lower < 1 || upper < 1 {
                return Err(TagError::invalid(bounds_error));
            }

            let len = call.env.args.len();
            let from = (lower as usize - 1).min(len);
            let to = (upper as usize).min(len).max(from);
            &call.env.args[from..to]
        }
        _ => {
            return Err(TagError::invalid(
                "args requires either zero arguments or two arguments (lower and upper bounds)",
            ))
        }
    };

    Ok(Some(entries.join(&joiner)))
}

fn noreply(call: &mut TagCall<'_>) -> TagResult {
    call.env.should_reply = false;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::core::tags::environment::{Environment, TagUser};
    use crate::core::tags::parser::parse;
    use crate::core::tags::registry::TagRegistry;

    fn run_with_args(text: &str, args: &[&str]) -> String {
        let mut env = Environment::new(TagUser::default())
            .with_args(args.iter().map(|a| a.to_string()).collect());
        parse(text, &mut env, &TagRegistry::with_defaults(), false)
    }

    fn run(text: &str) -> String {
        run_with_args(text, &[])
    }

    #[test]
    fn char_at_counts_from_one_and_from_the_end() {
        assert_eq!(run("{char-at(1):hello}"), "h");
        assert_eq!(run("{charAt(-1):hello}"), "o");
        assert_eq!(run("{char(9):hello}"), "{error: character out of range}");
    }

    #[test]
    fn escape_protects_semicolons() {
        assert_eq!(run("{escape:a;b}"), r"a\;b");
    }

    #[test]
    fn case_and_length() {
        assert_eq!(run("{upper:hi there}"), "HI THERE");
        assert_eq!(run("{lower(ABC)}"), "abc");
        assert_eq!(run("{len:héllo}"), "5");
    }

    #[test]
    fn replace_needs_two_arguments() {
        assert_eq!(run("{replace(hello world):o;0}"), "hell0 w0rld");
        assert_eq!(
            run("{replace(x):a}"),
            "{error: replace requires exactly two arguments}"
        );
    }

    #[test]
    fn nested_repeats_cannot_blow_up() {
        assert_eq!(run("{repeat(1000):x}").len(), 1000);
        assert_eq!(
            run("{repeat(1000):{repeat(1000):x}}"),
            "{error: repeat output is too long}"
        );
        assert_eq!(run("{repeat(1000):{repeat(6):x}}").len(), 6000);
        assert_eq!(
            run("{repeat(1000):{repeat(7):x}}"),
            "{error: repeat output is too long}"
        );
    }

    #[test]
    fn huge_numbers_round_exactly() {
        assert_eq!(run("{round:1e20}"), "100000000000000000000");
        assert_eq!(run("{round:-0.4}"), "0");
        let huge = run("{round:1e300}");
        assert_eq!(huge.len(), 301);
        assert!(huge.starts_with("1000000000000000052504760255204420248704"));
    }

    #[test]
    fn repeat_bounds() {
        assert_eq!(run("{repeat(3):ab}"), "ababab");
        assert_eq!(run("{repeat(0):ab}"), "{error: repeat requires a positive integer}");
        assert_eq!(
            run("{repeat(1001):ab}"),
            "{error: repeat modifier must be at most 1000}"
        );
    }

    #[test]
    fn strip_uses_modifier_as_char_set() {
        assert_eq!(run("{strip(<>):<value>}"), "value");
        assert_eq!(run("{trim:  padded  }"), "padded");
    }

    #[test]
    fn numbers_format() {
        assert_eq!(run("{round:2.5}"), "2");
        assert_eq!(run("{round:3.5}"), "4");
        assert_eq!(run("{comma:1234567}"), "1,234,567");
        assert_eq!(run("{ordinal:22}"), "22nd");
        assert_eq!(run("{round:abc}"), "{error: round requires a number argument}");
    }

    #[test]
    fn max_and_min_support_key_tags() {
        assert_eq!(run("{max:3;10;7}"), "10");
        assert_eq!(run("{min:3;10;7}"), "3");
        assert_eq!(run("{max(length):a;abc;ab}"), "abc");
        assert_eq!(run("{max:a;b}"), "{error: max only takes number arguments}");
    }

    #[test]
    fn cutoff_and_comment() {
        assert_eq!(run("{cutoff(4):abcdefgh}"), "abcd...");
        assert_eq!(run("a{comment:ignored {upper:x}}b"), "ab");
    }

    #[test]
    fn positional_arguments() {
        let args = ["one", "two", "three"];
        assert_eq!(run_with_args("{arg(2)}", &args), "two");
        assert_eq!(run_with_args("{arg:5}", &args), "");
        assert_eq!(run_with_args("{args}", &args), "one;two;three");
        assert_eq!(run_with_args("{args( ):1;2}", &args), "one two");
        assert_eq!(run_with_args("{args(,):2;9}", &args), "two,three");
    }

    #[test]
    fn noreply_clears_reply_flag() {
        let mut env = Environment::new(TagUser::default());
        let out = parse("hi{noreply}", &mut env, &TagRegistry::with_defaults(), false);
        assert_eq!(out, "hi");
        assert!(!env.should_reply);
    }
}
