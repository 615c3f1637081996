// Conditionals: {if(cond):then;else}, {unless(...)}, {and:...}, {or:...}, {exists:...}

use crate::core::tags::registry::{TagCall, TagDefinition, TagError, TagResult};

pub fn definitions() -> Vec<TagDefinition> {
    vec![
        TagDefinition::new(&["if", "?"], if_tag),
        TagDefinition::new(&["unless", "!", "not"], unless_tag),
        TagDefinition::new(&["exists", "??"], exists).unsplit(),
        TagDefinition::new(&["or", "any", "some"], any),
        TagDefinition::new(&["and", "all"], all),
    ]
}

#[derive(Clone, Copy)]
enum Operand {
    Number,
    Text,
}

#[derive(Clone, Copy)]
enum Comparison {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

// Checked in order, so two-char operators must precede their one-char prefixes.
const OPERATORS: [(&str, Operand, Comparison); 10] = [
    ("#==", Operand::Number, Comparison::Eq),
    ("#!=", Operand::Number, Comparison::Ne),
    ("#<>", Operand::Number, Comparison::Ne),
    ("==", Operand::Text, Comparison::Eq),
    ("!=", Operand::Text, Comparison::Ne),
    ("<>", Operand::Text, Comparison::Ne),
    (">=", Operand::Number, Comparison::Ge),
    ("<=", Operand::Number, Comparison::Le),
    (">", Operand::Number, Comparison::Gt),
    ("<", Operand::Number, Comparison::Lt),
];

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn strip_operand(text: &str) -> &str {
    text.trim_matches(|c| matches!(c, '(' | ')' | ' ' | '\t' | '\n' | '\r'))
}

fn compare<T: PartialOrd>(left: T, right: T, op: Comparison) -> bool {
    match op {
        Comparison::Eq => left == right,
        Comparison::Ne => left != right,
        Comparison::Ge => left >= right,
        Comparison::Le => left <= right,
        Comparison::Gt => left > right,
        Comparison::Lt => left < right,
    }
}

/// Evaluate a condition such as `5 > 3`, `a == b` or `yes`.
///
/// `None` means the text is not a condition at all. Numeric comparisons with
/// non-numeric operands are simply false.
pub fn evaluate_condition(condition: &str) -> Option<bool> {
    let condition = condition.trim();
    if let Some(value) = parse_bool(condition) {
        return Some(value);
    }

    for (symbol, operand, comparison) in OPERATORS {
        let Some((left, right)) = condition.split_once(symbol) else {
            continue;
        };
        let (left, right) = (strip_operand(left), strip_operand(right));

        return Some(match operand {
            Operand::Text => compare(left, right, comparison),
            Operand::Number => match (left.parse::<f64>(), right.parse::<f64>()) {
                (Ok(l), Ok(r)) => compare(l, r, comparison),
                _ => false,
            },
        });
    }

    None
}

fn branch(call: &TagCall<'_>, negate: bool) -> TagResult {
    match call.args.len() {
        0 => return Err(TagError::invalid("expected at least one argument")),
        1 | 2 => {}
        _ => return Err(TagError::invalid("expected at most two arguments")),
    }

    let Some(truth) = evaluate_condition(&call.modifier) else {
        return Err(TagError::invalid("invalid conditional"));
    };

    let chosen = if truth != negate {
        call.args.first()
    } else {
        call.args.get(1)
    };
    Ok(Some(chosen.cloned().unwrap_or_default()))
}

fn if_tag(call: &mut TagCall<'_>) -> TagResult {
    branch(call, false)
}

fn unless_tag(call: &mut TagCall<'_>) -> TagResult {
    branch(call, true)
}

fn exists(call: &mut TagCall<'_>) -> TagResult {
    let present = !call.modifier.is_empty() || !call.arg().is_empty();
    Ok(Some(present.to_string()))
}

fn any(call: &mut TagCall<'_>) -> TagResult {
    let result = call
        .args
        .iter()
        .any(|a| evaluate_condition(a).unwrap_or(false));
    Ok(Some(result.to_string()))
}

fn all(call: &mut TagCall<'_>) -> TagResult {
    let result = call
        .args
        .iter()
        .all(|a| evaluate_condition(a).unwrap_or(false));
    Ok(Some(result.to_string()))
}
