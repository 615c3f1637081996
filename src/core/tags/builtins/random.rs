use crate::core::tags::registry::{TagCall, TagDefinition, TagError, TagResult};
use rand::seq::SliceRandom;
use rand::Rng;

pub fn definitions() -> Vec<TagDefinition> {
    vec![
        TagDefinition::new(&["random", "rng", "#", "rand"], random),
        TagDefinition::new(
            &["choice", "choose", "##", "randchoice", "random-choice", "pick"],
            choice,
        ),
    ]
}

/// `{random:10}` is 1..=10, `{random:5;10}` is 5..=10, `{random(10)}` works too.
fn random(call: &mut TagCall<'_>) -> TagResult {
    let bounds: Vec<String> = match call.args.as_slice() {
        [] => vec!["1".into(), call.modifier.clone()],
        [high] => vec!["1".into(), high.clone()],
        [low, high] => vec![low.clone(), high.clone()],
        _ => return Err(TagError::invalid("random takes at most 2 arguments")),
    };

    let parsed: Result<Vec<i64>, _> = bounds.iter().map(|b| b.trim().parse::<i64>()).collect();
    let Ok(parsed) = parsed else {
        return Err(TagError::invalid("random takes only integers as arguments"));
    };

    let (mut low, mut high) = (parsed[0], parsed[1]);
    if low > high {
        std::mem::swap(&mut low, &mut high);
    }

    let value = if low == high {
        low
    } else {
        rand::thread_rng().gen_range(low..=high)
    };
    Ok(Some(value.to_string()))
}

fn choice(call: &mut TagCall<'_>) -> TagResult {
    if call.args.is_empty() {
        if !call.modifier.is_empty() {
            return Err(TagError::invalid("choice does not take a modifier"));
        }
        return Err(TagError::invalid("choice takes at least 1 argument"));
    }

    Ok(call.args.choose(&mut rand::thread_rng()).cloned())
}
