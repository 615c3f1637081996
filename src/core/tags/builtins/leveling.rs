use crate::core::tags::environment::LevelSnapshot;
use crate::core::tags::registry::{TagCall, TagDefinition, TagError, TagResult};

pub fn definitions() -> Vec<TagDefinition> {
    vec![
        TagDefinition::new(&["level", "lvl", "lv"], level),
        TagDefinition::new(&["xp", "exp"], xp),
    ]
}

fn snapshot(call: &TagCall<'_>) -> Result<LevelSnapshot, TagError> {
    call.env
        .level
        .ok_or_else(|| TagError::invalid("leveling data is not available here"))
}

fn level(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(snapshot(call)?.level.to_string()))
}

fn xp(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(snapshot(call)?.xp.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::core::tags::environment::{Environment, LevelSnapshot, TagUser};
    use crate::core::tags::parser::parse;
    use crate::core::tags::registry::TagRegistry;

    #[test]
    fn reads_the_snapshot() {
        let mut env = Environment::new(TagUser::default())
            .with_level(Some(LevelSnapshot { level: 7, xp: 42 }));
        let out = parse("{lvl} / {exp}", &mut env, &TagRegistry::with_defaults(), false);
        assert_eq!(out, "7 / 42");
    }

    #[test]
    fn errors_without_leveling() {
        let mut env = Environment::new(TagUser::default());
        let out = parse("{level}", &mut env, &TagRegistry::with_defaults(), false);
        assert_eq!(out, "{error: leveling data is not available here}");
    }
}
