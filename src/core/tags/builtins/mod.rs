// Built-in tag families. Each module exposes `definitions()`.

pub mod conditional;
pub mod embed;
pub mod leveling;
pub mod meta;
pub mod random;
pub mod users;
pub mod variables;
pub mod view;

use super::registry::TagDefinition;

/// Every family in lookup order. Earlier families win on name clashes.
pub fn all() -> Vec<Vec<TagDefinition>> {
    vec![
        meta::definitions(),
        random::definitions(),
        users::definitions(),
        leveling::definitions(),
        embed::definitions(),
        conditional::definitions(),
        view::definitions(),
        variables::definitions(),
    ]
}
