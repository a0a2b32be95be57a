//! Tag tree model
//!
//! - [`TagRow`]: materialized-path storage form of a [`Tag`](crate::model::Tag)
//! - [`AmbiguityResolver`]: leaf-collision detection and minimal unique suffixes

mod ambiguity;
mod path;

pub use ambiguity::{leaf, AmbiguityResolver};
pub use path::{PathError, TagRow};

/// Separator between the components of a namespaced tag name
pub const DEFAULT_SEPARATOR: &str = "::";

/// Components of a namespaced name, root first
pub fn components<'t>(name: &'t str, separator: &str) -> Vec<&'t str> {
    name.split(separator).collect()
}

/// Name of the parent of a namespaced name, if it has one
pub fn parent_name<'t>(name: &'t str, separator: &str) -> Option<&'t str> {
    name.rfind(separator).map(|index| &name[..index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_and_parent() {
        assert_eq!(components("a::b::c", DEFAULT_SEPARATOR), vec!["a", "b", "c"]);
        assert_eq!(parent_name("a::b::c", DEFAULT_SEPARATOR), Some("a::b"));
        assert_eq!(parent_name("a", DEFAULT_SEPARATOR), None);
    }
}
