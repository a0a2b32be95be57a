//! Leaf collisions between namespaced tags
//!
//! Users usually type the last component of a tag (`async`) rather than its
//! full name (`lang::rust::async`). When two tags share that leaf the short
//! form is ambiguous; the resolver finds where such tags diverge and the
//! shortest suffix that still names each tag uniquely.

use std::collections::BTreeSet;

/// Ambiguity queries over a fixed set of tag names
///
/// # Example
///
/// ```rust
/// use kbase::tag::AmbiguityResolver;
///
/// let names = ["X::Y::C", "A::B::C"];
/// let resolver = AmbiguityResolver::new(names, "::");
/// assert!(resolver.is_leaf_ambiguous("X::Y::C"));
/// assert_eq!(resolver.shorten_tag("X::Y::C"), "Y::C");
/// ```
#[derive(Debug, Clone)]
pub struct AmbiguityResolver<'a> {
    separator: &'a str,
    names: Vec<(&'a str, Vec<&'a str>)>,
}

impl<'a> AmbiguityResolver<'a> {
    pub fn new<I>(names: I, separator: &'a str) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let names = names
            .into_iter()
            .map(|name| (name, name.split(separator).collect()))
            .collect();
        Self { separator, names }
    }

    fn others<'s>(&'s self, tag: &'s str) -> impl Iterator<Item = &'s [&'a str]> + 's {
        self.names
            .iter()
            .filter(move |(name, _)| *name != tag)
            .map(|(_, components)| components.as_slice())
    }

    fn colliding<'s>(&'s self, tag: &'s str, leaf: &'s str) -> impl Iterator<Item = &'s [&'a str]> + 's {
        self.others(tag)
            .filter(move |components| components.last() == Some(&leaf))
    }

    /// Whether another tag ends in the same component
    pub fn is_leaf_ambiguous(&self, tag: &str) -> bool {
        let leaf = leaf(tag, self.separator);
        self.colliding(tag, leaf).next().is_some()
    }

    /// Lowest index at which `tag` diverges from a tag sharing its leaf
    ///
    /// Returns the index and `tag`'s component there, or `None` when no
    /// other tag shares the leaf. A colliding tag that merely extends `tag`
    /// has no divergence inside `tag` and is skipped.
    pub fn find_ambiguous_component(&self, tag: &str) -> Option<(usize, String)> {
        let components: Vec<&str> = tag.split(self.separator).collect();
        let leaf = leaf(tag, self.separator);
        self.colliding(tag, leaf)
            .filter_map(|other| {
                components
                    .iter()
                    .enumerate()
                    .find(|(index, component)| other.get(*index) != Some(*component))
                    .map(|(index, _)| index)
            })
            .min()
            .map(|index| (index, components[index].to_string()))
    }

    /// Shortest trailing window of `tag` that no other tag ends with
    ///
    /// Falls back to the full name when every window collides.
    pub fn shorten_tag(&self, tag: &str) -> String {
        let components: Vec<&str> = tag.split(self.separator).collect();
        let len = components.len();
        for window in 1..=len {
            let suffix = &components[len - window..];
            let collides = self
                .others(tag)
                .any(|other| other.len() >= window && &other[other.len() - window..] == suffix);
            if !collides {
                return suffix.join(self.separator);
            }
        }
        tag.to_string()
    }

    /// [`shorten_tag`](Self::shorten_tag) applied to every known name
    pub fn list_tags_shortened(&self) -> BTreeSet<String> {
        self.names
            .iter()
            .map(|(name, _)| self.shorten_tag(name))
            .collect()
    }
}

/// Last component of a namespaced name
pub fn leaf<'t>(tag: &'t str, separator: &str) -> &'t str {
    tag.rsplit(separator).next().unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEP: &str = "::";

    #[test]
    fn test_single_tag_shortens_to_leaf() {
        let resolver = AmbiguityResolver::new(["foo::bar::baz"], SEP);
        assert_eq!(resolver.shorten_tag("foo::bar::baz"), "baz");
        assert!(!resolver.is_leaf_ambiguous("foo::bar::baz"));
        assert_eq!(resolver.find_ambiguous_component("foo::bar::baz"), None);
    }

    #[test]
    fn test_shortened_listing() {
        let resolver = AmbiguityResolver::new(["X::Y::C", "A::B::C"], SEP);
        let expected: BTreeSet<String> = ["Y::C", "B::C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(resolver.list_tags_shortened(), expected);
    }

    #[test]
    fn test_colliding_tags_are_both_ambiguous() {
        let resolver = AmbiguityResolver::new(["foo::bar::baz", "foo::foo::baz", "qux"], SEP);
        assert!(resolver.is_leaf_ambiguous("foo::bar::baz"));
        assert!(resolver.is_leaf_ambiguous("foo::foo::baz"));
        assert!(!resolver.is_leaf_ambiguous("qux"));
    }

    #[test]
    fn test_find_ambiguous_component() {
        let resolver = AmbiguityResolver::new(["foo::bar::baz", "foo::foo::baz"], SEP);
        assert_eq!(
            resolver.find_ambiguous_component("foo::bar::baz"),
            Some((1, "bar".to_string()))
        );
        assert_eq!(
            resolver.find_ambiguous_component("foo::foo::baz"),
            Some((1, "foo".to_string()))
        );
    }

    #[test]
    fn test_find_ambiguous_component_takes_lowest_index() {
        let resolver =
            AmbiguityResolver::new(["a::b::c::z", "a::b::x::z", "q::b::c::z"], SEP);
        assert_eq!(
            resolver.find_ambiguous_component("a::b::c::z"),
            Some((0, "a".to_string()))
        );
    }

    #[test]
    fn test_find_ambiguous_component_skips_extensions() {
        let resolver = AmbiguityResolver::new(["a::a", "a::a::a"], SEP);
        assert_eq!(resolver.find_ambiguous_component("a::a"), None);
        assert_eq!(
            resolver.find_ambiguous_component("a::a::a"),
            Some((2, "a".to_string()))
        );
    }

    #[test]
    fn test_shorter_tag_falls_back_to_full_name() {
        let resolver = AmbiguityResolver::new(["c", "b::c"], SEP);
        assert_eq!(resolver.shorten_tag("b::c"), "b::c");
        assert_eq!(resolver.shorten_tag("c"), "c");
    }

    #[test]
    fn test_custom_separator() {
        let resolver = AmbiguityResolver::new(["a/b", "c/b", "d"], "/");
        assert_eq!(resolver.shorten_tag("a/b"), "a/b");
        assert_eq!(resolver.shorten_tag("d"), "d");
        assert_eq!(leaf("a/b", "/"), "b");
    }
}
