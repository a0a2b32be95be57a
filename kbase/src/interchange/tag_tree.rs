//! YAML tag trees
//!
//! ```yaml
//! tags:
//!   - inbox
//!   - lang:
//!       - go
//!       - rust:
//!           - async
//! ```
//!
//! A bare name is a leaf. A single-key mapping is an interior node whose
//! value lists its children. The tree above yields `inbox`, `lang::go` and
//! `lang::rust::async`.

use std::collections::HashMap;

use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::model::{Tag, TagId};
use crate::tag::components;

fn node_name(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn join(prefix: Option<&str>, name: &str, separator: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{separator}{name}"),
        None => name.to_string(),
    }
}

fn walk(nodes: &[Value], prefix: Option<&str>, separator: &str, paths: &mut Vec<String>) -> Result<()> {
    for node in nodes {
        if let Some(name) = node_name(node) {
            paths.push(join(prefix, &name, separator));
            continue;
        }
        let Value::Mapping(mapping) = node else {
            return Err(Error::Interchange(format!(
                "tag node must be a name or a single-key mapping, got {:?}",
                node
            )));
        };
        let mut entries = mapping.iter();
        let (Some((key, children)), None) = (entries.next(), entries.next()) else {
            return Err(Error::Interchange(format!(
                "interior tag node must have exactly one key, got {}",
                mapping.len()
            )));
        };
        let name = node_name(key)
            .ok_or_else(|| Error::Interchange(format!("tag name must be a scalar, got {:?}", key)))?;
        let path = join(prefix, &name, separator);
        match children {
            Value::Sequence(children) if !children.is_empty() => {
                walk(children, Some(&path), separator, paths)?;
            }
            // a node without children is a leaf
            Value::Sequence(_) | Value::Null => paths.push(path),
            other => {
                return Err(Error::Interchange(format!(
                    "children of {} must be a list, got {:?}",
                    path, other
                )))
            }
        }
    }
    Ok(())
}

/// Full names of every leaf of a YAML tag tree, in document order
pub fn parse_tag_tree(yaml: &str, separator: &str) -> Result<Vec<String>> {
    let document: Value = serde_yaml::from_str(yaml)?;
    let roots = match document.get("tags") {
        Some(Value::Sequence(roots)) => roots,
        Some(Value::Null) => return Ok(Vec::new()),
        Some(other) => {
            return Err(Error::Interchange(format!(
                "`tags` must be a list, got {:?}",
                other
            )))
        }
        None => return Err(Error::Interchange("missing top-level `tags` key".to_string())),
    };
    let mut paths = Vec::new();
    walk(roots, None, separator, &mut paths)?;
    tracing::debug!(count = paths.len(), "Tag tree parsed");
    Ok(paths)
}

/// Tags for every prefix of `paths`, ready to be added in one batch
///
/// Ids are assigned from `first_id` in order of first appearance, so every
/// parent precedes its children. Children are listed in appearance order.
pub fn tag_forest<S: AsRef<str>>(paths: &[S], separator: &str, first_id: TagId) -> Vec<Tag> {
    let mut tags: Vec<Tag> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for path in paths {
        let parts = components(path.as_ref(), separator);
        let mut ancestors: Vec<TagId> = Vec::with_capacity(parts.len());
        for depth in 1..=parts.len() {
            let name = parts[..depth].join(separator);
            let position = match index.get(&name) {
                Some(&position) => position,
                None => {
                    let id = first_id + tags.len() as TagId;
                    tags.push(Tag::new(id, name.clone()).with_parent_path(ancestors.iter().copied()));
                    if let Some(&parent) = ancestors.last() {
                        let parent = (parent - first_id) as usize;
                        tags[parent].subtag_ids.push(id);
                    }
                    index.insert(name, tags.len() - 1);
                    tags.len() - 1
                }
            };
            ancestors.push(tags[position].id);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"
tags:
  - inbox
  - lang:
      - go
      - rust:
          - async
          - macros
  - archive: []
"#;

    #[test]
    fn test_leaf_paths_in_document_order() {
        let paths = parse_tag_tree(TREE, "::").expect("valid tree");
        assert_eq!(
            paths,
            vec![
                "inbox",
                "lang::go",
                "lang::rust::async",
                "lang::rust::macros",
                "archive"
            ]
        );
    }

    #[test]
    fn test_custom_separator() {
        let paths = parse_tag_tree("tags:\n  - a:\n      - b\n", "/").expect("valid tree");
        assert_eq!(paths, vec!["a/b"]);
    }

    #[test]
    fn test_rejects_malformed_trees() {
        assert!(matches!(
            parse_tag_tree("other: []", "::"),
            Err(Error::Interchange(_))
        ));
        assert!(matches!(
            parse_tag_tree("tags:\n  - {a: [x], b: [y]}\n", "::"),
            Err(Error::Interchange(_))
        ));
        assert!(matches!(
            parse_tag_tree("tags:\n  - a: value\n", "::"),
            Err(Error::Interchange(_))
        ));
        assert!(parse_tag_tree("tags: [unclosed", "::").is_err());
    }

    #[test]
    fn test_forest_links_parents_and_children() {
        let tags = tag_forest(&["lang::rust::async", "lang::go", "inbox"], "::", 10);
        let expected = vec![
            Tag::new(10, "lang").with_subtags([11, 13]),
            Tag::new(11, "lang::rust").with_parent_path([10]).with_subtags([12]),
            Tag::new(12, "lang::rust::async").with_parent_path([10, 11]),
            Tag::new(13, "lang::go").with_parent_path([10]),
            Tag::new(14, "inbox"),
        ];
        assert_eq!(tags, expected);
    }

    #[test]
    fn test_forest_from_parsed_tree() {
        let paths = parse_tag_tree(TREE, "::").expect("valid tree");
        let tags = tag_forest(&paths, "::", 1);
        let names: Vec<&str> = tags.iter().map(|tag| tag.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "inbox",
                "lang",
                "lang::go",
                "lang::rust",
                "lang::rust::async",
                "lang::rust::macros",
                "archive"
            ]
        );
    }
}
