//! Reading tag trees and document sections
//!
//! - [`parse_tag_tree`] / [`tag_forest`]: YAML tag trees to [`Tag`](crate::model::Tag)s
//! - [`tags_section`] / [`links_section`]: metadata sections of markdown documents

mod markdown;
mod tag_tree;

pub use markdown::{links_section, tags_section, LinkSection, MarkdownLink};
pub use tag_tree::{parse_tag_tree, tag_forest};
