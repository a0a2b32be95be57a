//! Tag and link sections of markdown documents
//!
//! Documents carry their metadata in plain sections:
//!
//! ```markdown
//! # Tags
//! lang::rust, reading
//!
//! # Links
//! - (The Book)[https://doc.rust-lang.org/book/]
//! ```
//!
//! Only reading is supported; the sections are never rewritten here.

use std::sync::LazyLock;

use regex::Regex;

/// `- (Title)[URL]`
static LINK_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- \((.*)\)\[(.*)\]$").expect("link item regex is valid")
});

const TAGS_HEADING: &str = "# Tags";

/// A section holding link items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSection {
    Links,
    Backlinks,
}

impl LinkSection {
    pub fn heading(self) -> &'static str {
        match self {
            Self::Links => "# Links",
            Self::Backlinks => "# Backlinks",
        }
    }
}

/// One `- (Title)[URL]` item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownLink {
    pub title: String,
    pub url: String,
}

/// Lines after the line exactly equal to `heading`, up to the next heading
fn section<'m>(markdown: &'m str, heading: &str) -> Option<impl Iterator<Item = &'m str>> {
    let mut lines = markdown.lines();
    lines.by_ref().find(|line| line.trim_end() == heading)?;
    Some(lines.take_while(|line| !line.starts_with('#')))
}

/// Tag names listed under `# Tags`
///
/// The list is the first non-blank line of the section, comma-separated.
pub fn tags_section(markdown: &str) -> Vec<String> {
    let Some(mut lines) = section(markdown, TAGS_HEADING) else {
        return Vec::new();
    };
    lines
        .find(|line| !line.trim().is_empty())
        .map(|line| {
            line.split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Link items of the `kind` section; other lines are ignored
pub fn links_section(markdown: &str, kind: LinkSection) -> Vec<MarkdownLink> {
    let Some(lines) = section(markdown, kind.heading()) else {
        return Vec::new();
    };
    lines
        .filter_map(|line| LINK_ITEM.captures(line.trim_end()))
        .map(|captures| MarkdownLink {
            title: captures[1].to_string(),
            url: captures[2].to_string(),
        })
        .collect()
}
