use std::path::Path;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// Identity of a docs page, derived from its path within the docs tree and
/// its content. The identifier (last path segment) is what discussion
/// matching keys on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub path: String,
    pub identifier: String,
    pub title: String,
}

pub fn page_info(rel_path: &Path, text: &str) -> PageInfo {
    let path = normalize_path(rel_path);
    let identifier = path
        .rsplit('/')
        .next()
        .unwrap_or(path.as_str())
        .to_string();
    let title = first_heading(text).unwrap_or_else(|| identifier.clone());
    PageInfo {
        path,
        identifier,
        title,
    }
}

/// Normalizes a docs-relative file path into a page path: forward slashes,
/// no extension, empty paths collapse to "index".
fn normalize_path(rel_path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in rel_path.components() {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }
    let mut joined = parts.join("/");
    for ext in [".md", ".html"] {
        if let Some(stripped) = joined.strip_suffix(ext) {
            joined = stripped.to_string();
            break;
        }
    }
    let trimmed = joined.trim_end_matches('/');
    if trimmed.is_empty() {
        "index".to_string()
    } else {
        trimmed.to_string()
    }
}

fn first_heading(text: &str) -> Option<String> {
    let parser = Parser::new_ext(text, Options::empty());
    let mut in_heading = false;
    let mut buffer = String::new();
    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => in_heading = true,
            Event::End(TagEnd::Heading(_)) => {
                let title = buffer.trim().to_string();
                if !title.is_empty() {
                    return Some(title);
                }
                in_heading = false;
                buffer.clear();
            }
            Event::Text(chunk) | Event::Code(chunk) if in_heading => buffer.push_str(&chunk),
            _ => {}
        }
    }
    None
}
