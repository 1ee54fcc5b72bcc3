use std::collections::HashSet;

use once_cell::sync::Lazy;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use regex::Regex;

static HANDLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@([A-Za-z0-9-]+)").expect("handle pattern")
});

/// Lifecycle of a single mention. Terminal states never transition back to
/// `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionState {
    Discovered,
    Loading,
    Rendered,
    FallbackRendered,
}

#[derive(Debug, Clone)]
pub struct Mention {
    pub handle: String,
    /// Byte offset at the end of the enclosing top-level block, where the
    /// rendered fragment is spliced in.
    pub insert_at: usize,
    pub state: MentionState,
}

impl Mention {
    pub fn mark_loading(&mut self) -> bool {
        if self.state == MentionState::Discovered {
            self.state = MentionState::Loading;
            return true;
        }
        false
    }

    pub fn mark_rendered(&mut self) -> bool {
        if self.state == MentionState::Loading {
            self.state = MentionState::Rendered;
            return true;
        }
        false
    }

    pub fn mark_fallback(&mut self) -> bool {
        if self.state == MentionState::Loading {
            self.state = MentionState::FallbackRendered;
            return true;
        }
        false
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            MentionState::Rendered | MentionState::FallbackRendered
        )
    }
}

fn parse_options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts.insert(Options::ENABLE_FOOTNOTES);
    opts
}

// Fixed allow-list of text-bearing blocks; code blocks, raw HTML, and
// metadata are never scanned.
fn scanned_start(tag: &Tag<'_>) -> bool {
    matches!(
        tag,
        Tag::Paragraph | Tag::Heading { .. } | Tag::Item | Tag::BlockQuote | Tag::TableCell
    )
}

fn scanned_end(tag: &TagEnd) -> bool {
    matches!(
        tag,
        TagEnd::Paragraph
            | TagEnd::Heading(_)
            | TagEnd::Item
            | TagEnd::BlockQuote
            | TagEnd::TableCell
    )
}

/// Scans page text for handle mentions, left to right. `seen` is the dedup
/// set for this page run, owned by the caller: a handle already present is
/// skipped, retained handles are added.
pub fn scan_page(text: &str, seen: &mut HashSet<String>) -> Vec<Mention> {
    let mut blocks: Vec<usize> = Vec::new();
    let mut mentions = Vec::new();

    for (event, range) in Parser::new_ext(text, parse_options()).into_offset_iter() {
        match event {
            Event::Start(tag) if scanned_start(&tag) => blocks.push(range.end),
            Event::End(tag) if scanned_end(&tag) => {
                blocks.pop();
            }
            Event::Text(chunk) => {
                if let Some(&insert_at) = blocks.first() {
                    collect_handles(&chunk, insert_at, seen, &mut mentions);
                }
            }
            _ => {}
        }
    }

    mentions
}

fn collect_handles(
    chunk: &str,
    insert_at: usize,
    seen: &mut HashSet<String>,
    out: &mut Vec<Mention>,
) {
    for caps in HANDLE_PATTERN.captures_iter(chunk) {
        let whole = caps.get(0).expect("match");
        if !boundary_ok(chunk, whole.start(), whole.end()) {
            continue;
        }
        let handle = caps.get(1).expect("capture").as_str();
        if !seen.insert(handle.to_string()) {
            continue;
        }
        out.push(Mention {
            handle: handle.to_string(),
            insert_at,
            state: MentionState::Discovered,
        });
    }
}

// A match must be preceded by whitespace or sit at the start of the text
// run, and must not butt up against another `@` (email-like text).
fn boundary_ok(text: &str, start: usize, end: usize) -> bool {
    if let Some(prev) = text[..start].chars().next_back() {
        if !prev.is_whitespace() {
            return false;
        }
    }
    if let Some(next) = text[end..].chars().next() {
        if next == '@' {
            return false;
        }
    }
    true
}

/// Splices HTML fragments into page text at the recorded byte offsets. The
/// offsets come from the parser, so they are always char boundaries.
pub fn splice(text: &str, inserts: &[(usize, String)]) -> String {
    let mut ordered: Vec<&(usize, String)> = inserts.iter().collect();
    ordered.sort_by_key(|(at, _)| *at);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (at, html) in ordered {
        let at = (*at).min(text.len()).max(cursor);
        out.push_str(&text[cursor..at]);
        out.push_str("\n\n");
        out.push_str(html);
        out.push('\n');
        cursor = at;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Vec<Mention> {
        let mut seen = HashSet::new();
        scan_page(text, &mut seen)
    }

    #[test]
    fn finds_every_wellformed_mention() {
        let mentions = scan("Thanks to @alice and @bob-dev for the review.\n");
        let handles: Vec<_> = mentions.iter().map(|m| m.handle.as_str()).collect();
        assert_eq!(handles, vec!["alice", "bob-dev"]);
    }

    #[test]
    fn duplicates_collapse_to_unique_handles() {
        let mentions = scan("@alice wrote this.\n\n@alice also reviewed it.\n");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].handle, "alice");
    }

    #[test]
    fn dedup_set_spans_calls_when_shared() {
        let mut seen = HashSet::new();
        assert_eq!(scan_page("Ping @alice\n", &mut seen).len(), 1);
        assert_eq!(scan_page("Ping @alice again\n", &mut seen).len(), 0);
    }

    #[test]
    fn email_addresses_never_match() {
        assert!(scan("Contact user@example.com for access.\n").is_empty());
    }

    #[test]
    fn doubled_at_is_rejected() {
        assert!(scan("Strange token @alice@example\n").is_empty());
    }

    #[test]
    fn mention_at_start_of_text_matches_once() {
        let mentions = scan("@alice opened the project.\n");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].handle, "alice");
    }

    #[test]
    fn code_blocks_are_not_scanned() {
        let text = "```\n@alice\n```\n\nreal mention of @bob\n";
        let mentions = scan(text);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].handle, "bob");
    }

    #[test]
    fn scans_headings_lists_quotes_and_tables() {
        let text = "\
# Intro by @hana

- point raised by @imre

> quoted from @jules

| col |
|-----|
| see @kara |
";
        let handles: Vec<_> = scan(text).into_iter().map(|m| m.handle).collect();
        assert_eq!(handles, vec!["hana", "imre", "jules", "kara"]);
    }

    #[test]
    fn insert_offset_is_end_of_enclosing_block() {
        let text = "First paragraph with @alice here.\n\nSecond paragraph.\n";
        let mentions = scan(text);
        assert_eq!(mentions.len(), 1);
        let at = mentions[0].insert_at;
        assert!(at <= text.find("Second").unwrap());
        assert!(at >= text.find("here.").unwrap());
    }

    #[test]
    fn splice_inserts_fragment_between_blocks() {
        let text = "Intro @alice\n\nOutro\n";
        let mentions = scan(text);
        let inserts = vec![(mentions[0].insert_at, "<div>card</div>".to_string())];
        let out = splice(text, &inserts);
        let card_pos = out.find("<div>card</div>").unwrap();
        assert!(card_pos > out.find("Intro").unwrap());
        assert!(card_pos < out.find("Outro").unwrap());
    }

    #[test]
    fn state_machine_only_moves_forward() {
        let mut mention = scan("hi @alice\n").remove(0);
        assert_eq!(mention.state, MentionState::Discovered);
        assert!(mention.mark_loading());
        assert!(!mention.mark_loading());
        assert!(mention.mark_rendered());
        assert!(mention.is_terminal());
        assert!(!mention.mark_fallback());
        assert_eq!(mention.state, MentionState::Rendered);
    }
}
