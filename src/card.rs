use crate::profiles::Profile;

/// Fragment tree spliced into annotated pages. Markup is always built from
/// nodes and escaped at render time, never concatenated from raw strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element {
        tag: &'static str,
        attrs: Vec<(&'static str, String)>,
        children: Vec<Node>,
    },
    Text(String),
}

const VOID_TAGS: &[&str] = &["img", "hr", "br"];

impl Node {
    pub fn element(tag: &'static str) -> Self {
        Node::Element {
            tag,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text<T: Into<String>>(content: T) -> Self {
        Node::Text(content.into())
    }

    pub fn attr<V: Into<String>>(mut self, name: &'static str, value: V) -> Self {
        if let Node::Element { attrs, .. } = &mut self {
            attrs.push((name, value.into()));
        }
        self
    }

    pub fn child(mut self, node: Node) -> Self {
        if let Node::Element { children, .. } = &mut self {
            children.push(node);
        }
        self
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(&escape_html(text)),
            Node::Element {
                tag,
                attrs,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value));
                    out.push('"');
                }
                if VOID_TAGS.contains(tag) && children.is_empty() {
                    out.push_str(" />");
                    return;
                }
                out.push('>');
                for child in children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    /// Returns true if any element in the tree carries the given tag.
    pub fn contains_tag(&self, wanted: &str) -> bool {
        match self {
            Node::Text(_) => false,
            Node::Element { tag, children, .. } => {
                *tag == wanted || children.iter().any(|child| child.contains_tag(wanted))
            }
        }
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn profile_url(host: &str, handle: &str) -> String {
    format!("https://{}/{}", host, handle)
}

/// Marker shown while a mention's lookup is in flight. Replaced wholesale by
/// the resolved fragment.
pub fn loading_placeholder(handle: &str) -> Node {
    Node::element("span")
        .attr("class", "profile-loading loading")
        .child(Node::text(format!("Loading profile for @{}", handle)))
}

/// Rich card for a successfully resolved profile. Everything links to the
/// external profile URL; the display name falls back to the raw handle.
pub fn profile_card(profile: &Profile) -> Node {
    let display_name = profile
        .name
        .clone()
        .unwrap_or_else(|| profile.login.clone());

    let image = match &profile.avatar_url {
        Some(avatar) => Node::element("a").attr("href", &profile.html_url).child(
            Node::element("img")
                .attr("src", avatar)
                .attr("alt", format!("{}'s avatar", display_name)),
        ),
        None => Node::element("a")
            .attr("href", &profile.html_url)
            .child(initial_avatar(&profile.login)),
    };

    let mut info = Node::element("div")
        .attr("class", "profile-info")
        .child(
            Node::element("h4").child(
                Node::element("a")
                    .attr("href", &profile.html_url)
                    .child(Node::text(display_name)),
            ),
        )
        .child(
            Node::element("p")
                .attr("class", "username")
                .child(Node::text(format!("@{}", profile.login))),
        );
    if let Some(bio) = &profile.bio {
        info = info.child(
            Node::element("p")
                .attr("class", "bio")
                .child(Node::text(bio.clone())),
        );
    }

    Node::element("div")
        .attr("class", "profile-card")
        .child(Node::element("div").attr("class", "profile-image").child(image))
        .child(info)
}

fn initial_avatar(handle: &str) -> Node {
    let initial = handle
        .chars()
        .next()
        .map(|ch| ch.to_ascii_uppercase().to_string())
        .unwrap_or_default();
    Node::element("div")
        .attr("class", "profile-avatar-placeholder")
        .child(Node::text(initial))
}

/// Lightweight fallback when a lookup fails: a plain link to the external
/// profile, no image element that would require another network call.
pub fn plain_link(host: &str, handle: &str) -> Node {
    Node::element("p").attr("class", "profile-link").child(
        Node::element("a")
            .attr("href", profile_url(host, handle))
            .child(Node::text(format!("@{}", handle))),
    )
}

/// Wraps the cards generated for one source block.
pub fn profiles_row(cards: Vec<Node>) -> Node {
    let mut row = Node::element("div").attr("class", "profiles-row");
    for card in cards {
        row = row.child(card);
    }
    row
}

pub fn discussion_existing(url: &str, comments: i64) -> Node {
    let noun = if comments == 1 { "comment" } else { "comments" };
    Node::element("div")
        .attr("class", "discussion-link")
        .child(Node::element("hr"))
        .child(
            Node::element("p")
                .child(
                    Node::element("a")
                        .attr("href", url)
                        .child(Node::text("Join the discussion for this page")),
                )
                .child(
                    Node::element("span")
                        .attr("class", "comment-count")
                        .child(Node::text(format!("{} {}", comments, noun))),
                ),
        )
}

pub fn discussion_new(url: &str) -> Node {
    Node::element("div")
        .attr("class", "discussion-link")
        .child(Node::element("hr"))
        .child(
            Node::element("p")
                .child(
                    Node::element("a")
                        .attr("href", url)
                        .child(Node::text("Start a discussion for this page")),
                )
                .child(
                    Node::element("span")
                        .attr("class", "login-note")
                        .child(Node::text(
                            "(An account is required to create or participate in discussions)",
                        )),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> Profile {
        Profile {
            login: "octocat".into(),
            name: Some("The Octocat".into()),
            avatar_url: Some("https://avatars.example/octocat.png".into()),
            bio: Some("Mascot".into()),
            html_url: "https://github.com/octocat".into(),
        }
    }

    #[test]
    fn escapes_text_and_attributes() {
        let node = Node::element("a")
            .attr("href", "https://example.com/?a=1&b=2")
            .child(Node::text("<script>"));
        let html = node.to_html();
        assert!(html.contains("a=1&amp;b=2"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn card_uses_display_name_and_profile_url() {
        let html = profile_card(&sample_profile()).to_html();
        assert!(html.contains("The Octocat"));
        assert!(html.contains("@octocat"));
        assert!(html.contains("https://github.com/octocat"));
        assert!(html.contains("Mascot"));
    }

    #[test]
    fn card_falls_back_to_handle_without_display_name() {
        let mut profile = sample_profile();
        profile.name = None;
        let html = profile_card(&profile).to_html();
        assert!(html.contains(">octocat</a>"));
    }

    #[test]
    fn card_without_avatar_renders_initial_placeholder() {
        let mut profile = sample_profile();
        profile.avatar_url = None;
        let node = profile_card(&profile);
        assert!(!node.contains_tag("img"));
        assert!(node.to_html().contains(">O</div>"));
    }

    #[test]
    fn plain_link_has_no_image() {
        let node = plain_link("github.com", "octocat");
        assert!(!node.contains_tag("img"));
        assert!(node.to_html().contains("https://github.com/octocat"));
    }

    #[test]
    fn discussion_comment_count_pluralizes() {
        assert!(discussion_existing("https://x", 1).to_html().contains("1 comment<"));
        assert!(discussion_existing("https://x", 4).to_html().contains("4 comments"));
    }
}
