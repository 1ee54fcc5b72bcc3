use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::github;
use crate::page::PageInfo;
use crate::storage::{DiscussionEntry, Store};

/// Hard-wired mapping for pages whose discussion already exists, consulted
/// before the cache and the search endpoint.
#[derive(Debug, Clone)]
pub struct KnownDiscussion {
    pub number: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscussionLink {
    Existing { url: String, comments: i64 },
    New { url: String },
}

#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// "owner/name" slug of the repository hosting the discussions.
    pub repo: String,
    pub known: HashMap<String, KnownDiscussion>,
    pub cache_ttl: Duration,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            known: HashMap::new(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

pub struct Finder {
    client: Arc<github::Client>,
    store: Option<Store>,
    cfg: FinderConfig,
}

impl Finder {
    pub fn new(client: Arc<github::Client>, store: Option<Store>, cfg: FinderConfig) -> Self {
        Self { client, store, cfg }
    }

    /// Resolution order: known table, fresh cache entry, then the search
    /// query ladder. First non-empty result wins; every miss or failure
    /// falls through to the next step, ending at a "start a discussion"
    /// link.
    pub fn find(&self, page: &PageInfo) -> DiscussionLink {
        if let Some(known) = self.cfg.known.get(&page.identifier) {
            return DiscussionLink::Existing {
                url: format!(
                    "https://github.com/{}/discussions/{}",
                    self.cfg.repo, known.number
                ),
                comments: known.comments,
            };
        }

        if let Some(entry) = self.cached(page) {
            return DiscussionLink::Existing {
                url: entry.url,
                comments: entry.comments,
            };
        }

        for query in self.queries(page) {
            match self.client.search_issues(&query) {
                Ok(results) => {
                    if let Some(item) = results.items.into_iter().next() {
                        self.remember(page, &item);
                        return DiscussionLink::Existing {
                            url: item.html_url,
                            comments: item.comments,
                        };
                    }
                }
                Err(err) => {
                    log::warn!("discussion search for {} failed: {}", page.path, err);
                }
            }
        }

        DiscussionLink::New {
            url: self.new_discussion_url(page),
        }
    }

    pub fn queries(&self, page: &PageInfo) -> Vec<String> {
        vec![
            format!("\"{}\" in:title repo:{}", page.identifier, self.cfg.repo),
            format!("\"{}\" in:title repo:{}", page.path, self.cfg.repo),
            format!("\"Discussion: {}\" in:title repo:{}", page.title, self.cfg.repo),
        ]
    }

    fn new_discussion_url(&self, page: &PageInfo) -> String {
        let title = format!("Discussion: {}", page.path);
        format!(
            "https://github.com/{}/discussions/new?category=q-a&title={}",
            self.cfg.repo,
            utf8_percent_encode(&title, NON_ALPHANUMERIC)
        )
    }

    fn cached(&self, page: &PageInfo) -> Option<DiscussionEntry> {
        let store = self.store.as_ref()?;
        let ttl = chrono::Duration::from_std(self.cfg.cache_ttl).ok()?;
        let cutoff = Utc::now() - ttl;
        match store.get_discussion(&page.path, cutoff) {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("discussion cache read for {} failed: {}", page.path, err);
                None
            }
        }
    }

    fn remember(&self, page: &PageInfo, item: &github::SearchItem) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let entry = DiscussionEntry {
            page_path: page.path.clone(),
            url: item.html_url.clone(),
            comments: item.comments,
            fetched_at: Utc::now(),
        };
        if let Err(err) = store.upsert_discussion(entry) {
            log::warn!("discussion cache write for {} failed: {}", page.path, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{Client, ClientConfig};
    use crate::storage::Options;
    use tempfile::tempdir;

    fn offline_client() -> Arc<Client> {
        // Nothing listens here; lookups fail with a transport error, which
        // the finder treats like an empty result.
        Arc::new(
            Client::new(ClientConfig {
                user_agent: "sitenotes-test/0".into(),
                base_url: Some("http://127.0.0.1:9".into()),
                http_client: None,
            })
            .unwrap(),
        )
    }

    fn sample_page() -> PageInfo {
        PageInfo {
            path: "experiments/allen_institute_787727_2025-03-27".into(),
            identifier: "allen_institute_787727_2025-03-27".into(),
            title: "Allen Institute 787727".into(),
        }
    }

    #[test]
    fn known_table_short_circuits() {
        let mut known = HashMap::new();
        known.insert(
            "allen_institute_787727_2025-03-27".to_string(),
            KnownDiscussion {
                number: 22,
                comments: 4,
            },
        );
        let finder = Finder::new(
            offline_client(),
            None,
            FinderConfig {
                repo: "org/repo".into(),
                known,
                ..FinderConfig::default()
            },
        );

        let link = finder.find(&sample_page());
        assert_eq!(
            link,
            DiscussionLink::Existing {
                url: "https://github.com/org/repo/discussions/22".into(),
                comments: 4,
            }
        );
    }

    #[test]
    fn fresh_cache_entry_is_used() {
        let dir = tempdir().unwrap();
        let store = Store::open(Options {
            path: Some(dir.path().join("cache.db")),
        })
        .unwrap();
        store
            .upsert_discussion(DiscussionEntry {
                page_path: sample_page().path,
                url: "https://github.com/org/repo/discussions/7".into(),
                comments: 2,
                fetched_at: Utc::now(),
            })
            .unwrap();

        let finder = Finder::new(
            offline_client(),
            Some(store),
            FinderConfig {
                repo: "org/repo".into(),
                ..FinderConfig::default()
            },
        );

        match finder.find(&sample_page()) {
            DiscussionLink::Existing { url, comments } => {
                assert_eq!(url, "https://github.com/org/repo/discussions/7");
                assert_eq!(comments, 2);
            }
            other => panic!("expected cache hit, got {:?}", other),
        }
    }

    #[test]
    fn query_ladder_order() {
        let finder = Finder::new(
            offline_client(),
            None,
            FinderConfig {
                repo: "org/repo".into(),
                ..FinderConfig::default()
            },
        );
        let queries = finder.queries(&sample_page());
        assert_eq!(queries.len(), 3);
        assert!(queries[0].starts_with("\"allen_institute_787727_2025-03-27\""));
        assert!(queries[1].contains("experiments/"));
        assert!(queries[2].starts_with("\"Discussion: Allen Institute 787727\""));
        assert!(queries.iter().all(|q| q.ends_with("repo:org/repo")));
    }

    #[test]
    fn ladder_stops_at_first_non_empty_result() {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let base = format!("http://{}", addr);
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            // Empty first page of results, then a hit; a third request
            // never arrives.
            let bodies = [
                r#"{"items":[]}"#,
                r#"{"items":[{"html_url":"https://github.com/org/repo/discussions/9","comments":3}]}"#,
            ];
            for body in bodies {
                let Ok(request) = server.recv() else { return };
                let _ = tx.send(request.url().to_string());
                let _ = request.respond(tiny_http::Response::from_string(body));
            }
        });

        let client = Arc::new(
            Client::new(ClientConfig {
                user_agent: "sitenotes-test/0".into(),
                base_url: Some(base),
                http_client: None,
            })
            .unwrap(),
        );
        let finder = Finder::new(
            client,
            None,
            FinderConfig {
                repo: "org/repo".into(),
                ..FinderConfig::default()
            },
        );

        let link = finder.find(&sample_page());
        assert_eq!(
            link,
            DiscussionLink::Existing {
                url: "https://github.com/org/repo/discussions/9".into(),
                comments: 3,
            }
        );

        let requests: Vec<String> = rx.try_iter().collect();
        assert_eq!(requests.len(), 2, "expected the ladder to stop after the hit");
        assert!(requests.iter().all(|u| u.starts_with("/search/issues?q=")));
    }

    #[test]
    fn exhausted_ladder_yields_new_discussion_link() {
        let finder = Finder::new(
            offline_client(),
            None,
            FinderConfig {
                repo: "org/repo".into(),
                ..FinderConfig::default()
            },
        );

        match finder.find(&sample_page()) {
            DiscussionLink::New { url } => {
                assert!(url.starts_with(
                    "https://github.com/org/repo/discussions/new?category=q-a&title="
                ));
                assert!(url.contains("Discussion%3A%20experiments%2F"));
            }
            other => panic!("expected new-discussion link, got {:?}", other),
        }
    }
}
