use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use crate::assets;
use crate::card::{self, Node};
use crate::config;
use crate::discussions::{self, DiscussionLink, KnownDiscussion};
use crate::github;
use crate::page;
use crate::profiles::{GithubProfileService, ProfileService, StaticProfileService};
use crate::resolver;
use crate::scan::{self, MentionState};
use crate::storage;

#[derive(Debug, Default, Clone, Copy)]
struct PageStats {
    mentions: usize,
    rendered: usize,
    fallback: usize,
}

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    run_with_config(cfg)
}

pub fn run_with_config(cfg: config::Config) -> Result<()> {
    let docs_dir = cfg.site.docs_dir.clone();
    if !docs_dir.is_dir() {
        bail!("docs directory {} not found", docs_dir.display());
    }
    let out_dir = cfg.site.out_dir.clone().unwrap_or_else(|| docs_dir.clone());

    let store = if cfg.cache.enabled {
        match storage::Store::open(storage::Options {
            path: cfg.cache.path.clone(),
        }) {
            Ok(store) => Some(store),
            Err(err) => {
                log::warn!("discussion cache unavailable: {:#}", err);
                None
            }
        }
    } else {
        None
    };

    if let Some(store) = &store {
        if let Ok(ttl) = chrono::Duration::from_std(cfg.cache.ttl) {
            match store.prune_stale(chrono::Utc::now() - ttl) {
                Ok(removed) if removed > 0 => {
                    log::debug!("pruned {} stale cache entries", removed)
                }
                Ok(_) => {}
                Err(err) => log::warn!("cache prune failed: {:#}", err),
            }
        }
    }

    let client = Arc::new(
        github::Client::new(github::ClientConfig {
            user_agent: cfg.github.user_agent.clone(),
            base_url: cfg.github.api_base.clone(),
            http_client: None,
        })
        .context("build api client")?,
    );

    let mut services: Vec<Arc<dyn ProfileService>> = Vec::new();
    if !cfg.github.known_profiles.is_empty() {
        services.push(Arc::new(StaticProfileService::new(
            cfg.github.known_profiles.clone(),
            cfg.github.profile_host.clone(),
        )));
    }
    services.push(Arc::new(GithubProfileService::new(client.clone())));

    let pool = resolver::Pool::new(
        services,
        resolver::Config {
            workers: cfg.resolver.workers,
            profile_host: cfg.github.profile_host.clone(),
        },
    );

    let finder = if cfg.discussions.repo.is_empty() {
        None
    } else {
        let known = cfg
            .discussions
            .known
            .iter()
            .map(|(id, entry)| {
                (
                    id.clone(),
                    KnownDiscussion {
                        number: entry.number,
                        comments: entry.comments,
                    },
                )
            })
            .collect();
        Some(discussions::Finder::new(
            client.clone(),
            store.clone(),
            discussions::FinderConfig {
                repo: cfg.discussions.repo.clone(),
                known,
                cache_ttl: cfg.cache.ttl,
            },
        ))
    };

    let pages = collect_pages(&docs_dir)?;
    log::info!("annotating {} pages under {}", pages.len(), docs_dir.display());

    let progress = ProgressBar::new(pages.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut totals = PageStats::default();
    for rel in &pages {
        progress.set_message(rel.display().to_string());
        let stats = process_page(
            &pool,
            finder.as_ref(),
            &cfg.github.profile_host,
            &docs_dir,
            &out_dir,
            rel,
        )
        .with_context(|| format!("annotate {}", rel.display()))?;
        totals.mentions += stats.mentions;
        totals.rendered += stats.rendered;
        totals.fallback += stats.fallback;
        progress.inc(1);
    }
    progress.finish_and_clear();

    assets::write_assets(
        &out_dir,
        Some(cfg.site.measurement_id.as_str()).filter(|id| !id.is_empty()),
    )
    .context("write assets")?;

    log::info!(
        "done: {} pages, {} mentions ({} rendered, {} fallback)",
        pages.len(),
        totals.mentions,
        totals.rendered,
        totals.fallback
    );
    println!(
        "Annotated {} pages ({} mentions, {} rendered, {} fallback).",
        pages.len(),
        totals.mentions,
        totals.rendered,
        totals.fallback
    );
    Ok(())
}

const ANNOTATION_MARKERS: &[&str] = &["class=\"profiles-row\"", "class=\"discussion-link\""];

/// A page produced by an earlier run already carries its fragments;
/// splicing again would duplicate them.
fn is_annotated(text: &str) -> bool {
    ANNOTATION_MARKERS.iter().any(|marker| text.contains(marker))
}

fn collect_pages(docs_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages = Vec::new();
    for entry in WalkDir::new(docs_dir) {
        let entry = entry.context("walk docs directory")?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|ext| ext.to_str()) != Some("md") {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(docs_dir)
            .context("relative page path")?
            .to_path_buf();
        pages.push(rel);
    }
    pages.sort();
    Ok(pages)
}

fn process_page(
    pool: &resolver::Pool,
    finder: Option<&discussions::Finder>,
    profile_host: &str,
    docs_dir: &Path,
    out_dir: &Path,
    rel: &Path,
) -> Result<PageStats> {
    let src = docs_dir.join(rel);
    let text = fs::read_to_string(&src)
        .with_context(|| format!("read page {}", src.display()))?;
    let info = page::page_info(rel, &text);

    if is_annotated(&text) {
        log::debug!("{} already annotated, skipping", rel.display());
        write_page(out_dir, rel, &text)?;
        return Ok(PageStats::default());
    }

    // Dedup set is scoped to this page run.
    let mut seen = HashSet::new();
    let mut mentions = scan::scan_page(&text, &mut seen);

    // Every mention starts out as a loading placeholder; each resolution
    // replaces only its own slot, whatever order completions arrive in.
    let mut slots: Vec<Node> = mentions
        .iter()
        .map(|mention| card::loading_placeholder(&mention.handle))
        .collect();
    let receivers: Vec<_> = mentions
        .iter_mut()
        .map(|mention| {
            mention.mark_loading();
            pool.enqueue(&mention.handle)
        })
        .collect();

    let mut stats = PageStats {
        mentions: mentions.len(),
        ..PageStats::default()
    };
    for (idx, rx) in receivers.into_iter().enumerate() {
        match rx.recv() {
            Ok(resolution) => {
                if resolution.state == MentionState::Rendered {
                    mentions[idx].mark_rendered();
                    stats.rendered += 1;
                } else {
                    mentions[idx].mark_fallback();
                    stats.fallback += 1;
                }
                slots[idx] = resolution.node;
            }
            Err(_) => {
                mentions[idx].mark_fallback();
                stats.fallback += 1;
                slots[idx] = card::plain_link(profile_host, &mentions[idx].handle);
            }
        }
    }

    let mut by_offset: BTreeMap<usize, Vec<Node>> = BTreeMap::new();
    for (mention, node) in mentions.iter().zip(slots) {
        by_offset.entry(mention.insert_at).or_default().push(node);
    }

    let mut inserts: Vec<(usize, String)> = by_offset
        .into_iter()
        .map(|(at, cards)| (at, card::profiles_row(cards).to_html()))
        .collect();

    if let Some(finder) = finder {
        let fragment = match finder.find(&info) {
            DiscussionLink::Existing { url, comments } => card::discussion_existing(&url, comments),
            DiscussionLink::New { url } => card::discussion_new(&url),
        };
        inserts.push((text.len(), fragment.to_html()));
    }

    let annotated = if inserts.is_empty() {
        text
    } else {
        scan::splice(&text, &inserts)
    };

    write_page(out_dir, rel, &annotated)?;

    Ok(stats)
}

fn write_page(out_dir: &Path, rel: &Path, text: &str) -> Result<()> {
    let dest = out_dir.join(rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&dest, text).with_context(|| format!("write page {}", dest.display()))
}
