use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Styles for the fragments spliced into pages. Shipped as one stylesheet
/// instead of per-page style blocks.
pub const STYLESHEET: &str = r#".profiles-row {
  display: flex;
  flex-wrap: wrap;
  gap: 10px;
  margin: 10px 0;
}
.profile-card {
  display: flex;
  flex: 1 1 250px;
  min-width: 200px;
  max-width: 300px;
  border: 1px solid #e1e4e8;
  border-radius: 6px;
  padding: 10px;
  background-color: #f6f8fa;
}
.profile-image img {
  width: 50px;
  height: 50px;
  border-radius: 50%;
  margin-right: 10px;
}
.profile-avatar-placeholder {
  width: 50px;
  height: 50px;
  border-radius: 50%;
  margin-right: 10px;
  background-color: #0366d6;
  color: white;
  display: flex;
  align-items: center;
  justify-content: center;
  font-size: 24px;
  font-weight: bold;
}
.profile-info h4 {
  margin: 0 0 5px 0;
  font-size: 0.95em;
}
.profile-info .username {
  margin: 0 0 5px 0;
  font-size: 0.8em;
  color: #586069;
}
.profile-info .bio {
  margin: 5px 0 0 0;
  font-size: 0.85em;
  color: #586069;
}
.loading {
  font-style: italic;
  color: #586069;
  font-size: 0.9em;
}
.discussion-link {
  margin-top: 2rem;
  padding: 1rem 0;
}
.discussion-link a {
  display: inline-block;
  padding: 0.5rem 1rem;
  border: 1px solid #ddd;
  border-radius: 4px;
  text-decoration: none;
}
.discussion-link .login-note {
  font-size: 0.8rem;
  color: #666;
  margin-top: 0.5rem;
}
.comment-count {
  display: inline-block;
  margin-left: 8px;
  padding: 2px 6px;
  background-color: #f1f8ff;
  border-radius: 10px;
  font-size: 0.85rem;
  color: #0366d6;
}
"#;

/// Page-view tracking snippet, parameterized by the measurement ID.
pub fn analytics_snippet(measurement_id: &str) -> String {
    format!(
        r#"window.dataLayer = window.dataLayer || [];
function gtag(){{dataLayer.push(arguments);}}
gtag('js', new Date());
gtag('config', '{id}');

document.addEventListener('DOMContentLoaded', function() {{
  gtag('event', 'page_view', {{
    page_title: document.title,
    page_location: window.location.href,
    page_path: window.location.pathname
  }});
}});
"#,
        id = measurement_id
    )
}

/// Writes the shared assets into the docs tree and returns the paths
/// written. The analytics snippet is only generated when a measurement ID
/// is configured.
pub fn write_assets(docs_dir: &Path, measurement_id: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let css_dir = docs_dir.join("css");
    fs::create_dir_all(&css_dir)
        .with_context(|| format!("assets: create directory {}", css_dir.display()))?;
    let css_path = css_dir.join("sitenotes.css");
    fs::write(&css_path, STYLESHEET)
        .with_context(|| format!("assets: write {}", css_path.display()))?;
    written.push(css_path);

    if let Some(id) = measurement_id.filter(|id| !id.trim().is_empty()) {
        let js_dir = docs_dir.join("js");
        fs::create_dir_all(&js_dir)
            .with_context(|| format!("assets: create directory {}", js_dir.display()))?;
        let js_path = js_dir.join("analytics.js");
        fs::write(&js_path, analytics_snippet(id))
            .with_context(|| format!("assets: write {}", js_path.display()))?;
        written.push(js_path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_stylesheet_always() {
        let dir = tempdir().unwrap();
        let written = write_assets(dir.path(), None).unwrap();
        assert_eq!(written.len(), 1);
        assert!(dir.path().join("css/sitenotes.css").exists());
        assert!(!dir.path().join("js/analytics.js").exists());
    }

    #[test]
    fn writes_analytics_with_measurement_id() {
        let dir = tempdir().unwrap();
        let written = write_assets(dir.path(), Some("G-TEST123")).unwrap();
        assert_eq!(written.len(), 2);
        let js = std::fs::read_to_string(dir.path().join("js/analytics.js")).unwrap();
        assert!(js.contains("G-TEST123"));
        assert!(js.contains("page_view"));
    }
}
