//! Rewrites asset URLs inside HTML and CSS files so they point at a CDN.
//!
//! The lookup dictionary is the full list of candidate names: a relative URL is rewritten
//! only when it names one of the files being deployed. Rewritten URLs are absolute, so running
//! the rewrite twice leaves the content unchanged.

use futures::future::try_join_all;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, error, info};

use crate::catalog::FileEntry;
use crate::error::{DeployError, Result};

static REWRITE_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(html|css)$").expect("static pattern"));

// Quoted attribute values for the usual URL-bearing attributes, and CSS url(...) in its
// three quoting styles.
static URL_SITES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
        \b(?:src|href|data-src|poster)\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')
        |
        url\(\s*(?:"(?P<cdq>[^"]*)"|'(?P<csq>[^']*)'|(?P<bare>[^)'"\s]+))\s*\)
        "#,
    )
    .expect("static pattern")
});

/// CDN settings. Absent settings disable rewriting entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnOptions {
    /// Absolute CDN base, e.g. `https://cdn.example.com/app`.
    pub base: String,
    /// Leading path segment stripped from local URLs before lookup.
    #[serde(default)]
    pub relative_root: String,
}

impl CdnOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.base.contains("://") || self.base.starts_with("//")) {
            return Err(DeployError::configuration(format!(
                "cdn base must be an absolute URL, got {:?}",
                self.base
            )));
        }
        Ok(())
    }
}

/// Pure string transform: rewrites every known relative URL in `content`.
#[derive(Debug, Clone)]
pub struct UrlRewriter {
    base: String,
    relative_root: String,
    names: HashSet<String>,
}

impl UrlRewriter {
    pub fn new<S: AsRef<str>>(options: &CdnOptions, names: &[S]) -> Self {
        Self {
            base: options.base.trim_end_matches('/').to_string(),
            relative_root: options.relative_root.trim_matches('/').to_string(),
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
        }
    }

    pub fn rewrite(&self, content: &str) -> String {
        URL_SITES
            .replace_all(content, |caps: &Captures| self.rewrite_site(caps))
            .into_owned()
    }

    fn rewrite_site(&self, caps: &Captures) -> String {
        let whole = &caps[0];
        let Some(url) = ["dq", "sq", "cdq", "csq", "bare"]
            .iter()
            .find_map(|group| caps.name(group))
        else {
            return whole.to_string();
        };
        let Some(replacement) = self.rewrite_url(url.as_str()) else {
            return whole.to_string();
        };

        let offset = url.start() - caps.get(0).map_or(0, |m| m.start());
        let mut out = String::with_capacity(whole.len() + replacement.len());
        out.push_str(&whole[..offset]);
        out.push_str(&replacement);
        out.push_str(&whole[offset + url.len()..]);
        out
    }

    /// Returns the CDN form of `url`, or `None` when it must stay as is.
    pub fn rewrite_url(&self, url: &str) -> Option<String> {
        if url.is_empty()
            || url.starts_with("//")
            || url.starts_with('#')
            || url.contains("://")
            || url.starts_with("data:")
            || url.starts_with("mailto:")
        {
            return None;
        }

        let split = url.find(['?', '#']).unwrap_or(url.len());
        let (path, suffix) = url.split_at(split);

        let mut path = path;
        while let Some(rest) = path.strip_prefix("./") {
            path = rest;
        }
        let mut path = path.trim_start_matches('/');
        if !self.relative_root.is_empty() {
            if let Some(rest) = path
                .strip_prefix(self.relative_root.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                path = rest;
            }
        }

        self.names
            .contains(path)
            .then(|| format!("{}/{}{}", self.base, path, suffix))
    }
}

/// Drops later entries whose name was already seen. First occurrence wins, order is kept.
pub fn dedupe_by_name(files: Vec<FileEntry>) -> Vec<FileEntry> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .filter(|file| seen.insert(file.name.clone()))
        .collect()
}

/// True for names the rewriter edits in place.
pub fn is_rewrite_target(name: &str) -> bool {
    REWRITE_TARGET.is_match(name)
}

/// The content-rewrite stage of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ContentRewriter {
    cdn: Option<CdnOptions>,
}

impl ContentRewriter {
    pub fn new(cdn: Option<CdnOptions>) -> Self {
        Self { cdn }
    }

    pub fn is_enabled(&self) -> bool {
        self.cdn.is_some()
    }

    /// Rewrites HTML/CSS files among `files` (plus `html_files`, resolved against `directory`).
    ///
    /// Extra `html_files` feed the dictionary and get rewritten, but only names that were
    /// already candidates are returned. Rewrite targets come first in the result, followed by
    /// the untouched files. Any read or write failure aborts the whole step.
    pub async fn rewrite(
        &self,
        files: Vec<FileEntry>,
        html_files: &[String],
        directory: &Path,
    ) -> Result<Vec<FileEntry>> {
        let Some(cdn) = &self.cdn else {
            return Ok(files);
        };

        let candidates: HashSet<String> = files.iter().map(|f| f.name.clone()).collect();
        let all: Vec<FileEntry> = html_files
            .iter()
            .map(|name| FileEntry::new(name.as_str(), directory.join(name)))
            .chain(files)
            .collect();

        let names: Vec<&str> = all.iter().map(|f| f.name.as_str()).collect();
        let rewriter = UrlRewriter::new(cdn, &names);

        let (targets, others): (Vec<FileEntry>, Vec<FileEntry>) = dedupe_by_name(all)
            .into_iter()
            .partition(|file| is_rewrite_target(&file.name));

        info!(
            targets = targets.len(),
            others = others.len(),
            cdn_base = %cdn.base,
            "[DEPLOY] Rewriting CDN URLs"
        );

        let rewritten = try_join_all(targets.into_iter().map(|file| {
            let rewriter = &rewriter;
            async move {
                rewrite_file(rewriter, &file.path).await?;
                Ok::<_, DeployError>(file)
            }
        }))
        .await?;

        Ok(rewritten
            .into_iter()
            .chain(others)
            .filter(|file| candidates.contains(&file.name))
            .collect())
    }
}

async fn rewrite_file(rewriter: &UrlRewriter, path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        error!(error = ?e, path = %path.display(), "[DEPLOY][ERROR] Failed to read file for rewriting");
        DeployError::Rewrite {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    let rewritten = rewriter.rewrite(&content);
    tokio::fs::write(path, rewritten).await.map_err(|e| {
        error!(error = ?e, path = %path.display(), "[DEPLOY][ERROR] Failed to write rewritten file");
        DeployError::Rewrite {
            path: path.to_path_buf(),
            source: e,
        }
    })?;
    debug!(path = %path.display(), "Rewrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter(names: &[&str]) -> UrlRewriter {
        UrlRewriter::new(
            &CdnOptions {
                base: "https://cdn.example.com/".into(),
                relative_root: String::new(),
            },
            names,
        )
    }

    #[test]
    fn rewrites_known_urls_only() {
        let r = rewriter(&["app.js", "img/logo.png"]);
        let html = r#"<script src="/app.js?v=2"></script><img src='./img/logo.png'><a href="other.html">"#;
        assert_eq!(
            r.rewrite(html),
            r#"<script src="https://cdn.example.com/app.js?v=2"></script><img src='https://cdn.example.com/img/logo.png'><a href="other.html">"#
        );
    }

    #[test]
    fn rewrites_css_urls() {
        let r = rewriter(&["img/bg.png"]);
        let css = "body { background: url(img/bg.png); } .x { background: url( \"/img/bg.png\" ) }";
        assert_eq!(
            r.rewrite(css),
            "body { background: url(https://cdn.example.com/img/bg.png); } .x { background: url( \"https://cdn.example.com/img/bg.png\" ) }"
        );
    }

    #[test]
    fn rewriting_is_idempotent() {
        let r = rewriter(&["app.js", "style.css"]);
        let html = r#"<link href="style.css"><script src="app.js"></script>"#;
        let once = r.rewrite(html);
        assert_eq!(r.rewrite(&once), once);
    }

    #[test]
    fn relative_root_is_stripped() {
        let r = UrlRewriter::new(
            &CdnOptions {
                base: "//cdn.example.com".into(),
                relative_root: "/static/".into(),
            },
            &["app.js"],
        );
        assert_eq!(
            r.rewrite_url("/static/app.js").as_deref(),
            Some("//cdn.example.com/app.js")
        );
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let files = vec![
            FileEntry::new("a", "/first/a"),
            FileEntry::new("b", "/b"),
            FileEntry::new("a", "/second/a"),
        ];
        assert_eq!(
            dedupe_by_name(files),
            vec![FileEntry::new("a", "/first/a"), FileEntry::new("b", "/b")]
        );
    }
}
