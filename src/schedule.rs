//! Upload ordering and concurrency.
//!
//! Files are uploaded in waves of at most [`CHUNK_SIZE`] concurrent transfers. Waves run one
//! after the other. With priority rules, the filtered set is first split into buckets and the
//! buckets are uploaded in order, each one chunked the same way.
//!
//! A failed transfer fails its wave. The remaining transfers of that wave are dropped, which
//! cancels them, and no later wave starts.

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::catalog::FileEntry;
use crate::error::Result;
use crate::rule::Rule;
use crate::upload::ObjectUploader;

/// Maximum number of transfers in flight at once.
pub const CHUNK_SIZE: usize = 50;

pub type Bucket = Vec<FileEntry>;

/// Splits `files` into `[remainder, rules[0] matches, rules[1] matches, ...]`.
///
/// Each file goes to the first rule it matches. The remainder keeps the input order; every
/// priority bucket lists its files in reverse input order.
pub fn partition(files: &[FileEntry], rules: &[Rule]) -> Result<Vec<Bucket>> {
    let mut tags = Vec::with_capacity(files.len());
    for file in files {
        let mut tag = None;
        for (index, rule) in rules.iter().enumerate() {
            if rule.matches(&file.name)? {
                tag = Some(index);
                break;
            }
        }
        tags.push(tag);
    }

    let mut buckets: Vec<Bucket> = vec![Vec::new(); rules.len() + 1];
    for (file, tag) in files.iter().zip(&tags) {
        if tag.is_none() {
            buckets[0].push(file.clone());
        }
    }
    for (file, tag) in files.iter().zip(&tags).rev() {
        if let Some(index) = tag {
            buckets[index + 1].push(file.clone());
        }
    }
    Ok(buckets)
}

/// Drives the uploads of one run.
#[derive(Clone)]
pub struct UploadScheduler {
    uploader: ObjectUploader,
    priority: Option<Vec<Rule>>,
    chunk_size: usize,
}

impl UploadScheduler {
    pub fn new(uploader: ObjectUploader, priority: Option<Vec<Rule>>) -> Self {
        Self {
            uploader,
            priority,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Uploads everything, by priority bucket when rules are configured. Returns the number of waves.
    pub async fn upload(&self, files: &[FileEntry]) -> Result<usize> {
        match &self.priority {
            Some(rules) => self.upload_in_priority_order(files, rules).await,
            None => self.upload_files_in_chunk(files, self.chunk_size).await,
        }
    }

    /// Uploads bucket by bucket. A bucket starts only after the previous one fully completed.
    pub async fn upload_in_priority_order(&self, files: &[FileEntry], rules: &[Rule]) -> Result<usize> {
        let buckets = partition(files, rules)?;
        info!(
            buckets = buckets.len(),
            sizes = ?buckets.iter().map(Vec::len).collect::<Vec<_>>(),
            "[DEPLOY] Uploading in priority order"
        );

        let mut waves = 0;
        for (index, bucket) in buckets.iter().enumerate() {
            debug!(bucket = index, files = bucket.len(), "Uploading priority bucket");
            waves += self.upload_files_in_chunk(bucket, self.chunk_size).await?;
        }
        Ok(waves)
    }

    /// Uploads `files` in sequential waves of `chunk_size` concurrent transfers.
    pub async fn upload_files_in_chunk(&self, files: &[FileEntry], chunk_size: usize) -> Result<usize> {
        let mut waves = 0;
        for (index, chunk) in files.chunks(chunk_size.max(1)).enumerate() {
            debug!(chunk = index, files = chunk.len(), "Uploading chunk");
            try_join_all(
                chunk
                    .iter()
                    .map(|file| self.uploader.upload(&file.name, &file.path)),
            )
            .await?;
            waves += 1;
        }
        Ok(waves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(bucket: &Bucket) -> Vec<&str> {
        bucket.iter().map(|f| f.name.as_str()).collect()
    }

    fn files(names: &[&str]) -> Vec<FileEntry> {
        names
            .iter()
            .map(|n| FileEntry::new(*n, format!("/d/{n}")))
            .collect()
    }

    #[test]
    fn matched_bucket_is_in_reverse_scan_order() {
        let input = files(&["f1", "f2", "f3", "f4"]);
        let rule = Rule::pattern("^f[24]$").unwrap();
        let buckets = partition(&input, &[rule]).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(names(&buckets[0]), vec!["f1", "f3"]);
        assert_eq!(names(&buckets[1]), vec!["f4", "f2"]);
    }

    #[test]
    fn first_declared_rule_claims_the_file() {
        let input = files(&["index.html", "app.js", "app.css", "logo.png"]);
        let rules = vec![
            Rule::pattern(r"\.(js|css)$").unwrap(),
            Rule::pattern(r"^app").unwrap(),
            Rule::pattern(r"\.html$").unwrap(),
        ];
        let buckets = partition(&input, &rules).unwrap();
        assert_eq!(names(&buckets[0]), vec!["logo.png"]);
        assert_eq!(names(&buckets[1]), vec!["app.css", "app.js"]);
        assert!(buckets[2].is_empty());
        assert_eq!(names(&buckets[3]), vec!["index.html"]);
    }

    #[test]
    fn no_rules_leaves_one_remainder_bucket() {
        let input = files(&["a", "b"]);
        let buckets = partition(&input, &[]).unwrap();
        assert_eq!(buckets, vec![input]);
    }
}
