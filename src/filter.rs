use tracing::{debug, info};

use crate::catalog::{is_ignored, FileEntry};
use crate::error::Result;
use crate::rule::Rule;

/// Include/exclude filtering of the candidate set.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    include: Option<Rule>,
    exclude: Option<Rule>,
}

impl Filter {
    pub fn new(include: Option<Rule>, exclude: Option<Rule>) -> Self {
        Self { include, exclude }
    }

    /// No include rule means everything is included; a matching exclude rule always wins.
    pub fn is_permitted(&self, name: &str) -> Result<bool> {
        let included = match &self.include {
            Some(rule) => rule.matches(name)?,
            None => true,
        };
        let excluded = match &self.exclude {
            Some(rule) => rule.matches(name)?,
            None => false,
        };
        Ok(included && !excluded)
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        is_ignored(name)
    }

    /// Keeps permitted, non-ignored files in their original order.
    pub fn filter(&self, files: Vec<FileEntry>) -> Result<Vec<FileEntry>> {
        let total = files.len();
        let mut kept = Vec::with_capacity(total);
        for file in files {
            if self.is_permitted(&file.name)? && !self.is_ignored(&file.name) {
                kept.push(file);
            } else {
                debug!(name = %file.name, "Filtered out");
            }
        }
        info!(total, kept = kept.len(), "[DEPLOY] Applied include/exclude filter");
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_and_exclude_combine() {
        let filter = Filter::new(
            Some(Rule::pattern(r"\.js$").unwrap()),
            Some(Rule::pattern("vendor").unwrap()),
        );
        let files = vec![
            FileEntry::new("a.js", "/d/a.js"),
            FileEntry::new("vendor/b.js", "/d/vendor/b.js"),
            FileEntry::new("c.css", "/d/c.css"),
        ];
        let names: Vec<String> = filter
            .filter(files)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a.js"]);
    }

    #[test]
    fn defaults_permit_everything_but_ignores() {
        let filter = Filter::default();
        assert!(filter.is_permitted("anything").unwrap());
        let files = vec![
            FileEntry::new("index.html", "/d/index.html"),
            FileEntry::new(".DS_Store", "/d/.DS_Store"),
        ];
        assert_eq!(filter.filter(files).unwrap().len(), 1);
    }
}
