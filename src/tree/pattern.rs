//! Single path-segment name patterns.
//!
//! `*` matches any run of characters; everything else is literal.  Matching
//! is case-insensitive and anchored at both ends.

use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
pub enum NamePattern {
    /// No wildcard: compare lowercased names directly.
    Exact(String),
    Glob(Regex),
}

impl NamePattern {
    pub fn parse(pattern: &str) -> Result<Self, regex::Error> {
        let lowered = pattern.to_lowercase();
        if !lowered.contains('*') {
            return Ok(NamePattern::Exact(lowered));
        }
        let body: Vec<String> = lowered
            .split('*')
            .filter(|s| !s.is_empty())
            .map(regex::escape)
            .collect();
        let mut source = String::from("^");
        if lowered.starts_with('*') {
            source.push_str(".*");
        }
        source.push_str(&body.join(".*"));
        if lowered.ends_with('*') && !body.is_empty() {
            source.push_str(".*");
        }
        source.push('$');
        let regex = RegexBuilder::new(&source).case_insensitive(true).build()?;
        Ok(NamePattern::Glob(regex))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Exact(lowered) => name.to_lowercase() == *lowered,
            NamePattern::Glob(regex) => regex.is_match(name),
        }
    }
}
