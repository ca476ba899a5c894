use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::AttributeTag;

/// Predicate over image attribute tags used to select a candidate pool.
///
/// An empty filter matches every image. Otherwise an image matches when it
/// carries at least one of the filter's tags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFilter {
    any_of: BTreeSet<AttributeTag>,
}

impl AttributeFilter {
    /// Filter that matches every image.
    pub fn any() -> Self {
        Self::default()
    }

    /// Filter that matches images carrying at least one of `tags` (empty tags are ignored).
    pub fn any_of<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AttributeTag>,
    {
        let any_of = tags
            .into_iter()
            .map(Into::into)
            .filter(|tag: &AttributeTag| !tag.trim().is_empty())
            .collect();
        Self { any_of }
    }

    /// True when this filter places no restriction on attributes.
    pub fn is_unrestricted(&self) -> bool {
        self.any_of.is_empty()
    }

    /// Tags accepted by this filter, in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.any_of.iter().map(String::as_str)
    }

    /// Check an image's attribute set against the filter.
    pub fn matches(&self, attributes: &BTreeSet<AttributeTag>) -> bool {
        if self.any_of.is_empty() {
            return true;
        }
        // Iterate the smaller set.
        if attributes.len() < self.any_of.len() {
            attributes.iter().any(|tag| self.any_of.contains(tag))
        } else {
            self.any_of.iter().any(|tag| attributes.contains(tag))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> BTreeSet<AttributeTag> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn unrestricted_filter_matches_untagged_images() {
        let filter = AttributeFilter::any();
        assert!(filter.is_unrestricted());
        assert!(filter.matches(&BTreeSet::new()));
        assert!(filter.matches(&tags(&["people"])));
    }

    #[test]
    fn any_of_requires_one_shared_tag() {
        let filter = AttributeFilter::any_of(["people", "animals"]);
        assert!(filter.matches(&tags(&["animals", "outdoor"])));
        assert!(!filter.matches(&tags(&["outdoor"])));
        assert!(!filter.matches(&BTreeSet::new()));
    }

    #[test]
    fn blank_tags_are_dropped() {
        let filter = AttributeFilter::any_of(["", "  ", "test"]);
        assert_eq!(filter.tags().collect::<Vec<_>>(), vec!["test"]);
    }
}
