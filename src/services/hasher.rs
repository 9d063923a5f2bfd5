use crate::models::{ContentIdentity, Fingerprint};

/// Computes order-independent fingerprints over sets of content identities
pub struct ContentHasher;

impl ContentHasher {
    /// Maps each identity to `"{id}-{type}"`, sorts, and joins with `,`.
    ///
    /// Duplicates are kept, so the fingerprint reflects the multiset. An empty
    /// input yields the empty fingerprint.
    pub fn compute<'a, I>(items: I) -> Fingerprint
    where
        I: IntoIterator<Item = &'a ContentIdentity>,
    {
        let mut parts: Vec<String> = items
            .into_iter()
            .map(|item| format!("{}-{}", item.id, item.content_type))
            .collect();
        parts.sort();
        Fingerprint::new(parts.join(","))
    }
}
