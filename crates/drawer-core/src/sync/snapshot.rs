//! Fingerprint of the last observed host document.

use crate::config::ChangeDetection;
use crate::model::Element;

/// Element count and sorted identities, optionally with a content digest.
///
/// Elements without an identity contribute an empty string, so two anonymous
/// elements still count toward the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    count: usize,
    ids: Vec<String>,
    digest: Option<blake3::Hash>,
}

impl SyncSnapshot {
    #[must_use]
    pub fn capture(elements: &[Element], mode: ChangeDetection) -> Self {
        let mut ids: Vec<String> = elements
            .iter()
            .map(|e| e.id().unwrap_or_default().to_owned())
            .collect();
        ids.sort_unstable();

        let digest = match mode {
            ChangeDetection::Identity => None,
            ChangeDetection::Content => Some(content_digest(elements)),
        };

        Self {
            count: elements.len(),
            ids,
            digest,
        }
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Whether `current` counts as a material change relative to `self`.
    ///
    /// Digests are only compared when both sides carry one.
    #[must_use]
    pub fn differs_from(&self, current: &Self) -> bool {
        if self.count != current.count || self.ids != current.ids {
            return true;
        }
        match (self.digest, current.digest) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
    }
}

fn content_digest(elements: &[Element]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for element in elements {
        // Map keys serialize in sorted order, so equal content hashes equally.
        if let Ok(bytes) = serde_json::to_vec(element) {
            hasher.update(&bytes);
        }
        hasher.update(b"\n");
    }
    hasher.finalize()
}
