//! Uid to model index.
//!
//! Each bucket lists the live models declaring a uid, in declaration order,
//! with every model present at most once. Empty buckets are removed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::model::FileModel;

#[derive(Debug, Default)]
pub(crate) struct UidIndex {
    buckets: HashMap<String, Vec<Arc<FileModel>>>,
}

impl UidIndex {
    /// Build the index from scratch.
    pub(crate) fn rebuild(models: &[Arc<FileModel>]) -> Self {
        let mut index = Self::default();
        for model in models {
            for uid in model.uids() {
                index.add(&uid.name, model);
            }
        }
        index
    }

    /// Add `model` under `uid` unless already present.
    pub(crate) fn add(&mut self, uid: &str, model: &Arc<FileModel>) {
        let bucket = self.buckets.entry(uid.to_owned()).or_default();
        if !bucket.iter().any(|m| Arc::ptr_eq(m, model)) {
            bucket.push(Arc::clone(model));
        }
    }

    /// Remove `model` from `uid`, pruning the bucket if it empties.
    pub(crate) fn remove(&mut self, uid: &str, model: &Arc<FileModel>) {
        if let Some(bucket) = self.buckets.get_mut(uid) {
            bucket.retain(|m| !Arc::ptr_eq(m, model));
            if bucket.is_empty() {
                self.buckets.remove(uid);
            }
        }
    }

    /// Apply the difference between two uid sets of one model.
    pub(crate) fn apply_diff(
        &mut self,
        model: &Arc<FileModel>,
        old: &BTreeSet<&str>,
        new: &BTreeSet<&str>,
    ) {
        for added in new.difference(old) {
            self.add(added, model);
        }
        for removed in old.difference(new) {
            self.remove(removed, model);
        }
    }

    pub(crate) fn lookup(&self, uid: &str) -> Vec<Arc<FileModel>> {
        self.buckets.get(uid).cloned().unwrap_or_default()
    }

    pub(crate) fn uids(&self) -> BTreeSet<String> {
        self.buckets.keys().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
