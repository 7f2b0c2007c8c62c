use crate::record::PreferenceRecord;
use std::collections::HashSet;

/// Result of reconciling local records against a remote collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// Local records the remote does not have; these get backfilled
    pub missing: Vec<PreferenceRecord>,
    /// Remote records followed by the missing local ones
    pub merged: Vec<PreferenceRecord>,
}

/// Union of local and remote, remote first
///
/// Duplicates on either side collapse to their first occurrence. A record
/// present on both sides keeps the remote version.
pub fn plan_merge(local: &[PreferenceRecord], remote: &[PreferenceRecord]) -> MergePlan {
    let mut remote_set: HashSet<&str> = HashSet::with_capacity(remote.len() + local.len());
    let mut merged = Vec::with_capacity(remote.len() + local.len());

    for record in remote {
        if remote_set.insert(record.session_id.as_str()) {
            merged.push(record.clone());
        }
    }

    let mut missing = Vec::new();
    for record in local {
        // Counted as synced as soon as we decide to send it
        if remote_set.insert(record.session_id.as_str()) {
            missing.push(record.clone());
            merged.push(record.clone());
        }
    }

    MergePlan { missing, merged }
}
