//! Overwrite merging.

use crate::model::OverwriteSpec;

/// Merges category-level overwrite defaults with channel-level overrides.
///
/// The result contains one entry per role name. When both levels name the
/// same role, the channel entry wins outright; allow/deny lists are not
/// combined, because a channel override is a deliberate replacement of the
/// category default for that role. Category-only entries keep their relative
/// order, followed by channel-only entries.
pub fn merged_overwrites(
    category_defaults: &[OverwriteSpec],
    channel_overrides: &[OverwriteSpec],
) -> Vec<OverwriteSpec> {
    let mut merged: Vec<OverwriteSpec> = Vec::with_capacity(category_defaults.len());

    for default in category_defaults {
        match channel_overrides.iter().find(|o| o.role == default.role) {
            Some(winner) => merged.push(winner.clone()),
            None => merged.push(default.clone()),
        }
    }

    for overwrite in channel_overrides {
        if !merged.iter().any(|m| m.role == overwrite.role) {
            merged.push(overwrite.clone());
        }
    }

    merged
}
