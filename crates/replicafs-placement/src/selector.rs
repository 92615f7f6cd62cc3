//! Host selection by free capacity

use replicafs_common::{Host, HostId};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Rank candidate hosts for placement.
///
/// Keeps only active hosts not present in `exclude`, ordered by descending
/// free capacity (`disk_total - disk_used`). Ties are broken by ascending
/// host id so the order is reproducible. An empty result means no placement
/// is possible; it is not an error.
#[must_use]
pub fn rank_hosts<I>(hosts: I, exclude: &HashSet<HostId>) -> Vec<Host>
where
    I: IntoIterator<Item = Host>,
{
    let mut candidates: Vec<Host> = hosts
        .into_iter()
        .filter(|h| h.status.is_active() && !exclude.contains(&h.host_id))
        .collect();
    candidates.sort_by(|a, b| {
        Reverse(a.free_capacity())
            .cmp(&Reverse(b.free_capacity()))
            .then_with(|| a.host_id.cmp(&b.host_id))
    });
    candidates
}

/// Host ids already holding a copy, as an exclusion set
pub fn exclusion_set<'a, I>(host_ids: I) -> HashSet<HostId>
where
    I: IntoIterator<Item = &'a HostId>,
{
    host_ids.into_iter().cloned().collect()
}
