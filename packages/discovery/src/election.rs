//! Leader election for provider-fed cluster views.

use relay_core::{ClusterView, InstanceDescription, TopologyError};

/// Pick the leader among `members`.
///
/// The previous leader keeps the role while it is still a member, so
/// leadership only moves when the leader leaves. Otherwise the member with
/// the lowest sling id is chosen.
pub fn elect_leader<'a, I>(previous: Option<&str>, members: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut lowest: Option<&'a str> = None;
    for member in members {
        if Some(member) == previous {
            return Some(member);
        }
        if lowest.is_none_or(|l| member < l) {
            lowest = Some(member);
        }
    }
    lowest
}

/// Build a cluster view from its members, electing the leader.
///
/// Leader flags already set on `members` are ignored; `local_id` marks the
/// local instance (if it is a member of this cluster).
pub fn assemble_cluster(
    cluster_id: impl Into<String>,
    local_id: Option<&str>,
    previous_leader: Option<&str>,
    members: Vec<InstanceDescription>,
) -> Result<ClusterView, TopologyError> {
    let leader = elect_leader(previous_leader, members.iter().map(|m| m.sling_id()))
        .map(str::to_owned)
        .ok_or(TopologyError::IllegalArgument(
            "cluster view must contain at least one instance",
        ))?;

    let members = members
        .into_iter()
        .map(|member| {
            let is_leader = member.sling_id() == leader;
            let is_local = Some(member.sling_id()) == local_id;
            member.with_leader(is_leader).with_local(is_local)
        })
        .collect();
    ClusterView::new(cluster_id, members)
}
