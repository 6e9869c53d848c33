use crate::schemas::Member;

/// Even split of `cost` among `members` people, rounded to cents.
/// Returns `None` when there is nobody to split between.
pub fn split_evenly(cost: f64, members: usize) -> Option<f64> {
    if members == 0 {
        return None;
    }
    Some(round_to_2_decimals(cost / members as f64))
}

// Half away from zero on the scaled value
pub fn round_to_2_decimals(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Recomputes every member's share from scratch. Leaves an empty list alone.
pub fn recompute_shares(cost: f64, members: &mut [Member]) {
    let Some(share) = split_evenly(cost, members.len()) else {
        return;
    };
    for member in members.iter_mut() {
        member.share = share;
    }
}

pub fn total_shares(members: &[Member]) -> f64 {
    members.iter().map(|member| member.share).sum()
}
