// Pure function from (ordered member list, partition count) to assignment
// map. Two strategies, both deterministic given the canonical ordering
// (lexicographic by member-id) this module always sorts into before
// assigning — callers never need to pre-sort.

use std::collections::BTreeMap;

use broker_base::AssignorKind;

pub trait Assignor: Send + Sync {
    fn assign(&self, members: &[String], partitions: u32) -> BTreeMap<String, Vec<u32>>;
}

pub struct RoundRobin;
pub struct Range;

impl Assignor for RoundRobin {
    fn assign(&self, members: &[String], partitions: u32) -> BTreeMap<String, Vec<u32>> {
        let mut sorted = members.to_vec();
        sorted.sort();

        let mut out: BTreeMap<String, Vec<u32>> = sorted.iter().map(|m| (m.clone(), Vec::new())).collect();
        if sorted.is_empty() {
            return out;
        }
        for p in 0..partitions {
            let owner = &sorted[(p as usize) % sorted.len()];
            out.get_mut(owner).unwrap().push(p);
        }
        out
    }
}

impl Assignor for Range {
    fn assign(&self, members: &[String], partitions: u32) -> BTreeMap<String, Vec<u32>> {
        let mut sorted = members.to_vec();
        sorted.sort();

        let mut out: BTreeMap<String, Vec<u32>> = sorted.iter().map(|m| (m.clone(), Vec::new())).collect();
        let m = sorted.len();
        if m == 0 {
            return out;
        }
        let base = partitions as usize / m;
        let extra = partitions as usize % m;

        let mut next_partition = 0u32;
        for (i, member) in sorted.iter().enumerate() {
            let count = base + if i < extra { 1 } else { 0 };
            let block: Vec<u32> = (next_partition..next_partition + count as u32).collect();
            next_partition += count as u32;
            out.insert(member.clone(), block);
        }
        out
    }
}

/// Apply the given strategy, sorting members into canonical order first.
pub fn assign(kind: AssignorKind, members: &[String], partitions: u32) -> BTreeMap<String, Vec<u32>> {
    match kind {
        AssignorKind::RoundRobin => RoundRobin.assign(members, partitions),
        AssignorKind::Range => Range.assign(members, partitions),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn members(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn round_robin_covers_all_partitions_exactly_once() {
        let m = members(&["a", "b", "c"]);
        let a = assign(AssignorKind::RoundRobin, &m, 7);
        let mut covered: Vec<u32> = a.values().flatten().copied().collect();
        covered.sort();
        assert_eq!(covered, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn range_covers_all_partitions_exactly_once() {
        let m = members(&["a", "b", "c"]);
        let a = assign(AssignorKind::Range, &m, 7);
        let mut covered: Vec<u32> = a.values().flatten().copied().collect();
        covered.sort();
        assert_eq!(covered, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn range_gives_first_members_the_extra_partition() {
        let m = members(&["a", "b", "c"]);
        let a = assign(AssignorKind::Range, &m, 7);
        // 7 / 3 = 2 remainder 1: "a" gets 3, "b" and "c" get 2 each.
        assert_eq!(a["a"].len(), 3);
        assert_eq!(a["b"].len(), 2);
        assert_eq!(a["c"].len(), 2);
    }

    #[test]
    fn zero_members_yields_empty_assignment() {
        let a = assign(AssignorKind::RoundRobin, &[], 4);
        assert!(a.is_empty());
        let a = assign(AssignorKind::Range, &[], 4);
        assert!(a.is_empty());
    }

    #[test]
    fn excess_members_get_empty_lists_but_all_partitions_covered() {
        let m = members(&["a", "b", "c", "d", "e", "f"]);
        for kind in [AssignorKind::RoundRobin, AssignorKind::Range] {
            let a = assign(kind, &m, 4);
            let empty_count = a.values().filter(|v| v.is_empty()).count();
            assert_eq!(empty_count, 2, "{kind:?}: 6 members - 4 partitions = 2 idle");
            let mut covered: Vec<u32> = a.values().flatten().copied().collect();
            covered.sort();
            assert_eq!(covered, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn assignment_is_deterministic_and_idempotent() {
        let m = members(&["z", "a", "m"]);
        let a1 = assign(AssignorKind::RoundRobin, &m, 5);
        let a2 = assign(AssignorKind::RoundRobin, &m, 5);
        assert_eq!(a1, a2);
    }

    #[test]
    fn member_order_does_not_affect_result() {
        let sorted = members(&["a", "b", "c"]);
        let shuffled = members(&["c", "a", "b"]);
        assert_eq!(
            assign(AssignorKind::RoundRobin, &sorted, 5),
            assign(AssignorKind::RoundRobin, &shuffled, 5)
        );
    }
}
