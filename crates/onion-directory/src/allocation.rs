use onion_types::NodeId;
use rand::Rng;
use std::ops::RangeInclusive;

/// Draw three node identifiers that are pairwise distinct and not already
/// present in `in_use` (§4.D). The source's bug fixed here used an
/// `||`/`&&`-confused predicate that let a freshly drawn id collide with
/// one already claimed earlier in the same draw; this draws into a running
/// set and rejects any id already present in it, so both kinds of collision
/// are excluded by construction.
pub fn draw_three_distinct(range: RangeInclusive<u32>, in_use: &[NodeId]) -> Vec<NodeId> {
    let mut rng = rand::thread_rng();
    let mut drawn: Vec<NodeId> = Vec::with_capacity(3);

    while drawn.len() < 3 {
        let candidate = rng.gen_range(range.clone());
        let Some(id) = NodeId::new(candidate) else {
            continue;
        };
        if in_use.contains(&id) || drawn.contains(&id) {
            continue;
        }
        drawn.push(id);
    }

    drawn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_three_pairwise_distinct_ids() {
        let drawn = draw_three_distinct(1..=99, &[]);
        assert_eq!(drawn.len(), 3);
        assert_ne!(drawn[0], drawn[1]);
        assert_ne!(drawn[1], drawn[2]);
        assert_ne!(drawn[0], drawn[2]);
    }

    #[test]
    fn avoids_already_claimed_ids() {
        let claimed: Vec<NodeId> = (1..=97).filter_map(NodeId::new).collect();
        let drawn = draw_three_distinct(1..=99, &claimed);
        assert_eq!(drawn.len(), 3);
        for id in &drawn {
            assert!(!claimed.contains(id));
        }
        assert_eq!(drawn[0].value().min(drawn[1].value()).min(drawn[2].value()), 98.min(99));
    }

    #[test]
    fn narrow_range_still_converges() {
        let drawn = draw_three_distinct(1..=3, &[]);
        let mut values: Vec<u32> = drawn.iter().map(NodeId::value).collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 3]);
    }
}
