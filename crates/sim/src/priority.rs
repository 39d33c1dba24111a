//! Hit Priority Resolver.
//!
//! Takes every hitbox/hurtbox contact found in one tick and decides which of
//! them land. When two characters hit each other on the same tick the
//! higher priority attack wins outright and the other is discarded; equal
//! priorities trade and both land.

use std::collections::BTreeMap;

use crate::CharacterId;
use crate::collision::{Hurtbox, HurtboxSet, check_overlap};
use crate::events::{HitCandidate, HitEvent};

/// Outcome of one tick's resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Hits to apply, ordered by `(defender, attacker)`.
    pub landed: Vec<HitEvent>,
    /// Hits that lost a clash, with the priority that beat them.
    pub discarded: Vec<(HitCandidate, i32)>,
    /// Pairs that traded, lower id first.
    pub trades: Vec<(CharacterId, CharacterId, i32)>,
}

/// Resolve `candidates` against the defenders' current hurtboxes.
///
/// `hurtboxes` is indexed by [`CharacterId`]. Only the strongest contact per
/// attacker/defender pair is kept: highest priority, then lowest hitbox
/// index. A contact whose hitbox no longer overlaps any of the defender's
/// hurtboxes is dropped without a trace.
pub fn resolve_hits(candidates: &[HitCandidate], hurtboxes: &[HurtboxSet]) -> Resolution {
    let mut best: BTreeMap<(CharacterId, CharacterId), HitCandidate> = BTreeMap::new();
    for candidate in candidates {
        best.entry((candidate.attacker, candidate.defender))
            .and_modify(|current| {
                let stronger = candidate.priority > current.priority
                    || (candidate.priority == current.priority
                        && candidate.hitbox_index < current.hitbox_index);
                if stronger {
                    *current = *candidate;
                }
            })
            .or_insert(*candidate);
    }

    let mut resolution = Resolution::default();
    for (&(attacker, defender), candidate) in &best {
        if let Some(counter) = best.get(&(defender, attacker)) {
            if counter.priority > candidate.priority {
                resolution.discarded.push((*candidate, counter.priority));
                continue;
            }
            if counter.priority == candidate.priority && attacker < defender {
                resolution
                    .trades
                    .push((attacker, defender, candidate.priority));
            }
        }

        let Some(set) = hurtboxes.get(usize::from(defender)) else {
            continue;
        };
        if let Some(hurtbox) = first_overlapped(candidate, set) {
            resolution
                .landed
                .push(HitEvent::from_candidate(candidate, hurtbox));
        }
    }

    resolution
        .landed
        .sort_by_key(|hit| (hit.defender, hit.attacker));
    resolution
}

/// First hurtbox in region order (head, body, legs, extras) touched by the
/// candidate's hitbox.
fn first_overlapped(candidate: &HitCandidate, set: &HurtboxSet) -> Option<Hurtbox> {
    let mut ordered: HurtboxSet = set.clone();
    ordered.sort_by_key(|h| h.region);
    ordered
        .into_iter()
        .find(|h| check_overlap(&candidate.hitbox, &h.bounds))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{BoxKind, CollisionBox, HurtRegion};
    use crate::geometry::Vec2;
    use smallvec::smallvec;

    fn hurtbox(region: HurtRegion, x: f64, y: f64) -> Hurtbox {
        Hurtbox {
            region,
            bounds: CollisionBox::new(Vec2::new(x, y), 40.0, 40.0, BoxKind::Hurtbox),
        }
    }

    /// A standing set of hurtboxes stacked at `x`.
    fn standing(x: f64) -> HurtboxSet {
        smallvec![
            hurtbox(HurtRegion::Legs, x, 20.0),
            hurtbox(HurtRegion::Body, x, 60.0),
            hurtbox(HurtRegion::Head, x, 100.0),
        ]
    }

    fn candidate(attacker: CharacterId, defender: CharacterId, priority: i32, at: Vec2) -> HitCandidate {
        HitCandidate {
            attacker,
            defender,
            move_id: 1,
            hitbox_index: 0,
            hitbox: CollisionBox::new(at, 20.0, 20.0, BoxKind::Hitbox).with_priority(priority),
            priority,
            damage: f64::from(priority) * 10.0,
            hitstun: 10,
            blockstun: 5,
            knockback: Vec2::ZERO,
        }
    }

    #[test]
    fn test_higher_priority_wins_clash() {
        let hurt = [standing(0.0), standing(50.0)];
        let a = candidate(0, 1, 5, Vec2::new(50.0, 60.0));
        let b = candidate(1, 0, 3, Vec2::new(0.0, 60.0));

        let resolution = resolve_hits(&[a, b], &hurt);
        assert_eq!(resolution.landed.len(), 1);
        assert_eq!(resolution.landed[0].attacker, 0);
        assert_eq!(resolution.landed[0].damage, 50.0);
        assert_eq!(resolution.discarded, vec![(b, 5)]);
        assert!(resolution.trades.is_empty());
    }

    #[test]
    fn test_equal_priority_trades() {
        let hurt = [standing(0.0), standing(50.0)];
        let a = candidate(0, 1, 4, Vec2::new(50.0, 60.0));
        let b = candidate(1, 0, 4, Vec2::new(0.0, 60.0));

        let resolution = resolve_hits(&[b, a], &hurt);
        assert_eq!(resolution.landed.len(), 2);
        assert_eq!(resolution.landed[0].defender, 0);
        assert_eq!(resolution.landed[1].defender, 1);
        assert_eq!(resolution.trades, vec![(0, 1, 4)]);
        assert!(resolution.discarded.is_empty());
    }

    #[test]
    fn test_one_sided_hit_lands_regardless_of_priority() {
        let hurt = [standing(0.0), standing(50.0)];
        let a = candidate(0, 1, 1, Vec2::new(50.0, 60.0));
        let resolution = resolve_hits(&[a], &hurt);
        assert_eq!(resolution.landed.len(), 1);
    }

    #[test]
    fn test_attaches_first_hurtbox_in_region_order() {
        // Tall hitbox covering body and head: head comes first.
        let hurt = [standing(0.0), standing(50.0)];
        let mut a = candidate(0, 1, 2, Vec2::new(50.0, 80.0));
        a.hitbox.height = 60.0;
        let resolution = resolve_hits(&[a], &hurt);
        assert_eq!(resolution.landed[0].hurtbox.region, HurtRegion::Head);

        let low = candidate(0, 1, 2, Vec2::new(50.0, 20.0));
        let resolution = resolve_hits(&[low], &hurt);
        assert_eq!(resolution.landed[0].hurtbox.region, HurtRegion::Legs);
    }

    #[test]
    fn test_hit_without_hurtbox_is_dropped_silently() {
        let hurt = [standing(0.0), HurtboxSet::new()];
        let a = candidate(0, 1, 3, Vec2::new(50.0, 60.0));
        let resolution = resolve_hits(&[a], &hurt);
        assert!(resolution.landed.is_empty());
        assert!(resolution.discarded.is_empty());
        assert!(resolution.trades.is_empty());
    }

    #[test]
    fn test_strongest_hitbox_per_pair_is_kept() {
        let hurt = [standing(0.0), standing(50.0)];
        let weak = candidate(0, 1, 1, Vec2::new(50.0, 60.0));
        let mut strong = candidate(0, 1, 3, Vec2::new(50.0, 20.0));
        strong.hitbox_index = 2;
        let resolution = resolve_hits(&[weak, strong], &hurt);
        assert_eq!(resolution.landed.len(), 1);
        assert_eq!(resolution.landed[0].priority, 3);
        assert_eq!(resolution.landed[0].hurtbox.region, HurtRegion::Legs);
    }

    #[test]
    fn test_resolution_is_independent_of_candidate_order() {
        let hurt = [standing(0.0), standing(50.0), standing(100.0)];
        let hits = [
            candidate(0, 1, 2, Vec2::new(50.0, 60.0)),
            candidate(1, 0, 2, Vec2::new(0.0, 60.0)),
            candidate(2, 1, 4, Vec2::new(50.0, 100.0)),
            candidate(1, 2, 1, Vec2::new(100.0, 60.0)),
        ];
        let forward = resolve_hits(&hits, &hurt);
        let mut reversed = hits;
        reversed.reverse();
        assert_eq!(forward, resolve_hits(&reversed, &hurt));
        // 2 beats 1, 0 and 1 trade, 2 also lands on 1.
        assert_eq!(forward.landed.len(), 3);
        assert_eq!(forward.discarded.len(), 1);
    }
}
