//! Nearest-ancestor capability aggregation.
//!
//! Each capability is resolved on its own: scanning from the target towards
//! the root, the first override carrying a truthy value for it wins. A value
//! of `false` is indistinguishable from an absent value and never stops the
//! scan; revoking access means deleting the override row. Capabilities with
//! no truthy value anywhere on the chain resolve to `false`.

use docvault_entity::permission::{Capabilities, Capability};

/// Folds override values, nearest first, into effective capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionAggregator {
    resolved: Capabilities,
    overrides_seen: usize,
}

impl PermissionAggregator {
    /// Start with nothing resolved.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb the override of the next node outward (`None` when the node has
    /// no applicable override). Returns `true` once every capability is
    /// resolved and the rest of the chain cannot change the result.
    pub fn absorb(&mut self, grant: Option<&Capabilities>) -> bool {
        if let Some(grant) = grant {
            self.overrides_seen += 1;
            for capability in Capability::ALL {
                if !self.resolved.get(capability) && grant.get(capability) {
                    self.resolved.set(capability, true);
                }
            }
        }
        self.is_complete()
    }

    /// Whether every capability already resolved to `true`.
    pub fn is_complete(&self) -> bool {
        self.resolved.is_full()
    }

    /// Whether any node on the chain carried an applicable override.
    pub fn saw_overrides(&self) -> bool {
        self.overrides_seen > 0
    }

    /// The effective capabilities.
    pub fn finish(self) -> Capabilities {
        self.resolved
    }

    /// Aggregate a whole chain, nearest first.
    pub fn aggregate<'a, I>(chain: I) -> Capabilities
    where
        I: IntoIterator<Item = Option<&'a Capabilities>>,
    {
        let mut aggregator = Self::new();
        for grant in chain {
            if aggregator.absorb(grant) {
                break;
            }
        }
        aggregator.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn caps(read: bool, comment: bool, share: bool, write: bool) -> Capabilities {
        Capabilities::new(read, comment, share, write)
    }

    #[test]
    fn test_sparse_overlapping_chain() {
        // target, parent, grandparent, root
        let chain = [
            Some(caps(false, false, false, true)),
            None,
            Some(caps(false, true, false, false)),
            Some(caps(true, false, false, false)),
        ];
        let result = PermissionAggregator::aggregate(chain.iter().map(Option::as_ref));
        assert_eq!(result, caps(true, true, false, true));
    }

    #[test]
    fn test_write_without_read_does_not_imply_read() {
        let chain = [Some(caps(false, false, false, true)), None, None];
        let result = PermissionAggregator::aggregate(chain.iter().map(Option::as_ref));
        assert!(result.write);
        assert!(!result.read);
    }

    #[test]
    fn test_false_override_does_not_block_inheritance() {
        let explicit_false = [Some(Capabilities::NONE), Some(caps(true, false, true, false))];
        let absent = [None, Some(caps(true, false, true, false))];
        let a = PermissionAggregator::aggregate(explicit_false.iter().map(Option::as_ref));
        let b = PermissionAggregator::aggregate(absent.iter().map(Option::as_ref));
        assert_eq!(a, b);
        assert!(a.read && a.share);
    }

    #[test]
    fn test_stops_once_everything_resolved() {
        let mut aggregator = PermissionAggregator::new();
        assert!(!aggregator.absorb(Some(&caps(true, true, false, false))));
        assert!(aggregator.absorb(Some(&caps(false, false, true, true))));
    }

    #[test]
    fn test_empty_chain_resolves_to_nothing() {
        let aggregator = PermissionAggregator::new();
        assert!(!aggregator.saw_overrides());
        assert!(aggregator.finish().is_empty());
    }

    fn arb_grant() -> impl Strategy<Value = Option<Capabilities>> {
        proptest::option::of(
            (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>())
                .prop_map(|(r, c, s, w)| Capabilities::new(r, c, s, w)),
        )
    }

    proptest! {
        #[test]
        fn prop_each_capability_is_nearest_truthy_value(
            chain in proptest::collection::vec(arb_grant(), 3..12)
        ) {
            let result = PermissionAggregator::aggregate(chain.iter().map(Option::as_ref));
            for capability in Capability::ALL {
                let nearest = chain
                    .iter()
                    .flatten()
                    .find(|grant| grant.get(capability))
                    .map(|grant| grant.get(capability))
                    .unwrap_or(false);
                prop_assert_eq!(result.get(capability), nearest);
            }
        }

        #[test]
        fn prop_false_rows_are_equivalent_to_absent(
            chain in proptest::collection::vec(arb_grant(), 3..12)
        ) {
            let with_absent: Vec<Option<Capabilities>> = chain
                .iter()
                .map(|g| g.filter(|caps| !caps.is_empty()))
                .collect();
            prop_assert_eq!(
                PermissionAggregator::aggregate(chain.iter().map(Option::as_ref)),
                PermissionAggregator::aggregate(with_absent.iter().map(Option::as_ref))
            );
        }
    }
}
