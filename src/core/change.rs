// ============================================================================
// spark-tree - Change Signal
// Bitmask describing what a single mutation did to a node
// ============================================================================
//
// Bits are grouped in three ranges of four: field, child, subtree. Bubbling a
// child's signal into its container is a mechanical shift by one range.
// Positions are part of the public contract and must never be renumbered.
// ============================================================================

bitflags::bitflags! {
    /// What changed in one mutation.
    ///
    /// Combine with `|`, test with `contains` / `intersects`. An empty signal
    /// means "nothing changed" and is never dispatched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Change: u32 {
        // =====================================================================
        // FIELD RANGE
        // =====================================================================

        /// Same kind, different value
        const VALUE = 1 << 0;
        /// Runtime kind changed (e.g. number -> string, object -> array)
        const TYPE = 1 << 1;
        /// Went from absent to present
        const ATTACH = 1 << 2;
        /// Went from present to absent
        const DETACH = 1 << 3;

        // =====================================================================
        // CHILD RANGE
        // =====================================================================

        /// A direct child changed value
        const CHILD = 1 << 4;
        /// A direct child changed kind
        const CHILD_TYPE = 1 << 5;
        /// A direct child was attached
        const CHILD_ATTACH = 1 << 6;
        /// A direct child was detached
        const CHILD_DETACH = 1 << 7;

        // =====================================================================
        // SUBTREE RANGE
        // =====================================================================

        /// Something deeper than a direct child changed value
        const SUBTREE = 1 << 8;
        const SUBTREE_TYPE = 1 << 9;
        const SUBTREE_ATTACH = 1 << 10;
        const SUBTREE_DETACH = 1 << 11;

        // =====================================================================
        // DERIVED + DOMAIN
        // =====================================================================

        /// Structure changed, not just a value. Always derived, see [`Change::with_shape`].
        const SHAPE = 1 << 12;
        /// Node became valid
        const VALID = 1 << 13;
        /// Node became (or stays) invalid with new errors
        const INVALID = 1 << 14;
    }
}

impl Change {
    /// Field-level bits.
    pub const FIELD_RANGE: Change = Change::from_bits_retain(0x000F);

    /// Child-level bits.
    pub const CHILD_RANGE: Change = Change::from_bits_retain(0x00F0);

    /// Subtree-level bits.
    pub const SUBTREE_RANGE: Change = Change::from_bits_retain(0x0F00);

    /// Bits that imply [`Change::SHAPE`].
    pub const SHAPE_SOURCES: Change = Change::ATTACH
        .union(Change::DETACH)
        .union(Change::TYPE)
        .union(Change::CHILD_ATTACH)
        .union(Change::CHILD_DETACH);

    /// Width of one range, in bits.
    const RANGE_WIDTH: u32 = 4;

    /// Re-derive the `SHAPE` bit from the shape sources.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_tree::Change;
    ///
    /// assert!(Change::ATTACH.with_shape().contains(Change::SHAPE));
    /// assert!(!Change::VALUE.with_shape().contains(Change::SHAPE));
    /// assert!(!(Change::VALUE | Change::SHAPE).with_shape().contains(Change::SHAPE));
    /// ```
    pub fn with_shape(self) -> Change {
        if self.intersects(Change::SHAPE_SOURCES) {
            self | Change::SHAPE
        } else {
            self - Change::SHAPE
        }
    }

    /// Translate a child's signal into what its container observes.
    ///
    /// Field bits move into the child range, child bits into the subtree
    /// range, subtree bits stay. Domain bits do not bubble.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_tree::Change;
    ///
    /// assert_eq!(Change::VALUE.bubble(), Change::CHILD);
    /// assert_eq!(
    ///     Change::DETACH.bubble(),
    ///     Change::CHILD_DETACH | Change::SHAPE
    /// );
    /// assert_eq!((Change::CHILD | Change::SUBTREE).bubble(), Change::SUBTREE);
    /// ```
    pub fn bubble(self) -> Change {
        let shifted = (self & (Change::FIELD_RANGE | Change::CHILD_RANGE)).bits() << Self::RANGE_WIDTH;
        let kept = self & Change::SUBTREE_RANGE;
        (Change::from_bits_truncate(shifted) | kept).with_shape()
    }

    /// Merge an incoming signal into a pending (withheld or batched) one.
    ///
    /// Plain OR, except for the validity flags: `VALID` then `INVALID` nets
    /// to `INVALID`, and `INVALID` then `VALID` nets to neither.
    pub fn coalesce(self, incoming: Change) -> Change {
        let mut pending = self;
        let mut incoming = incoming;

        if pending.contains(Change::VALID) && incoming.contains(Change::INVALID) {
            pending.remove(Change::VALID);
        } else if pending.contains(Change::INVALID) && incoming.contains(Change::VALID) {
            pending.remove(Change::VALID | Change::INVALID);
            incoming.remove(Change::VALID | Change::INVALID);
        }

        pending | incoming
    }

    /// True if the node itself went away or came back.
    pub fn is_structural(self) -> bool {
        self.intersects(Change::ATTACH | Change::DETACH)
    }
}

// =============================================================================
// TESTS
// =============================================================================
