//! Storage locations.

/// Where a node's value physically lives. Orthogonal to its value type; a
/// node with no location carries an immediate value instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Location {
    /// Persistent, word-addressed storage. Aggregate roots derive child
    /// slots with a content hash of the base slot.
    #[display("storage")]
    Storage,
    /// A storage node whose slot has already been hash-derived, so repeated
    /// accesses add plain offsets instead of re-hashing.
    #[display("storage_prehashed")]
    StoragePrehashed,
    /// Volatile, byte-addressed memory scoped to the current call.
    #[display("memory")]
    Memory,
    /// The read-only, byte-addressed call input region.
    #[display("calldata")]
    Calldata,
}

impl Location {
    /// Returns true for both the hashed and prehashed storage classes.
    #[must_use]
    pub const fn is_storage(self) -> bool {
        matches!(self, Self::Storage | Self::StoragePrehashed)
    }

    /// Returns true if code may store through addresses in this location.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::Calldata)
    }

    /// Returns true if addresses count words rather than bytes.
    #[must_use]
    pub const fn is_word_addressed(self) -> bool {
        self.is_storage()
    }
}
