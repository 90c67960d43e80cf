//! Symbolic memory location identities.
//!
//! Every memory operation names the abstract location class it touches: a
//! specific object field, one array element kind, or the `ANY` sentinel when
//! nothing more precise is known. Alias analysis never looks at addresses;
//! it asks `overlaps`, and two operations whose identities do not overlap
//! may be freely reordered relative to each other.
//!
//! Identities are small `Copy` values, immutable once constructed, and safe
//! to share across compilation threads.

// =============================================================================
// Interned references
// =============================================================================

/// Interned class reference, assigned by the type metadata system.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// Interned field reference, unique within its class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl std::fmt::Debug for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "C{}", self.0)
    }
}

impl std::fmt::Debug for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Array element kind. Arrays of different element kinds never alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementKind {
    /// Integer elements.
    Int = 0,
    /// Floating-point elements.
    Float = 1,
    /// Reference elements.
    Object = 2,
}

// =============================================================================
// Location Identity
// =============================================================================

/// The abstract memory location class an operation may read or write.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationIdentity {
    /// The wildcard location: may touch anything, overlaps everything.
    /// Calls and unanalyzable accesses get this.
    Any,
    /// Exactly one field of one class.
    Field { class: ClassId, field: FieldId },
    /// The elements of arrays of one kind.
    ArrayElement(ElementKind),
}

impl LocationIdentity {
    /// The wildcard identity.
    pub const ANY: Self = LocationIdentity::Any;

    /// Identity for a specific field.
    #[inline]
    pub const fn field(class: ClassId, field: FieldId) -> Self {
        LocationIdentity::Field { class, field }
    }

    /// Identity for array elements of a kind.
    #[inline]
    pub const fn array(kind: ElementKind) -> Self {
        LocationIdentity::ArrayElement(kind)
    }

    /// True for the wildcard identity.
    #[inline]
    pub const fn is_any(self) -> bool {
        matches!(self, LocationIdentity::Any)
    }

    /// True if this identity names exactly one location class.
    ///
    /// Only single identities are legal keys for precise value numbering;
    /// the wildcard can stand for several distinct locations at once.
    #[inline]
    pub const fn is_single(self) -> bool {
        !self.is_any()
    }

    /// Whether operations on `self` and `other` may touch the same memory.
    ///
    /// Symmetric and reflexive. The wildcard overlaps everything; two
    /// single identities overlap iff they are the same identity. A `false`
    /// answer is a proof of disjointness the optimizer may act on; `true`
    /// is only "cannot rule it out".
    #[inline]
    pub fn overlaps(self, other: Self) -> bool {
        self.is_any() || other.is_any() || self == other
    }
}

impl std::fmt::Debug for LocationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationIdentity::Any => write!(f, "ANY"),
            LocationIdentity::Field { class, field } => write!(f, "{class:?}.{field:?}"),
            LocationIdentity::ArrayElement(kind) => write!(f, "array[{kind:?}]"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
