//! Capacity abstraction to permit its invariants.

/// Smallest capacity a stack ever has.
pub const MIN_CAPACITY: usize = 8;

/// Representation of the `capacity`.
///
/// # Invariants
/// Inner value must be a power of two, >= [`MIN_CAPACITY`], with a slot
/// region small enough to leave headroom for the guard regions below
/// [`isize::MAX`] bytes.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) struct Cap(usize);

impl Cap {
    /// The smallest valid capacity.
    pub(crate) const MIN: Self = Self(MIN_CAPACITY);

    /// Whether `cap` satisfies the shape invariant. The validator re-checks
    /// this on live stacks, so it is the single source of truth for what
    /// counts as a corrupted capacity.
    #[inline]
    #[must_use]
    pub(crate) const fn is_well_formed(cap: usize) -> bool {
        cap >= MIN_CAPACITY && cap.is_power_of_two()
    }

    /// Creates a new `capacity` for `T`-sized slots.
    ///
    /// Returns `None` when `cap` breaks the shape invariant or the slot
    /// region would not fit in half of `isize::MAX` bytes.
    #[must_use]
    pub(crate) fn new<T>(cap: usize) -> Option<Self> {
        if !Self::is_well_formed(cap) {
            return None;
        }
        cap.checked_mul(size_of::<T>())
            .filter(|bytes| *bytes <= isize::MAX as usize / 2)
            .map(|_| Self(cap))
    }

    /// Smallest valid capacity keeping `len` elements at or under the 0.5
    /// load factor.
    #[must_use]
    pub(crate) fn for_len<T>(len: usize) -> Option<Self> {
        let mut cap = MIN_CAPACITY;
        while len > cap / 2 {
            cap = cap.checked_mul(2)?;
        }
        Self::new::<T>(cap)
    }

    /// Returns the `capacity` as a primitive value.
    #[inline]
    #[must_use]
    pub(crate) const fn get(self) -> usize {
        self.0
    }

    /// The grow step: twice this capacity, `None` when that no longer fits.
    #[must_use]
    pub(crate) fn doubled<T>(self) -> Option<Self> {
        Self::new::<T>(self.0.checked_mul(2)?)
    }

    /// The shrink step: half this capacity, saturating at [`MIN_CAPACITY`].
    #[inline]
    #[must_use]
    pub(crate) const fn halved(self) -> Self {
        let half = self.0 / 2;
        if half >= MIN_CAPACITY {
            Self(half)
        } else {
            Self::MIN
        }
    }

    /// Plants an arbitrary raw value, bypassing the invariants. This is how
    /// the corruption tests simulate a clobbered capacity field; nothing may
    /// allocate or probe through a forged value.
    #[cfg(test)]
    #[must_use]
    pub(crate) const fn forged(cap: usize) -> Self {
        Self(cap)
    }
}
