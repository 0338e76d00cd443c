use {
    crate::{cap::Cap, error::StackError},
    std::{
        alloc::{self, Layout},
        marker::PhantomData,
        mem,
        ptr::{self, NonNull},
    },
};

/// Marker value written into both guard regions on every (re)allocation.
pub(crate) const SENTINEL: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// Bytes reserved for one guard region.
pub(crate) const SENTINEL_SIZE: usize = size_of::<u64>();

/// Storage of a [`GuardedStack`](crate::GuardedStack), laid out as
/// `[leading sentinel][element slots][trailing sentinel][pad byte]`.
///
/// Owns allocation, the sentinel bytes and the element moves during resize.
/// Dropping live elements is the owner's job; this type only releases the
/// bytes.
pub(crate) struct RawGuardedBuf<T> {
    /// Pointer to the first byte of the allocation (the leading sentinel).
    base: NonNull<u8>,
    /// Slot count. Invariants are the validator's to re-check, not ours.
    cap: Cap,
    _marker: PhantomData<T>,
}

impl<T> RawGuardedBuf<T> {
    /// Offset of the first element slot: at least one sentinel wide, and
    /// aligned for `T`. Always a multiple of [`SENTINEL_SIZE`].
    const ELEMS_OFFSET: usize = if align_of::<T>() > SENTINEL_SIZE {
        align_of::<T>()
    } else {
        SENTINEL_SIZE
    };

    fn layout(cap: Cap) -> Result<Layout, StackError> {
        let bytes = cap
            .get()
            .checked_mul(size_of::<T>())
            .and_then(|slots| slots.checked_add(Self::ELEMS_OFFSET + SENTINEL_SIZE + 1))
            .ok_or(StackError::allocation_failed(usize::MAX))?;
        let align = if align_of::<T>() > align_of::<u64>() {
            align_of::<T>()
        } else {
            align_of::<u64>()
        };
        Layout::from_size_align(bytes, align).map_err(|_| StackError::allocation_failed(bytes))
    }

    /// Allocates storage for `cap` slots and writes the sentinel constant
    /// into both guard regions.
    ///
    /// # Errors
    /// [`StackError::AllocationFailed`] when the allocator returns null or
    /// the byte count is not representable.
    pub(crate) fn allocate(cap: Cap) -> Result<Self, StackError> {
        let layout = Self::layout(cap)?;
        // SAFETY: the layout has non-zero size; the guard regions and pad
        // byte alone take 17 bytes.
        let base = unsafe { alloc::alloc(layout) };
        let Some(base) = NonNull::new(base) else {
            return Err(StackError::allocation_failed(layout.size()));
        };
        let buf = Self {
            base,
            cap,
            _marker: PhantomData,
        };
        buf.write_sentinels();
        Ok(buf)
    }

    fn write_sentinels(&self) {
        // SAFETY: both guard slots lie inside the allocation and are
        // aligned for u64 (see `trailing_sentinel_ptr`).
        unsafe {
            self.leading_sentinel_ptr().write(SENTINEL);
            self.trailing_sentinel_ptr().write(SENTINEL);
        }
    }

    #[inline]
    pub(crate) const fn base_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub(crate) const fn capacity(&self) -> usize {
        self.cap.get()
    }

    #[inline]
    pub(crate) const fn cap(&self) -> Cap {
        self.cap
    }

    /// Pointer to slot `pos`. The slot is not guaranteed initialized;
    /// callers keep `pos` within the capacity.
    #[inline]
    pub(crate) fn elem_ptr(&self, pos: usize) -> *mut T {
        debug_assert!(pos <= self.cap.get());
        // SAFETY: with `pos` within the capacity the offset stays inside
        // the allocation.
        unsafe {
            self.base
                .as_ptr()
                .add(Self::ELEMS_OFFSET)
                .cast::<T>()
                .add(pos)
        }
    }

    #[inline]
    pub(crate) fn leading_sentinel_ptr(&self) -> *mut u64 {
        self.base.as_ptr().cast::<u64>()
    }

    /// The slot region is `cap * size_of::<T>()` bytes with `cap` a multiple
    /// of 8 and `ELEMS_OFFSET` a multiple of 8 too, so the trailing guard
    /// slot is always aligned for u64.
    #[inline]
    pub(crate) fn trailing_sentinel_ptr(&self) -> *mut u64 {
        // SAFETY: the offset is within the allocation by construction; the
        // validator never calls this through a capacity it has not vetted.
        unsafe {
            self.base
                .as_ptr()
                .add(Self::ELEMS_OFFSET + self.cap.get() * size_of::<T>())
                .cast::<u64>()
        }
    }

    /// Values currently held by the two guard regions.
    pub(crate) fn read_sentinels(&self) -> (u64, u64) {
        // SAFETY: both guard slots were initialized at allocation and stay
        // inside the buffer.
        unsafe {
            (
                *self.leading_sentinel_ptr(),
                *self.trailing_sentinel_ptr(),
            )
        }
    }

    /// Moves the `live` initialized elements into a fresh allocation of
    /// `new_cap` slots, in order, and releases the old region.
    ///
    /// On error `self` is untouched: the new region is allocated before
    /// anything else happens, so no partial state is observable.
    pub(crate) fn resize(&mut self, new_cap: Cap, live: usize) -> Result<(), StackError> {
        debug_assert!(live <= new_cap.get() / 2);
        let mut fresh = Self::allocate(new_cap)?;
        // SAFETY: slots `0..live` of the old region are initialized, both
        // regions belong to distinct allocations and `live` fits either.
        unsafe {
            ptr::copy_nonoverlapping(self.elem_ptr(0), fresh.elem_ptr(0), live);
        }
        // Ownership of the elements moved with the bytes; dropping the old
        // buffer (now in `fresh`) only releases its allocation.
        mem::swap(self, &mut fresh);
        Ok(())
    }

    /// Plants a forged capacity so the corruption tests can exercise the
    /// validator. The caller restores the real value before drop, since the
    /// deallocation layout is derived from it.
    #[cfg(test)]
    pub(crate) fn corrupt_capacity(&mut self, forged: usize) {
        self.cap = Cap::forged(forged);
    }
}

impl<T> Drop for RawGuardedBuf<T> {
    fn drop(&mut self) {
        if let Ok(layout) = Self::layout(self.cap) {
            // SAFETY: `base` was allocated with exactly this layout.
            unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
        }
    }
}
