//! A LIFO stack that verifies its own memory integrity on every access.
//!
//! [`GuardedStack`] keeps its elements in a raw buffer flanked by two guard
//! regions holding a sentinel constant, and captures an order-sensitive
//! digest of the live elements after every mutation. In verified mode (the
//! default) every public operation re-checks the whole structure before and
//! after touching it: writes past the element slots, stray writes into the
//! guard regions and in-place tampering with stored elements surface as
//! classified [`IntegrityError`]s instead of silently corrupted state.
//!
//! A stack that has reported a violation is *poisoned*: it dumps its full
//! state to the error log once, then rejects everything except diagnostic
//! inspection ([`len`](GuardedStack::len), [`is_empty`](GuardedStack::is_empty),
//! [`dump`](GuardedStack::dump), [`is_poisoned`](GuardedStack::is_poisoned)).
//! There is no recovery.
//!
//! Verification is a construction-time choice, not a hidden build mode:
//! [`StackConfig::unchecked`] builds a stack that skips every check and all
//! digest bookkeeping, at zero cost per operation.
//!
//! # Examples
//! ```
//! use stackguard::GuardedStack;
//!
//! let mut st = GuardedStack::new();
//! st.push(1)?;
//! st.push(2)?;
//! assert_eq!(st.top()?, &2);
//! assert_eq!(st.pop()?, 2);
//! assert_eq!(st.len(), 1);
//! # Ok::<(), stackguard::StackError>(())
//! ```
//!
//! Tampering with an element through a borrowed view is caught by the next
//! verified operation:
//! ```
//! use stackguard::{GuardedStack, IntegrityError, StackError};
//!
//! let mut st = GuardedStack::new();
//! st.push(String::from("intact"))?;
//! *st.get_mut(0)? = String::from("tampered");
//!
//! let err = st.pop().unwrap_err();
//! assert!(matches!(
//!     err,
//!     StackError::Integrity(IntegrityError::ContentDigestMismatch { .. })
//! ));
//! assert!(st.is_poisoned());
//! # Ok::<(), stackguard::StackError>(())
//! ```

mod cap;
pub mod error;
mod macros;
mod raw;
#[cfg(test)]
mod tests;
mod verify;

use {
    crate::{cap::Cap, raw::RawGuardedBuf},
    std::{cell::Cell, fmt, hash::Hash, ops, ptr},
};

pub use crate::{
    cap::MIN_CAPACITY,
    error::{GuardEnd, IntegrityError, StackError},
};

/// Construction-time configuration for a [`GuardedStack`].
///
/// The only knob is whether the integrity validator runs. Both settings are
/// constructable from the same binary, so either mode can be tested
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackConfig {
    /// Run the validator around every reading/mutating operation and keep
    /// the content digest up to date.
    pub verify: bool,
}

impl StackConfig {
    /// Configuration with the validator enabled.
    #[inline]
    #[must_use]
    pub const fn verified() -> Self {
        Self { verify: true }
    }

    /// Configuration with every check skipped.
    #[inline]
    #[must_use]
    pub const fn unchecked() -> Self {
        Self { verify: false }
    }

    /// Builder-style override of the `verify` flag.
    #[inline]
    #[must_use]
    pub const fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

impl Default for StackConfig {
    #[inline]
    fn default() -> Self {
        Self::verified()
    }
}

/// Redundant copy of the buffer identity, re-captured after every
/// (re)allocation and compared against the live buffer on every check.
#[derive(Clone, Copy)]
struct BufShadow {
    base: usize,
    capacity: usize,
}

impl BufShadow {
    fn of<T>(buf: &RawGuardedBuf<T>) -> Self {
        Self {
            base: buf.base_ptr() as usize,
            capacity: buf.capacity(),
        }
    }
}

/// A LIFO container that checks its own storage before trusting it.
///
/// Storage layout: `[sentinel][element slots][sentinel][pad]`, capacity a
/// power of two that is at least [`MIN_CAPACITY`], doubled before a push
/// that would exceed a load factor of 0.5 and halved after a pop that would
/// drop it under 0.25.
///
/// The element type needs [`Hash`] for the content digest and
/// [`fmt::Debug`] for the diagnostic dump.
pub struct GuardedStack<T> {
    buf: RawGuardedBuf<T>,
    len: usize,
    /// Content digest captured after the last mutation; only maintained in
    /// verified mode.
    digest: u64,
    shadow: BufShadow,
    verify: bool,
    poisoned: Cell<bool>,
}

impl<T> GuardedStack<T> {
    /// Number of live elements. Pure query, never validated, usable on a
    /// poisoned stack.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the stack holds no elements. Pure query.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current slot capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Whether an integrity violation has been detected on this instance.
    #[inline]
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.get()
    }

    /// Live elements as a slice. Internal: public reads go through the
    /// validated accessors.
    fn items(&self) -> &[T] {
        // SAFETY: slots `0..len` are initialized elements of the buffer we
        // own.
        unsafe { std::slice::from_raw_parts(self.buf.elem_ptr(0), self.len) }
    }
}

impl<T: Hash + fmt::Debug> GuardedStack<T> {
    /// Creates an empty stack with verification enabled.
    ///
    /// # Panics
    /// When the initial buffer cannot be allocated; use
    /// [`try_with_config`](Self::try_with_config) to recover instead.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StackConfig::default())
    }

    /// Creates an empty stack with an explicit configuration.
    ///
    /// # Panics
    /// When the initial buffer cannot be allocated.
    #[must_use]
    pub fn with_config(config: StackConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(stack) => stack,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible form of [`with_config`](Self::with_config).
    ///
    /// # Errors
    /// [`StackError::AllocationFailed`] when the initial buffer cannot be
    /// allocated.
    pub fn try_with_config(config: StackConfig) -> Result<Self, StackError> {
        let buf = RawGuardedBuf::allocate(Cap::MIN)?;
        let mut stack = Self {
            shadow: BufShadow::of(&buf),
            buf,
            len: 0,
            digest: 0,
            verify: config.verify,
            poisoned: Cell::new(false),
        };
        stack.record_state();
        Ok(stack)
    }

    /// Creates a verified stack holding `len` copies of `value`, bottom to
    /// top, sized so the load factor holds without an immediate grow.
    ///
    /// # Errors
    /// [`StackError::InvalidArgument`] when no valid capacity can hold
    /// `len` elements; [`StackError::AllocationFailed`] when the buffer
    /// cannot be allocated.
    pub fn with_len(len: usize, value: T) -> Result<Self, StackError>
    where
        T: Clone,
    {
        let Some(cap) = Cap::for_len::<T>(len) else {
            return Err(StackError::invalid_argument(format!(
                "cannot size a stack for {len} elements"
            )));
        };
        let buf = RawGuardedBuf::allocate(cap)?;
        let mut stack = Self {
            shadow: BufShadow::of(&buf),
            buf,
            len: 0,
            digest: 0,
            verify: StackConfig::default().verify,
            poisoned: Cell::new(false),
        };
        for pos in 0..len {
            // SAFETY: `pos < len <= cap / 2`, a vacant slot in the buffer.
            unsafe { stack.buf.elem_ptr(pos).write(value.clone()) };
            stack.len = pos + 1;
        }
        stack.record_state();
        Ok(stack)
    }

    /// Pushes `value` on top of the stack, doubling the capacity first when
    /// the push would exceed the 0.5 load factor.
    ///
    /// Amortized O(1) container work; in verified mode the surrounding
    /// checks and the digest capture are O(n).
    ///
    /// # Errors
    /// [`StackError::AllocationFailed`] when growth fails (the stack is
    /// left unchanged); any [`IntegrityError`] the validator finds.
    pub fn push(&mut self, value: T) -> Result<(), StackError> {
        self.check()?;
        if self.len + 1 > self.buf.capacity() / 2 {
            let doubled = self
                .buf
                .cap()
                .doubled::<T>()
                .ok_or(StackError::allocation_failed(usize::MAX))?;
            self.buf.resize(doubled, self.len)?;
        }
        // SAFETY: after the capacity check slot `len` is a vacant slot
        // inside the buffer.
        unsafe { self.buf.elem_ptr(self.len).write(value) };
        self.len += 1;
        self.record_state();
        self.check()?;
        Ok(())
    }

    /// Removes and returns the top element, halving the capacity first when
    /// the pop would drop the load factor under 0.25 (never below
    /// [`MIN_CAPACITY`]).
    ///
    /// # Errors
    /// [`StackError::EmptyContainer`] on an empty stack; allocation and
    /// integrity errors as for [`push`](Self::push).
    pub fn pop(&mut self) -> Result<T, StackError> {
        self.check()?;
        if self.len == 0 {
            return Err(StackError::EmptyContainer);
        }
        if self.buf.capacity() > MIN_CAPACITY && self.len - 1 < self.buf.capacity() / 4 {
            self.buf.resize(self.buf.cap().halved(), self.len)?;
        }
        self.len -= 1;
        // SAFETY: slot `len` held the initialized top element; ownership
        // moves to the caller and the slot counts as vacant from here on.
        let value = unsafe { self.buf.elem_ptr(self.len).read() };
        self.record_state();
        self.check()?;
        Ok(value)
    }

    /// Borrowed view of the element `pos` slots from the bottom.
    ///
    /// The borrow must not be assumed to survive the next mutating call: a
    /// resize moves the storage.
    ///
    /// # Errors
    /// [`StackError::OutOfRange`] when `pos >= len()`; any
    /// [`IntegrityError`] the validator finds.
    pub fn get(&self, pos: usize) -> Result<&T, StackError> {
        self.check()?;
        if pos >= self.len {
            return Err(StackError::out_of_range(pos, self.len));
        }
        // SAFETY: `pos` indexes an initialized slot.
        let item = unsafe { &*self.buf.elem_ptr(pos) };
        self.check()?;
        Ok(item)
    }

    /// Exclusive view of the element `pos` slots from the bottom.
    ///
    /// Writing through the view bypasses the digest capture: in verified
    /// mode the next operation reports such a write as
    /// [`IntegrityError::ContentDigestMismatch`]. Mutate through
    /// [`pop`](Self::pop)/[`push`](Self::push) when that is not the goal.
    ///
    /// # Errors
    /// As for [`get`](Self::get).
    pub fn get_mut(&mut self, pos: usize) -> Result<&mut T, StackError> {
        self.check()?;
        if pos >= self.len {
            return Err(StackError::out_of_range(pos, self.len));
        }
        // SAFETY: `pos` indexes an initialized slot and we hold `&mut self`.
        Ok(unsafe { &mut *self.buf.elem_ptr(pos) })
    }

    /// Borrowed view of the most recently pushed element.
    ///
    /// # Errors
    /// [`StackError::EmptyContainer`] on an empty stack; any
    /// [`IntegrityError`] the validator finds.
    pub fn top(&self) -> Result<&T, StackError> {
        self.check()?;
        if self.len == 0 {
            return Err(StackError::EmptyContainer);
        }
        // SAFETY: the top slot is initialized.
        let item = unsafe { &*self.buf.elem_ptr(self.len - 1) };
        self.check()?;
        Ok(item)
    }

    /// Duplicate with an independent buffer: elements cloned in order, the
    /// digest recomputed from the copy.
    ///
    /// # Errors
    /// Any validator finding on the source; [`StackError::AllocationFailed`]
    /// for the new buffer.
    pub fn try_clone(&self) -> Result<Self, StackError>
    where
        T: Clone,
    {
        self.check()?;
        let buf = RawGuardedBuf::allocate(self.buf.cap())?;
        let mut copy = Self {
            shadow: BufShadow::of(&buf),
            buf,
            len: 0,
            digest: 0,
            verify: self.verify,
            poisoned: Cell::new(false),
        };
        for (pos, item) in self.items().iter().enumerate() {
            // SAFETY: `pos < len <= capacity / 2`, a vacant slot.
            unsafe { copy.buf.elem_ptr(pos).write(item.clone()) };
            copy.len = pos + 1;
        }
        copy.record_state();
        copy.check()?;
        Ok(copy)
    }

    /// Probes the stack without touching it: runs the validator but does
    /// not dump, poison or reject. `false` once poisoned.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        !self.poisoned.get() && self.find_violation().is_none()
    }

    /// Writes a human-readable state dump to the error log. Usable on a
    /// poisoned stack; the format is not a stability contract.
    pub fn dump(&self) {
        self.dump_state(None);
    }

    /// Re-captures the digest and the buffer shadow after a successful
    /// mutation.
    fn record_state(&mut self) {
        self.shadow = BufShadow::of(&self.buf);
        if self.verify {
            self.digest = verify::content_digest(self.items());
        }
    }
}

impl<T> Drop for GuardedStack<T> {
    fn drop(&mut self) {
        if self.poisoned.get() {
            // Structural state cannot be trusted; leak the elements and let
            // the buffer release its bytes.
            log::warn!(
                target: "stackguard",
                "dropping poisoned GuardedStack without element teardown",
            );
            return;
        }
        // SAFETY: slots `0..len` hold initialized elements, dropped exactly
        // once here; the buffer releases its allocation afterwards.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.buf.elem_ptr(0),
                self.len,
            ));
        }
    }
}

impl<T: Hash + fmt::Debug> Default for GuardedStack<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Hash + fmt::Debug> Clone for GuardedStack<T> {
    /// # Panics
    /// When the source fails validation or the new buffer cannot be
    /// allocated; use [`GuardedStack::try_clone`] to recover instead.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(copy) => copy,
            Err(e) => panic!("{e}"),
        }
    }
}

// ------------------------------- fmt impl -------------------------------

impl<T: fmt::Debug> fmt::Debug for GuardedStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = f.debug_struct("GuardedStack");
        state
            .field("len", &self.len)
            .field("capacity", &self.buf.capacity())
            .field("poisoned", &self.poisoned.get());
        if !self.poisoned.get() && self.len <= self.buf.capacity() / 2 {
            state.field("items", &self.items());
            state.finish()
        } else {
            state.finish_non_exhaustive()
        }
    }
}

// ----------------------------- Index impl -----------------------------

impl<T: Hash + fmt::Debug> ops::Index<usize> for GuardedStack<T> {
    type Output = T;

    /// # Panics
    /// On out-of-range access or any integrity violation; use
    /// [`GuardedStack::get`] to recover instead.
    fn index(&self, pos: usize) -> &T {
        match self.get(pos) {
            Ok(item) => item,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T: Hash + fmt::Debug> ops::IndexMut<usize> for GuardedStack<T> {
    /// # Panics
    /// As for [`ops::Index`].
    fn index_mut(&mut self, pos: usize) -> &mut T {
        match self.get_mut(pos) {
            Ok(item) => item,
            Err(e) => panic!("{e}"),
        }
    }
}

// ----------------------------- From impl -----------------------------

impl<T: Hash + fmt::Debug> FromIterator<T> for GuardedStack<T> {
    /// # Panics
    /// On allocation failure, the only error a fresh stack can hit while
    /// collecting.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut stack = Self::new();
        for item in iter {
            if let Err(e) = stack.push(item) {
                panic!("{e}");
            }
        }
        stack
    }
}

impl<T: Hash + fmt::Debug> From<Vec<T>> for GuardedStack<T> {
    fn from(items: Vec<T>) -> Self {
        items.into_iter().collect()
    }
}

// ----------------------------- PartialEq impl -----------------------------

impl<T, U> PartialEq<GuardedStack<U>> for GuardedStack<T>
where
    T: PartialEq<U>,
{
    #[inline]
    fn eq(&self, rhs: &GuardedStack<U>) -> bool {
        PartialEq::eq(self.items(), rhs.items())
    }
}

impl<T, U> PartialEq<[U]> for GuardedStack<T>
where
    T: PartialEq<U>,
{
    #[inline]
    fn eq(&self, rhs: &[U]) -> bool {
        PartialEq::eq(self.items(), rhs)
    }
}

impl<T, U, const N: usize> PartialEq<[U; N]> for GuardedStack<T>
where
    T: PartialEq<U>,
{
    #[inline]
    fn eq(&self, rhs: &[U; N]) -> bool {
        PartialEq::eq(self.items(), rhs)
    }
}

impl<T: Eq> Eq for GuardedStack<T> {}
