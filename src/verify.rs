//! Integrity validation: structural checks and the content digest.
//!
//! The checks run in a fixed order so that nothing is dereferenced through
//! state that has not been vetted yet: buffer identity first, then the
//! capacity/count parameters, then the guard regions, and only then the
//! content digest over the live elements.

use {
    crate::{
        GuardedStack,
        cap::Cap,
        error::{GuardEnd, IntegrityError},
        raw::SENTINEL,
    },
    std::{
        fmt,
        hash::{DefaultHasher, Hash, Hasher},
    },
};

/// Multiplier of the polynomial accumulator.
pub(crate) const DIGEST_BASE: u64 = 15_487_469;

/// Modulus of the polynomial accumulator.
pub(crate) const DIGEST_MODULO: u64 = 1_000_000_000_007;

/// Order-sensitive digest over the live elements, seeded with the element
/// count: `acc = len; acc = (acc * BASE + h(e)) % MODULO` per element.
/// Intermediate products go through `u128` so the fold is exact.
pub(crate) fn content_digest<T: Hash>(items: &[T]) -> u64 {
    let mut acc = items.len() as u64 % DIGEST_MODULO;
    for item in items {
        let mut hasher = DefaultHasher::new();
        item.hash(&mut hasher);
        acc = ((u128::from(acc) * u128::from(DIGEST_BASE) + u128::from(hasher.finish()))
            % u128::from(DIGEST_MODULO)) as u64;
    }
    acc
}

impl<T: Hash + fmt::Debug> GuardedStack<T> {
    /// Gate run at the boundary of every reading or mutating operation.
    ///
    /// Rejects poisoned instances outright; otherwise, when verification is
    /// on, hunts for a violation and on the first hit dumps the full state,
    /// poisons the stack and returns the classified error.
    pub(crate) fn check(&self) -> Result<(), IntegrityError> {
        if self.poisoned.get() {
            return Err(IntegrityError::Poisoned);
        }
        if !self.verify {
            return Ok(());
        }
        match self.find_violation() {
            None => Ok(()),
            Some(violation) => {
                self.dump_state(Some(violation));
                self.poisoned.set(true);
                Err(violation)
            }
        }
    }

    /// All validator passes in vetting order. Content is only meaningful
    /// when verification maintains the digest.
    pub(crate) fn find_violation(&self) -> Option<IntegrityError> {
        self.frame_violation()
            .or_else(|| self.sentinel_violation())
            .or_else(|| {
                if self.verify {
                    self.content_violation()
                } else {
                    None
                }
            })
    }

    /// Identity and parameter checks. While these fail, nothing derived
    /// from capacity or count may be dereferenced.
    fn frame_violation(&self) -> Option<IntegrityError> {
        let live_base = self.buf.base_ptr() as usize;
        let live_capacity = self.buf.capacity();
        if live_base != self.shadow.base || live_capacity != self.shadow.capacity {
            return Some(IntegrityError::IdentityInconsistent {
                live_base,
                shadow_base: self.shadow.base,
                live_capacity,
                shadow_capacity: self.shadow.capacity,
            });
        }
        if !Cap::is_well_formed(live_capacity) {
            return Some(IntegrityError::StructuralParameterCorrupted {
                detail: "capacity is not a power of two >= MIN_CAPACITY",
            });
        }
        if self.len > live_capacity / 2 {
            return Some(IntegrityError::StructuralParameterCorrupted {
                detail: "element count exceeds half the capacity",
            });
        }
        None
    }

    fn sentinel_violation(&self) -> Option<IntegrityError> {
        let (leading, trailing) = self.buf.read_sentinels();
        if leading != SENTINEL {
            return Some(IntegrityError::SentinelCorrupted {
                end: GuardEnd::Leading,
                found: leading,
                expected: SENTINEL,
            });
        }
        if trailing != SENTINEL {
            return Some(IntegrityError::SentinelCorrupted {
                end: GuardEnd::Trailing,
                found: trailing,
                expected: SENTINEL,
            });
        }
        None
    }

    fn content_violation(&self) -> Option<IntegrityError> {
        let computed = content_digest(self.items());
        if computed != self.digest {
            return Some(IntegrityError::ContentDigestMismatch {
                stored: self.digest,
                computed,
            });
        }
        None
    }

    /// Full human-readable state to the error log. Elements and guard
    /// regions are printed only while the identity and parameters can be
    /// trusted; the format is not a stability contract.
    pub(crate) fn dump_state(&self, violation: Option<IntegrityError>) {
        use fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(out, "GuardedStack state dump");
        if let Some(violation) = violation {
            let _ = writeln!(out, "  violation: {violation}");
        }
        let _ = writeln!(out, "  poisoned: {}", self.poisoned.get());
        let _ = writeln!(out, "  verify: {}", self.verify);
        let _ = writeln!(
            out,
            "  buffer base: {:#x} (shadow {:#x})",
            self.buf.base_ptr() as usize,
            self.shadow.base,
        );
        let _ = writeln!(
            out,
            "  capacity: {} (shadow {})",
            self.buf.capacity(),
            self.shadow.capacity,
        );
        let _ = writeln!(out, "  len: {}", self.len);
        if self.frame_violation().is_none() {
            let (leading, trailing) = self.buf.read_sentinels();
            let _ = writeln!(
                out,
                "  sentinels: leading {leading:#018x}, trailing {trailing:#018x} \
                 (expected {SENTINEL:#018x})",
            );
            let _ = writeln!(out, "  items: {:?}", self.items());
            let _ = writeln!(
                out,
                "  digest: stored {}, computed {}",
                self.digest,
                content_digest(self.items()),
            );
        } else {
            let _ = writeln!(out, "  structural state untrusted; element dump skipped");
        }
        log::error!(target: "stackguard", "{out}");
    }
}
