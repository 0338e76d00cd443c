use crate::{
    GuardedStack, StackConfig,
    cap::{Cap, MIN_CAPACITY},
    error::{GuardEnd, IntegrityError, StackError},
    raw::SENTINEL,
    verify::content_digest,
};

fn integrity(err: StackError) -> IntegrityError {
    match err {
        StackError::Integrity(violation) => violation,
        other => panic!("expected an integrity violation, got {other}"),
    }
}

// ------------------- digest -------------------

#[test]
fn digest_of_empty_sequence_is_zero() {
    assert_eq!(content_digest::<i32>(&[]), 0);
}

#[test]
fn digest_is_deterministic() {
    let items = [3_i64, 1, 4, 1, 5];
    assert_eq!(content_digest(&items), content_digest(&items));
}

#[test]
fn digest_is_order_sensitive() {
    assert_ne!(content_digest(&[1_i32, 2]), content_digest(&[2_i32, 1]));
}

#[test]
fn digest_depends_on_count() {
    assert_ne!(content_digest(&[7_i32]), content_digest(&[7_i32, 7]));
}

// ------------------- cap -------------------

#[test]
fn cap_shape_invariant() {
    assert!(Cap::is_well_formed(8));
    assert!(Cap::is_well_formed(1024));
    assert!(!Cap::is_well_formed(0));
    assert!(!Cap::is_well_formed(4));
    assert!(!Cap::is_well_formed(12));
}

#[test]
fn cap_for_len_respects_load_factor() {
    assert_eq!(Cap::for_len::<u64>(0).unwrap().get(), MIN_CAPACITY);
    assert_eq!(Cap::for_len::<u64>(4).unwrap().get(), 8);
    assert_eq!(Cap::for_len::<u64>(5).unwrap().get(), 16);
    assert_eq!(Cap::for_len::<u64>(100).unwrap().get(), 256);
}

#[test]
fn cap_policy_steps() {
    let cap = Cap::MIN;
    let doubled = cap.doubled::<u32>().unwrap();
    assert_eq!(doubled.get(), 16);
    assert_eq!(doubled.halved(), Cap::MIN);
    // never shrinks below the floor
    assert_eq!(Cap::MIN.halved(), Cap::MIN);
}

// ------------------- construction -------------------

#[test]
fn new_stack_is_empty_and_intact() {
    let st = GuardedStack::<i32>::new();
    assert_eq!(st.len(), 0);
    assert!(st.is_empty());
    assert_eq!(st.capacity(), MIN_CAPACITY);
    assert!(st.is_intact());
    assert!(!st.is_poisoned());
}

#[test]
fn with_len_fills_bottom_to_top() {
    let st = GuardedStack::with_len(10, 7_u32).unwrap();
    assert_eq!(st.len(), 10);
    assert_eq!(st.capacity(), 32);
    assert_eq!(st, [7_u32; 10]);
    assert!(st.is_intact());
}

#[test]
fn with_len_zero_is_an_empty_stack() {
    let st = GuardedStack::with_len(0, String::from("unused")).unwrap();
    assert!(st.is_empty());
    assert_eq!(st.capacity(), MIN_CAPACITY);
}

/// No power-of-two capacity can hold `usize::MAX` elements.
#[test]
fn with_len_rejects_unrepresentable_sizes() {
    let err = GuardedStack::with_len(usize::MAX, 0_u64).unwrap_err();
    assert!(matches!(err, StackError::InvalidArgument { .. }));
}

/// ZSTs get no special casing: the geometry still breathes, the allocation
/// degenerates to the guard regions and the pad byte.
#[test]
fn zst_elements_keep_the_geometry_honest() {
    let mut st = GuardedStack::new();
    for _ in 0..100 {
        st.push(()).unwrap();
    }
    assert_eq!(st.capacity(), 256);
    for _ in 0..100 {
        st.pop().unwrap();
    }
    assert_eq!(st.capacity(), MIN_CAPACITY);
    assert!(st.is_intact());
}

// ------------------- resize -------------------

/// Growing and shrinking moves heap-owning elements without dropping or
/// duplicating them.
#[test]
fn resize_preserves_heap_elements() {
    let mut st = GuardedStack::new();
    for i in 0..20 {
        st.push(format!("item-{i}")).unwrap();
    }
    for i in (3..20).rev() {
        assert_eq!(st.pop().unwrap(), format!("item-{i}"));
    }
    assert_eq!(st, [String::from("item-0"), "item-1".into(), "item-2".into()]);
    assert!(st.is_intact());
}

// ------------------- guard-region attacks -------------------

/// Overwriting a byte of the trailing guard region must classify as
/// `SentinelCorrupted` at the trailing end and poison the stack.
#[test]
fn trailing_sentinel_overwrite_detected() {
    let mut st = GuardedStack::new();
    for i in 0..100 {
        st.push(i).unwrap();
    }
    // SAFETY: deliberately clobbers one byte inside the trailing guard
    // region; the write stays within the allocation.
    unsafe { st.buf.trailing_sentinel_ptr().cast::<u8>().write(0) };

    let violation = integrity(st.pop().unwrap_err());
    assert!(matches!(
        violation,
        IntegrityError::SentinelCorrupted {
            end: GuardEnd::Trailing,
            ..
        }
    ));
    assert!(st.is_poisoned());
}

/// Same attack against the leading guard region.
#[test]
fn leading_sentinel_overwrite_detected() {
    let mut st = GuardedStack::new();
    st.push(41_u64).unwrap();
    // SAFETY: deliberately clobbers the leading guard slot, in-bounds.
    unsafe { st.buf.leading_sentinel_ptr().write(!SENTINEL) };

    let violation = integrity(st.top().map(|_| ()).unwrap_err());
    assert_eq!(
        violation,
        IntegrityError::SentinelCorrupted {
            end: GuardEnd::Leading,
            found: !SENTINEL,
            expected: SENTINEL,
        }
    );
    assert!(st.is_poisoned());
}

// ------------------- content attacks -------------------

/// A stray in-place write to a live element, bypassing the API entirely,
/// must classify as `ContentDigestMismatch`.
#[test]
fn raw_element_overwrite_detected() {
    let mut st = GuardedStack::new();
    for i in 0..100_i64 {
        st.push(i).unwrap();
    }
    // SAFETY: slot 10 holds an initialized i64; writing another valid i64
    // through the raw pointer models a stray write.
    unsafe { st.buf.elem_ptr(10).write(17) };

    let violation = integrity(st.pop().unwrap_err());
    assert!(matches!(
        violation,
        IntegrityError::ContentDigestMismatch { .. }
    ));
    assert!(st.is_poisoned());
}

/// A forged stored digest is indistinguishable from tampered content.
#[test]
fn forged_digest_detected() {
    let mut st = GuardedStack::new();
    st.push(1_u32).unwrap();
    st.digest = st.digest.wrapping_add(1);

    let violation = integrity(st.push(2).unwrap_err());
    assert!(matches!(
        violation,
        IntegrityError::ContentDigestMismatch { .. }
    ));
}

// ------------------- structural attacks -------------------

/// An element count past the load factor can only come from a clobbered
/// field.
#[test]
fn forged_len_detected() {
    let mut st = GuardedStack::new();
    st.push(1_i32).unwrap();
    st.len = st.capacity();

    let violation = integrity(st.push(2).unwrap_err());
    assert!(matches!(
        violation,
        IntegrityError::StructuralParameterCorrupted { .. }
    ));
    assert!(st.is_poisoned());
}

/// A capacity that is no power of two fails the parameter check before
/// anything dereferences through it. Both the live value and the shadow are
/// forged so the identity comparison stays silent.
#[test]
fn forged_capacity_detected() {
    let mut st = GuardedStack::new();
    st.push(1_u8).unwrap();
    st.buf.corrupt_capacity(12);
    st.shadow.capacity = 12;

    let violation = integrity(st.push(2).unwrap_err());
    assert!(matches!(
        violation,
        IntegrityError::StructuralParameterCorrupted { .. }
    ));
    assert!(st.is_poisoned());

    // teardown derives the deallocation layout from the capacity
    st.buf.corrupt_capacity(MIN_CAPACITY);
}

/// A capacity diverging from its shadow copy reports the identity
/// inconsistency without probing through either value.
#[test]
fn capacity_shadow_divergence_detected() {
    let mut st = GuardedStack::new();
    st.push(1_u16).unwrap();
    st.buf.corrupt_capacity(16);

    let violation = integrity(st.top().map(|_| ()).unwrap_err());
    assert!(matches!(
        violation,
        IntegrityError::IdentityInconsistent {
            live_capacity: 16,
            shadow_capacity: 8,
            ..
        }
    ));

    st.buf.corrupt_capacity(MIN_CAPACITY);
}

/// A clobbered base-pointer shadow reports the identity inconsistency.
#[test]
fn base_shadow_divergence_detected() {
    let mut st = GuardedStack::new();
    st.push(5_i32).unwrap();
    st.shadow.base ^= 0x1000;

    let violation = integrity(st.pop().unwrap_err());
    assert!(matches!(
        violation,
        IntegrityError::IdentityInconsistent { .. }
    ));
    assert!(st.is_poisoned());
}

// ------------------- poisoned behavior -------------------

/// After the first violation every reading/mutating operation is rejected;
/// the pure queries and the dump stay usable.
#[test]
fn poisoned_stack_rejects_everything() {
    let mut st = GuardedStack::new();
    for i in 0..10 {
        st.push(i).unwrap();
    }
    // SAFETY: deliberate trailing guard clobber, in-bounds.
    unsafe { st.buf.trailing_sentinel_ptr().write(0) };
    assert!(st.pop().is_err());
    assert!(st.is_poisoned());

    assert_eq!(integrity(st.push(11).unwrap_err()), IntegrityError::Poisoned);
    assert_eq!(integrity(st.pop().unwrap_err()), IntegrityError::Poisoned);
    assert_eq!(
        integrity(st.top().map(|_| ()).unwrap_err()),
        IntegrityError::Poisoned
    );
    assert_eq!(
        integrity(st.get(0).map(|_| ()).unwrap_err()),
        IntegrityError::Poisoned
    );

    assert_eq!(st.len(), 10);
    assert!(!st.is_empty());
    assert!(!st.is_intact());
    st.dump();
}

// ------------------- unchecked mode -------------------

/// With verification off the same guard clobber goes unnoticed and the
/// stack keeps operating on whatever state it has.
#[test]
fn unchecked_mode_skips_detection() {
    let mut st = GuardedStack::with_config(StackConfig::unchecked());
    for i in 0..10 {
        st.push(i).unwrap();
    }
    // SAFETY: deliberate trailing guard clobber, in-bounds.
    unsafe { st.buf.trailing_sentinel_ptr().write(0) };

    assert_eq!(st.pop().unwrap(), 9);
    assert!(!st.is_poisoned());
}

/// The builder round-trips the flag.
#[test]
fn config_builder() {
    assert!(StackConfig::default().verify);
    assert!(!StackConfig::unchecked().verify);
    assert!(StackConfig::unchecked().with_verify(true).verify);
}

// ------------------- dump -------------------

/// Dumping a healthy stack must not disturb it.
#[test]
fn dump_is_side_effect_free() {
    let mut st = GuardedStack::new();
    st.push(String::from("fine")).unwrap();
    st.dump();
    assert!(st.is_intact());
    assert_eq!(st.pop().unwrap(), "fine");
}
