/// Convenience constructor for a [`GuardedStack`](crate::GuardedStack).
///
/// `guarded_stack![]` builds an empty stack, `guarded_stack![a, b, c]`
/// pushes the elements bottom to top, and `guarded_stack![elem; n]` pushes
/// `n` clones of `elem`. Pushes unwrap internally; a fresh stack only fails
/// on allocation.
///
/// # Examples
/// ```
/// use stackguard::guarded_stack;
///
/// let st = guarded_stack![1, 2, 3];
/// assert_eq!(st.top().unwrap(), &3);
///
/// let filled = guarded_stack!["ha"; 4];
/// assert_eq!(filled.len(), 4);
/// ```
#[macro_export]
macro_rules! guarded_stack {
    () => {
        $crate::GuardedStack::new()
    };

    ($elem:expr ; $len:expr) => {{
        match $crate::GuardedStack::with_len($len, $elem) {
            ::std::result::Result::Ok(__st__) => __st__,
            ::std::result::Result::Err(e) => panic!("{e}"),
        }
    }};

    ($($elem:expr),+ $(,)?) => {{
        let mut __st__ = $crate::GuardedStack::new();
        $(
            __st__.push($elem).unwrap();
        )+
        __st__
    }};
}
