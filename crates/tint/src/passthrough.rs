//! Per-thread marker for native calls the layer makes itself.
//!
//! Direct3D hooks patch vtables shared by every object of a class, so the layer's own
//! device calls land in the same hooks as the application's. Hooks check [`active`] and
//! forward such calls untouched.

use core::cell::Cell;

use scopeguard::defer;

thread_local! {
    static INSIDE: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside [`call`].
#[inline]
pub fn active() -> bool {
    INSIDE.get()
}

/// Runs `f` with every hook on this thread forwarding to the native function.
pub fn call<R>(f: impl FnOnce() -> R) -> R {
    let outer = INSIDE.replace(true);
    defer!(INSIDE.set(outer));

    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_and_restores() {
        assert!(!active());
        call(|| {
            assert!(active());
            call(|| assert!(active()));
            assert!(active());
        });
        assert!(!active());
    }

    #[test]
    fn other_threads_are_unaffected() {
        call(|| {
            let seen = std::thread::spawn(active).join().unwrap();
            assert!(!seen);
        });
    }
}
