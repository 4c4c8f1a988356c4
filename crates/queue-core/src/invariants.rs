//! Debug-only invariant checks, compiled out of release builds.
//!
//! Each macro names and documents one invariant the surrounding code relies
//! on. They exist to turn a silent state-corruption bug into an immediate
//! panic in development and CI, never in production.

/// Paged-in depth never exceeds `base + sum(prefetch)` right after a page-in
/// batch is appended.
#[cfg(debug_assertions)]
macro_rules! debug_assert_paged_in_bound {
    ($len:expr, $max:expr) => {
        debug_assert!(
            $len <= $max,
            "paged-in set depth {} exceeds bound {}",
            $len,
            $max
        );
    };
}

#[cfg(not(debug_assertions))]
macro_rules! debug_assert_paged_in_bound {
    ($len:expr, $max:expr) => {};
}

/// A dropped reference's flag only ever transitions `false -> true`, never back.
#[cfg(debug_assertions)]
macro_rules! debug_assert_drop_monotonic {
    ($was_dropped_before:expr) => {
        debug_assert!(
            !$was_dropped_before,
            "MessageReference dropped flag observed transitioning true -> true"
        );
    };
}

#[cfg(not(debug_assertions))]
macro_rules! debug_assert_drop_monotonic {
    ($was_dropped_before:expr) => {};
}

/// A reference's ref count never underflows past zero.
#[cfg(debug_assertions)]
macro_rules! debug_assert_ref_count_nonneg {
    ($prev:expr) => {
        debug_assert!($prev > 0, "MessageReference ref_count underflow");
    };
}

#[cfg(not(debug_assertions))]
macro_rules! debug_assert_ref_count_nonneg {
    ($prev:expr) => {};
}

/// At most one consumer may hold the queue-wide exclusive lock at a time.
#[cfg(debug_assertions)]
macro_rules! debug_assert_single_exclusive_owner {
    ($current:expr, $incoming:expr) => {
        if let Some(current) = $current {
            debug_assert!(
                current.id == $incoming.id,
                "two different consumers both believed to hold the exclusive lock"
            );
        }
    };
}

#[cfg(not(debug_assertions))]
macro_rules! debug_assert_single_exclusive_owner {
    ($current:expr, $incoming:expr) => {};
}

pub(crate) use debug_assert_drop_monotonic;
pub(crate) use debug_assert_paged_in_bound;
pub(crate) use debug_assert_ref_count_nonneg;
pub(crate) use debug_assert_single_exclusive_owner;
