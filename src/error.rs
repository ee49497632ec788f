//! Fatal-error reporting for the handful of conditions this heap cannot
//! recover from (out of memory, a copying backend's to-space overflowing).
//!
//! `allocate` is specified as infallible — there is no `Result` channel for
//! it to report failure through — so the only way to fail is to report and
//! abort the process, matching the C original's `fprintf(stderr, ...);
//! abort()` paths in `mark_sweep.c`/`copying.c`.

/// Report `message` and terminate the process with exit code 1.
///
/// Logged via `tracing::error!` when the `gc_logging` feature is enabled,
/// otherwise written to stderr directly.
pub fn fatal(message: &str) -> ! {
    #[cfg(feature = "gc_logging")]
    tracing::error!(%message, "fatal heap error");
    #[cfg(not(feature = "gc_logging"))]
    eprintln!("fatal heap error: {message}");

    std::process::exit(1);
}
