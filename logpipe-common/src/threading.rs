// SPDX-License-Identifier: Apache-2.0

//! Thread identification used when logging destination-driver state transitions (spec §5): each
//! threaded destination runs on its own OS thread, and diagnostic log lines name it explicitly
//! rather than relying on the process-wide default thread name.

/// Returns a numeric identifier for the current OS thread.
#[cfg(target_os = "linux")]
pub fn get_current_thread_id() -> i64 {
    // SAFETY: syscall(SYS_gettid) has no preconditions for current thread.
    unsafe { libc::syscall(libc::SYS_gettid) as i64 }
}

/// Returns a numeric identifier for the current OS thread.
#[cfg(target_os = "macos")]
pub fn get_current_thread_id() -> i64 {
    let mut tid: u64 = 0;
    // SAFETY: `pthread_threadid_np` has no preconditions for current thread
    // when pthread_t is 0 and output pointer is valid.
    let rc = unsafe { libc::pthread_threadid_np(0, &mut tid) };
    debug_assert_eq!(
        rc,
        0,
        "pthread_threadid_np failed: {rc} ({})",
        std::io::Error::from_raw_os_error(rc)
    );
    tid as i64
}

/// Returns a numeric identifier for the current OS thread.
///
/// Platforms without a native thread-id syscall fall back to hashing
/// [`std::thread::ThreadId`]'s debug representation; it is stable for the thread's lifetime,
/// which is all logging needs.
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn get_current_thread_id() -> i64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_thread_id_is_stable_within_a_thread() {
        assert_eq!(get_current_thread_id(), get_current_thread_id());
    }

    #[test]
    fn spawned_threads_report_distinct_ids() {
        let a = get_current_thread_id();
        let b = std::thread::spawn(get_current_thread_id)
            .join()
            .expect("thread panicked");
        assert_ne!(a, b);
    }
}
