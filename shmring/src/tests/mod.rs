use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};


/// Shared memory names must be unique per test and per test process, or
/// parallel runs trample each other's rings.
pub(crate) fn unique_name(tag: &str) -> String {
    static TEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "shmring-test-{}-{}-{}",
        tag,
        process::id(),
        TEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}
