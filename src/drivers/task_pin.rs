//! Named execution contexts.
//!
//! Every long-lived context (scheduler loop, event dispatcher, sequence
//! runner) gets a name and an explicit stack size so it is identifiable
//! in logs and panics.  Spawn failure is reported, never panicked on.

use std::thread::JoinHandle;

use crate::error::Error;

/// Spawn a named thread with a `stack_kb` KiB stack.
pub fn spawn_named<T: Send + 'static>(
    name: &str,
    stack_kb: usize,
    f: impl FnOnce() -> T + Send + 'static,
) -> Result<JoinHandle<T>, Error> {
    log::info!("Spawning '{}' (stack={}KB)", name, stack_kb);

    std::thread::Builder::new()
        .name(name.into())
        .stack_size(stack_kb * 1024)
        .spawn(f)
        .map_err(|e| {
            log::error!("Spawning '{}' failed: {}", name, e);
            Error::Spawn
        })
}
