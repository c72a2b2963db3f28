//! Limits on the number of concurrent CPU-heavy external processes.
//!
//! A scanned PDF fans out one task per page, and every task wants to run
//! `pdftocairo` and then `tesseract`. Each of those will happily use a whole
//! core, so we hand out one permit per CPU and make every heavy process hold
//! one while it runs. The page tasks themselves stay concurrent.

use std::sync::LazyLock;

use tokio::sync::Semaphore;

use crate::prelude::*;

/// Process-wide semaphore with one permit per CPU.
static CPU_SEMAPHORE: LazyLock<Semaphore> = LazyLock::new(|| Semaphore::new(cpu_count()));

/// The number of CPUs we assume we can keep busy. Always at least 1.
pub fn cpu_count() -> usize {
    num_cpus::get().max(1)
}

/// Call an async function while holding a permit from the CPU semaphore.
///
/// Use this for external processes, not for in-process CPU work. In-process
/// work belongs on the blocking pool via
/// [`crate::async_utils::spawn_blocking_propagating_panics`].
#[instrument(level = "trace", skip_all)]
pub async fn with_cpu_semaphore<Func, Fut, R>(f: Func) -> Result<R>
where
    Func: FnOnce() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let permit = CPU_SEMAPHORE
        .acquire()
        .await
        .context("Could not acquire CPU permit")?;
    let result = f().await;
    drop(permit);
    result
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use futures::future;

    use super::*;

    #[tokio::test]
    async fn never_exceeds_cpu_count() -> Result<()> {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks = (0..cpu_count() * 3).map(|_| {
            let running = running.clone();
            let peak = peak.clone();
            with_cpu_semaphore(move || async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        });
        future::try_join_all(tasks).await?;
        assert!(peak.load(Ordering::SeqCst) <= cpu_count());
        Ok(())
    }
}
