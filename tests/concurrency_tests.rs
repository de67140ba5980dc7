//! # Concurrency Tests using Loom
//!
//! This module uses loom to check the two pieces of shared state behind a
//! parallel run: the fail-fast token that stops unstarted cases, and the
//! result slots that workers fill before the summary reads them.
//!
//! 此模块使用 loom 检查并行运行背后的两部分共享状态：阻止未开始用例的快速失败令牌，
//! 以及工作线程在汇总读取之前填写的结果槽。

#[cfg(test)]
mod tests {
    use loom::sync::atomic::{AtomicUsize, Ordering};
    use loom::sync::{Arc, Mutex};
    use loom::thread;
    use tokio_util::sync::CancellationToken;

    const STACK_SIZE: usize = 8 * 1024 * 1024;

    /// Runs a loom model on a thread with a larger stack.
    fn explore<F>(model: F)
    where
        F: Fn() + Sync + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name("loom-model".into())
            .stack_size(STACK_SIZE)
            .spawn(move || loom::model(model))
            .unwrap();
        handle.join().unwrap();
    }

    /// One worker's case fails unexpectedly and trips the fail-fast token while
    /// another worker is deciding whether to start its case. A case that saw the
    /// token is skipped; the failing case always ran.
    #[test]
    fn test_fail_fast_token_stops_unstarted_cases() {
        explore(|| {
            let started = Arc::new(AtomicUsize::new(0));
            let skipped = Arc::new(AtomicUsize::new(0));
            let token = CancellationToken::new();

            let handles: Vec<_> = [true, false]
                .into_iter()
                .map(|fails| {
                    let token = token.clone();
                    let started = started.clone();
                    let skipped = skipped.clone();
                    thread::spawn(move || {
                        if token.is_cancelled() {
                            skipped.fetch_add(1, Ordering::Relaxed);
                            return;
                        }
                        started.fetch_add(1, Ordering::Relaxed);
                        if fails {
                            token.cancel();
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            let started = started.load(Ordering::Relaxed);
            let skipped = skipped.load(Ordering::Relaxed);
            assert_eq!(started + skipped, 2);
            assert!(started >= 1, "the failing case must have run");
            assert!(token.is_cancelled());
        });
    }

    /// Workers finish in any order, but every result lands in its own slot,
    /// so reading the slots after joining yields plan order with none lost.
    #[test]
    fn test_results_are_complete_after_join() {
        explore(|| {
            let slots: Arc<Mutex<Vec<Option<usize>>>> = Arc::new(Mutex::new(vec![None; 2]));

            let handles: Vec<_> = (0..2)
                .map(|index| {
                    let slots = slots.clone();
                    thread::spawn(move || {
                        slots.lock().unwrap()[index] = Some(index * 10);
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            let results = slots.lock().unwrap().clone();
            assert_eq!(results, vec![Some(0), Some(10)]);
        });
    }
}
