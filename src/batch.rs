//! Fans a per-item closure out over a bounded OS thread pool while
//! preserving input order and per-item failure isolation.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Runs `worker` for every item in `items` on a pool of at most
/// `available_parallelism()` threads, returning results in input order.
///
/// One item's panic-free failure (an `Err` inside `R`, if `R` is a
/// `Result`) never cancels the others; each item runs to completion
/// independently.
pub fn map_parallel<T, R>(items: &[T], worker: impl Fn(usize, &T) -> R + Sync) -> Vec<R>
where
    T: Sync,
    R: Send,
{
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }

    let pool_size = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
        .min(n);
    let next = AtomicUsize::new(0);
    let slots: Vec<Mutex<Option<R>>> = (0..n).map(|_| Mutex::new(None)).collect();

    std::thread::scope(|scope| {
        for _ in 0..pool_size {
            scope.spawn(|| loop {
                let i = next.fetch_add(1, Ordering::SeqCst);
                if i >= n {
                    break;
                }
                let result = worker(i, &items[i]);
                *slots[i].lock().unwrap() = Some(result);
            });
        }
    });

    slots
        .into_iter()
        .map(|m| m.into_inner().unwrap().expect("every index is visited exactly once"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn preserves_input_order() {
        let items: Vec<u32> = (0..50).collect();
        let results = map_parallel(&items, |_, x| x * 2);
        let expected: Vec<u32> = items.iter().map(|x| x * 2).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn one_item_failing_does_not_cancel_others() {
        let items = vec!["ok", "fail", "ok", "fail"];
        let results = map_parallel(&items, |_, s| if *s == "fail" { Err(()) } else { Ok(()) });
        assert_eq!(results, vec![Ok(()), Err(()), Ok(()), Err(())]);
    }

    #[test]
    fn empty_input_returns_empty_output() {
        let items: Vec<u32> = Vec::new();
        let results = map_parallel(&items, |_, x: &u32| *x);
        assert!(results.is_empty());
    }

    #[test]
    fn every_item_is_visited_exactly_once() {
        let counter = AtomicU32::new(0);
        let items: Vec<u32> = (0..200).collect();
        let results = map_parallel(&items, |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            ()
        });
        assert_eq!(results.len(), 200);
        assert_eq!(counter.load(Ordering::SeqCst), 200);
    }
}
