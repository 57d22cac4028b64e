//! Bounded worker group
//!
//! Runs a function over a list of items with a cap on in-flight tasks.
//! Results are collected in completion order, not input order. A task
//! that panics yields an error outcome carrying its item; it never
//! cancels its peers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A worker that failed instead of producing a result
#[derive(Debug)]
pub struct WorkerFailure<T> {
    /// The input item, when it could be recovered
    pub item: Option<T>,
    pub error: String,
}

/// Run `f` over `items` with at most `limit` tasks in flight.
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    f: F,
) -> Vec<Result<R, WorkerFailure<T>>>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let limit = limit.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let f = Arc::new(f);

    let mut set: JoinSet<R> = JoinSet::new();
    let mut in_flight: HashMap<tokio::task::Id, T> = HashMap::new();

    for item in items {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let f = Arc::clone(&f);
        let task_item = item.clone();
        let handle = set.spawn(async move {
            let _permit = permit;
            f(task_item).await
        });
        in_flight.insert(handle.id(), item);
    }

    let mut results = Vec::with_capacity(in_flight.len());
    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((id, value)) => {
                in_flight.remove(&id);
                results.push(Ok(value));
            }
            Err(join_error) => {
                let item = in_flight.remove(&join_error.id());
                results.push(Err(WorkerFailure {
                    item,
                    error: join_error.to_string(),
                }));
            }
        }
    }
    results
}
