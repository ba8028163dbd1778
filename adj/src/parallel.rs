//! Bounded-concurrency executor
//!
//! For independent classification and tool-call fan-outs. Per-item
//! failures come back as structured error values, never as a propagated
//! panic or a dropped peer; output order matches input order regardless
//! of completion order.

use futures::StreamExt;
use futures::stream;

/// Default fan-out when the caller does not care
pub const DEFAULT_FAN_OUT: usize = 4;

/// Run `f` over `items` with at most `fan_out` in flight
///
/// A fan-out of 0 or 1 degrades to strictly sequential execution.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, fan_out: usize, f: F) -> Vec<Result<R, String>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, String>>,
{
    let fan_out = fan_out.max(1);

    let mut results: Vec<(usize, Result<R, String>)> = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = f(item);
            async move { (index, fut.await) }
        })
        .buffer_unordered(fan_out)
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
