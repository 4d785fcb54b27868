use std::{
    future::Future,
    task::{Context, Poll},
    thread,
    time::Duration,
};

use futures::task::noop_waker_ref;
use tokio::runtime::Handle;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Drives an SDK future to completion from synchronous code.
///
/// The runtime behind `handle` must have worker threads of its own: they run the IO driver while
/// this thread re-polls on a fixed interval. Unlike `Handle::block_on` this is safe to call from
/// a thread that is already inside the runtime.
pub fn poll_until_ready<Fut, T>(handle: &Handle, future: Fut) -> T
where
    Fut: Future<Output = T>,
{
    let _guard = handle.enter();
    let mut future = Box::pin(future);
    let mut context = Context::from_waker(noop_waker_ref());

    loop {
        match future.as_mut().poll(&mut context) {
            Poll::Ready(result) => {
                return result;
            }
            Poll::Pending => {
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_until_ready() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let result: Result<u32, String> = poll_until_ready(runtime.handle(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(7)
        });

        assert_eq!(result, Ok(7));
    }
}
