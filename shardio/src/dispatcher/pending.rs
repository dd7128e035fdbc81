use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::error::{Result, ShardError};

/// Result of a dispatcher call that is already running.
///
/// Await it to get the result. Dropping it detaches the call; it still runs
/// to completion.
pub struct Pending<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Pending<T> {
    pub(crate) fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(fut),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(join)) => {
                Poll::Ready(Err(ShardError::remote(format!("dispatch task failed: {join}"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
