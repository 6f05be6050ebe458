//! Signal of stop: one cancellation scope shared by every task of a session

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct SignalOfStop {
    token: CancellationToken,
}

impl SignalOfStop {
    pub fn new() -> SignalOfStop {
        SignalOfStop {
            token: CancellationToken::new(),
        }
    }

    /// A scope that is cancelled together with `self` but can also be
    /// cancelled on its own
    pub fn child(&self) -> SignalOfStop {
        SignalOfStop {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the scope is cancelled
    pub async fn wait_cancellation(&self) {
        self.token.cancelled().await
    }

    /// Run `fut` to completion unless the scope is cancelled first
    ///
    /// Returns `None` when cancellation won the race.
    pub async fn race<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Spawn a task that is dropped at its next await point once the scope
    /// is cancelled
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_race_returns_none_after_cancel() {
        let sos = SignalOfStop::new();
        let s = sos.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            s.cancel();
        });

        let out = sos.race(std::future::pending::<()>()).await;
        assert!(out.is_none());
        assert!(sos.cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_follows_parent() {
        let parent = SignalOfStop::new();
        let child = parent.child();
        let handle = child.spawn(std::future::pending());

        parent.cancel();
        assert!(child.cancelled());
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_race_completes_when_not_cancelled() {
        let sos = SignalOfStop::new();
        assert_eq!(sos.race(async { 7 }).await, Some(7));
    }
}
