use std::future::Future;
use std::panic::AssertUnwindSafe;

use anyhow::{Context, Result, anyhow};
use futures::FutureExt;
use tokio::task::JoinSet;

/// Supervises the long-running tasks of the process.
///
/// The first task that fails or panics stops the others and is reported to
/// the caller, which exits non-zero.
#[derive(Default)]
pub struct Lifecycle {
    tasks: JoinSet<Result<()>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => result.with_context(|| format!("task {} failed", name)),
                Err(_) => Err(anyhow!("task {} panicked", name)),
            }
        });
    }

    /// Waits until every task has finished, or until the first failure.
    pub async fn run(mut self) -> Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.map_err(|e| anyhow!("task aborted: {}", e)).and_then(|r| r);
            if let Err(e) = outcome {
                tracing::error!("❌ {:#}", e);
                self.tasks.abort_all();
                return Err(e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn clean_tasks_finish_ok() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.spawn("a", async { Ok(()) });
        lifecycle.spawn("b", async { Ok(()) });
        assert!(lifecycle.run().await.is_ok());
    }

    #[tokio::test]
    async fn first_failure_stops_everything() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.spawn("forever", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        lifecycle.spawn("broken", async { Err(anyhow!("boom")) });

        let err = lifecycle.run().await.unwrap_err();
        assert!(format!("{:#}", err).contains("task broken failed"));
    }

    #[tokio::test]
    async fn panics_are_failures() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.spawn("panicky", async {
            if true {
                panic!("unexpected");
            }
            Ok(())
        });

        let err = lifecycle.run().await.unwrap_err();
        assert!(err.to_string().contains("panicky panicked"));
    }
}
