use std::sync::atomic::{AtomicBool, Ordering};

/// Semaphore that is a no-op until it is configured with a non-zero value.
pub struct Semaphore {
    enabled: AtomicBool,
    sem: tokio::sync::Semaphore,
}

impl Semaphore {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            sem: tokio::sync::Semaphore::const_new(0),
        }
    }

    pub fn setup(&self, value: usize) {
        self.enabled.store(value > 0, Ordering::Release);
        if value == 0 {
            return;
        }
        self.sem.forget_permits(self.sem.available_permits());
        self.sem
            .add_permits(std::cmp::min(value, tokio::sync::Semaphore::MAX_PERMITS));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Returns `None` when the limit is disabled; the permit is released on drop.
    pub async fn acquire(&self) -> Option<tokio::sync::SemaphorePermit<'_>> {
        if !self.is_enabled() {
            return None;
        }
        // the semaphore is never closed, an error would only mean "no limit"
        self.sem.acquire().await.ok()
    }

    pub async fn consume(&self) {
        if !self.is_enabled() {
            return;
        }
        if let Ok(permit) = self.sem.acquire().await {
            permit.forget();
        }
    }

    pub async fn run_replenish_thread(&self, replenish: usize, interval: std::time::Duration) {
        if !self.is_enabled() {
            return;
        }
        loop {
            tokio::time::sleep(interval).await;
            let curr_permits = self.sem.available_permits();
            if curr_permits >= replenish {
                continue;
            }
            self.sem.add_permits(replenish - curr_permits);
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_semaphore_never_blocks() {
        let sem = Semaphore::new();
        assert!(!sem.is_enabled());
        assert!(sem.acquire().await.is_none());
        for _ in 0..1000 {
            sem.consume().await;
        }
    }

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let sem = Semaphore::new();
        sem.setup(2);
        let first = sem.acquire().await;
        let second = sem.acquire().await;
        assert!(first.is_some() && second.is_some());
        assert_eq!(sem.sem.available_permits(), 0);
        drop(first);
        assert_eq!(sem.sem.available_permits(), 1);
        let third = tokio::time::timeout(std::time::Duration::from_secs(1), sem.acquire()).await;
        assert!(matches!(third, Ok(Some(_))));
    }

    #[tokio::test]
    async fn setup_resets_available_permits() {
        let sem = Semaphore::new();
        sem.setup(5);
        sem.setup(1);
        assert_eq!(sem.sem.available_permits(), 1);
        sem.setup(0);
        assert!(!sem.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn consumed_tokens_are_replenished() {
        let sem = std::sync::Arc::new(Semaphore::new());
        sem.setup(3);
        for _ in 0..3 {
            sem.consume().await;
        }
        assert_eq!(sem.sem.available_permits(), 0);
        let replenisher = {
            let sem = sem.clone();
            tokio::spawn(async move {
                sem.run_replenish_thread(3, std::time::Duration::from_millis(100))
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(sem.sem.available_permits(), 3);
        replenisher.abort();
    }
}
