//! Attempt-tracking retry policy. Unlike a plain retry loop that only
//! returns the final value, this hands back every attempt's outcome so
//! callers can persist a per-attempt ledger row (see
//! [`crate::models::LlmUsageLogRow`]) instead of only knowing the call
//! eventually succeeded.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Attempt {
    pub attempt_number: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("exhausted {attempts} attempt(s), last error: {last_error}")]
    Exhausted { attempts: u32, last_error: E },
}

impl RetryPolicy {
    /// Runs `f` up to `max_attempts` times with an exponential backoff
    /// (`base_delay * 2^attempt_index`) between failures, returning the
    /// success value alongside the full attempt log, or the last error if
    /// every attempt failed.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut f: F,
    ) -> Result<(T, Vec<Attempt>), RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug + Clone + std::fmt::Display,
    {
        let mut attempts = Vec::with_capacity(self.max_attempts as usize);
        let mut last_error: Option<E> = None;

        for attempt_number in 0..self.max_attempts {
            match f(attempt_number).await {
                Ok(value) => {
                    attempts.push(Attempt {
                        attempt_number,
                        error: None,
                    });
                    return Ok((value, attempts));
                }
                Err(err) => {
                    attempts.push(Attempt {
                        attempt_number,
                        error: Some(err.to_string()),
                    });
                    last_error = Some(err.clone());
                    if attempt_number + 1 < self.max_attempts {
                        let delay = self.base_delay * 2u32.pow(attempt_number);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(RetryError::Exhausted {
            attempts: self.max_attempts,
            last_error: last_error.expect("at least one attempt runs"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_try_with_a_single_attempt_logged() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let (value, attempts) = policy
            .run::<_, String, _, _>(|_| async { Ok::<_, String>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].error.is_none());
    }

    #[tokio::test]
    async fn retries_and_records_every_failed_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let (value, attempts) = policy
            .run(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("not yet".to_string())
                    } else {
                        Ok(99)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 99);
        assert_eq!(attempts.len(), 3);
        assert!(attempts[0].error.is_some());
        assert!(attempts[1].error.is_some());
        assert!(attempts[2].error.is_none());
    }

    #[tokio::test]
    async fn exhausting_all_attempts_returns_the_last_error() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        };
        let result = policy
            .run::<i32, _, _, _>(|_| async { Err::<i32, String>("nope".to_string()) })
            .await;
        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 2),
            Ok(_) => panic!("expected exhaustion"),
        }
    }
}
