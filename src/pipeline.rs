use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{Result, PolysubError};

/// Per-run accumulator for elapsed time and token cost, passed explicitly
/// through the pipeline instead of living in process-wide globals. The
/// orchestrator sums one per task into batch totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    pub elapsed_secs: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Fold another run's totals into this one
    pub fn absorb(&mut self, other: &RunContext) {
        self.elapsed_secs += other.elapsed_secs;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }

    /// Human-readable elapsed time
    pub fn format_elapsed(&self) -> String {
        let seconds = self.elapsed_secs as u64;
        if seconds < 60 {
            format!("{}s", seconds)
        } else if seconds < 3600 {
            format!("{}m {}s", seconds / 60, seconds % 60)
        } else {
            format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
        }
    }
}

/// Runs pipeline steps with a bounded retry budget and exponential backoff.
/// Delays are `base * 3^(attempt-1)` seconds between attempts; a step that
/// exhausts its budget becomes a `Pipeline { step, message }` error carrying
/// the step name for the task table.
pub struct PipelineRunner {
    max_attempts: u32,
    base_delay: Duration,
}

impl PipelineRunner {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_secs(config.retry_base_delay_secs),
        }
    }

    #[cfg(test)]
    fn with_budget(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Run one named step, retrying on failure
    pub async fn run<F, Fut, T>(&self, step: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                info!("{}: attempt {}/{}", step, attempt, self.max_attempts);
            } else {
                info!("{}", step);
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt == self.max_attempts => {
                    return Err(PolysubError::Pipeline {
                        step: step.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.base_delay * 3u32.pow(attempt - 1);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        step, attempt, self.max_attempts, e, delay
                    );
                    sleep(delay).await;
                }
            }
        }

        unreachable!("retry loop always returns")
    }
}
