//! Ordered "first success wins" strategy runner.
//!
//! Token tiers, document token lookups, identifier extraction and secondary
//! field lookups all run through the same model: a list of named strategies is
//! tried in order, each attempt is recorded, and the first hit stops the chain.

use futures::future::BoxFuture;
use serde::Serialize;

/// Result of one strategy: `Ok(Some)` is a hit, `Ok(None)` a miss and `Err`
/// a failure with a human-readable reason.
pub type StrategyResult<T> = std::result::Result<Option<T>, String>;

/// Outcome of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum AttemptOutcome {
    /// The strategy produced a value
    Hit,
    /// The strategy ran but found nothing
    Miss,
    /// The strategy could not run to completion
    Failed(String),
}

/// One recorded attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    /// Strategy name
    pub strategy: String,
    /// What happened
    pub outcome: AttemptOutcome,
}

impl Attempt {
    /// Build an attempt record.
    #[must_use]
    pub fn new(strategy: impl Into<String>, outcome: AttemptOutcome) -> Self {
        Self {
            strategy: strategy.into(),
            outcome,
        }
    }

    /// Whether this attempt produced the value.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.outcome == AttemptOutcome::Hit
    }
}

/// Value produced by a chain plus the full attempt log.
#[derive(Debug, Clone)]
pub struct StrategyReport<T> {
    /// Winning value, if any strategy hit
    pub value: Option<T>,
    /// Name of the winning strategy
    pub winner: Option<String>,
    /// Every attempt, in execution order
    pub attempts: Vec<Attempt>,
}

impl<T> Default for StrategyReport<T> {
    fn default() -> Self {
        Self {
            value: None,
            winner: None,
            attempts: Vec::new(),
        }
    }
}

impl<T> StrategyReport<T> {
    /// Empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of `strategy`. Returns `true` when it was a hit.
    pub fn record(&mut self, strategy: &str, result: StrategyResult<T>) -> bool {
        let outcome = match result {
            Ok(Some(value)) => {
                self.value = Some(value);
                self.winner = Some(strategy.to_string());
                AttemptOutcome::Hit
            }
            Ok(None) => AttemptOutcome::Miss,
            Err(reason) => {
                tracing::debug!("Strategy {} failed: {}", strategy, reason);
                AttemptOutcome::Failed(reason)
            }
        };
        let hit = outcome == AttemptOutcome::Hit;
        self.attempts.push(Attempt::new(strategy, outcome));
        hit
    }

    /// Whether some strategy hit.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.value.is_some()
    }

    /// Names of the attempted strategies, in order.
    #[must_use]
    pub fn attempted(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.strategy.as_str()).collect()
    }

    /// Map the winning value, keeping the attempt log.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StrategyReport<U> {
        StrategyReport {
            value: self.value.map(f),
            winner: self.winner,
            attempts: self.attempts,
        }
    }
}

/// Synchronous strategy signature.
pub type StrategyFn<I, T> = fn(&I) -> StrategyResult<T>;

/// Ordered list of synchronous strategies over an input `I`.
pub struct StrategyChain<I, T> {
    strategies: Vec<(&'static str, StrategyFn<I, T>)>,
}

impl<I, T> Default for StrategyChain<I, T> {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }
}

impl<I, T> StrategyChain<I, T> {
    /// Empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy.
    #[must_use]
    pub fn then(mut self, name: &'static str, strategy: StrategyFn<I, T>) -> Self {
        self.strategies.push((name, strategy));
        self
    }

    /// Strategy names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|(name, _)| *name).collect()
    }

    /// Run strategies in order until one hits.
    pub fn run(&self, input: &I) -> StrategyReport<T> {
        let mut report = StrategyReport::new();
        for (name, strategy) in &self.strategies {
            if report.record(name, strategy(input)) {
                break;
            }
        }
        report
    }
}

/// Named, not-yet-started async strategy.
pub type AsyncStrategy<'a, T> = (&'static str, BoxFuture<'a, StrategyResult<T>>);

/// Run async strategies in order until one hits.
///
/// Futures are only polled when reached, so strategies after the winner never run.
pub async fn run_async_chain<T>(strategies: Vec<AsyncStrategy<'_, T>>) -> StrategyReport<T> {
    let mut report = StrategyReport::new();
    for (name, strategy) in strategies {
        if report.record(name, strategy.await) {
            break;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn miss(_: &u32) -> StrategyResult<u32> {
        Ok(None)
    }

    fn fail(_: &u32) -> StrategyResult<u32> {
        Err("boom".to_string())
    }

    fn double(input: &u32) -> StrategyResult<u32> {
        Ok(Some(input * 2))
    }

    fn never(_: &u32) -> StrategyResult<u32> {
        panic!("strategy after the winner must not run");
    }

    #[test]
    fn test_first_hit_wins_and_attempts_are_ordered() {
        let chain = StrategyChain::new()
            .then("miss", miss)
            .then("fail", fail)
            .then("double", double)
            .then("never", never);

        let report = chain.run(&21);
        assert_eq!(report.value, Some(42));
        assert_eq!(report.winner.as_deref(), Some("double"));
        assert_eq!(report.attempted(), vec!["miss", "fail", "double"]);
        assert_eq!(
            report.attempts[1].outcome,
            AttemptOutcome::Failed("boom".to_string())
        );
    }

    #[test]
    fn test_all_miss() {
        let chain = StrategyChain::new().then("miss", miss).then("fail", fail);
        let report = chain.run(&1);
        assert!(!report.is_hit());
        assert!(report.winner.is_none());
        assert_eq!(report.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_async_chain_does_not_poll_after_hit() {
        let polled = AtomicUsize::new(0);
        let polled_ref = &polled;

        let strategies: Vec<AsyncStrategy<'_, &str>> = vec![
            ("first", async { Ok(None) }.boxed()),
            ("second", async { Ok(Some("token")) }.boxed()),
            (
                "third",
                async move {
                    polled_ref.fetch_add(1, Ordering::SeqCst);
                    Ok(Some("late"))
                }
                .boxed(),
            ),
        ];

        let report = run_async_chain(strategies).await;
        assert_eq!(report.value, Some("token"));
        assert_eq!(report.attempted(), vec!["first", "second"]);
        assert_eq!(polled.load(Ordering::SeqCst), 0);
    }
}
