//! Ordered fallback strategies.
//!
//! A list of named attempts is tried in order until one succeeds. Every
//! failure before the winner is kept so callers can explain what was tried.

use log::trace;
use std::fmt;

type Run<'a, T, E> = Box<dyn FnOnce() -> Result<T, E> + 'a>;

/// A named attempt at producing a `T`.
pub struct Strategy<'a, T, E> {
    name: String,
    run: Run<'a, T, E>,
}

impl<'a, T, E> Strategy<'a, T, E> {
    /// Create a strategy called `name` that runs `run` when tried.
    pub fn new(name: impl Into<String>, run: impl FnOnce() -> Result<T, E> + 'a) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }
}

impl<T, E> fmt::Debug for Strategy<'_, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name).finish()
    }
}

/// A failed attempt and its diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt<E> {
    /// Name of the strategy that failed.
    pub name: String,
    /// The error it produced.
    pub error: E,
}

/// The outcome of the first strategy that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Success<T, E> {
    /// Name of the winning strategy.
    pub name: String,
    /// The value it produced.
    pub value: T,
    /// Attempts that failed before it, in order.
    pub failed: Vec<Attempt<E>>,
}

/// Every strategy failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    /// Failed attempts, in the order they were tried.
    pub attempts: Vec<Attempt<E>>,
}

impl<E> Exhausted<E> {
    /// Names of the attempted strategies.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.name.as_str()).collect()
    }

    /// The last failure, if any strategy ran.
    #[must_use]
    pub fn last(&self) -> Option<&Attempt<E>> {
        self.attempts.last()
    }
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return f.write_str("no strategies to try");
        }
        f.write_str("all strategies failed: ")?;
        for (index, attempt) in self.attempts.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", attempt.name, attempt.error)?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Exhausted<E> {}

/// Try `strategies` in order and return the first success.
///
/// # Errors
///
/// Returns [`Exhausted`] listing every attempt when none succeeds, including
/// when `strategies` is empty.
///
/// # Examples
///
/// ```
/// use provenance_verifier::fallback::{Strategy, first_success};
///
/// let outcome = first_success(vec![
///     Strategy::new("primary", || Err::<u32, _>("offline")),
///     Strategy::new("mirror", || Ok(7)),
/// ])
/// .expect("mirror succeeds");
///
/// assert_eq!(outcome.name, "mirror");
/// assert_eq!(outcome.value, 7);
/// assert_eq!(outcome.failed.len(), 1);
/// ```
pub fn first_success<T, E>(
    strategies: Vec<Strategy<'_,
    T,
    E>>,
) -> Result<Success<T, E>, Exhausted<E>> {
    first_success_observed(strategies, |_| {})
}

/// Like [`first_success`], calling `on_failure` after each failed attempt.
///
/// The observer runs before the next strategy starts, so it can report the
/// switch to a fallback as it happens.
///
/// # Errors
///
/// Returns [`Exhausted`] when no strategy succeeds.
pub fn first_success_observed<T, E>(
    strategies: Vec<Strategy<'_, T, E>>,
    mut on_failure: impl FnMut(&Attempt<E>),
) -> Result<Success<T, E>, Exhausted<E>> {
    let mut failed = Vec::new();
    for strategy in strategies {
        let Strategy { name, run } = strategy;
        trace!("trying strategy {name}");
        match run() {
            Ok(value) => {
                trace!("strategy {name} succeeded");
                return Ok(Success {
                    name,
                    value,
                    failed,
                });
            }
            Err(error) => {
                trace!("strategy {name} failed");
                let attempt = Attempt { name, error };
                on_failure(&attempt);
                failed.push(attempt);
            }
        }
    }
    Err(Exhausted { attempts: failed })
}
