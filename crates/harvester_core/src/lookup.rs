//! First-success-wins composition of fallback strategies.

type Step<'a, I, T> = Box<dyn Fn(&I) -> Option<T> + 'a>;

/// A value produced by a [`LookupChain`], tagged with the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub strategy: &'static str,
}

/// Ordered list of named lookup strategies over the same input.
///
/// Strategies run in insertion order; the first one returning `Some` wins and
/// later strategies are not evaluated.
pub struct LookupChain<'a, I, T> {
    steps: Vec<(&'static str, Step<'a, I, T>)>,
}

impl<'a, I, T> LookupChain<'a, I, T> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn then(mut self, name: &'static str, step: impl Fn(&I) -> Option<T> + 'a) -> Self {
        self.steps.push((name, Box::new(step)));
        self
    }

    pub fn resolve(&self, input: &I) -> Option<Resolved<T>> {
        self.steps.iter().find_map(|(name, step)| {
            step(input).map(|value| Resolved {
                value,
                strategy: name,
            })
        })
    }
}

impl<I, T> Default for LookupChain<'_, I, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Try each candidate in order until one succeeds.
///
/// Returns the first success, or every failure in attempt order when none
/// succeeded (empty when there were no candidates).
pub fn first_success<C, T, E>(
    candidates: impl IntoIterator<Item = C>,
    mut attempt: impl FnMut(C) -> Result<T, E>,
) -> Result<T, Vec<E>> {
    let mut failures = Vec::new();
    for candidate in candidates {
        match attempt(candidate) {
            Ok(value) => return Ok(value),
            Err(err) => failures.push(err),
        }
    }
    Err(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn first_matching_strategy_wins_and_later_ones_are_skipped() {
        let later_calls = Cell::new(0);
        let chain = LookupChain::new()
            .then("empty", |_: &&str| None)
            .then("upper", |s: &&str| Some(s.to_uppercase()))
            .then("counted", |s: &&str| {
                later_calls.set(later_calls.get() + 1);
                Some(s.to_string())
            });

        let resolved = chain.resolve(&"abc").unwrap();
        assert_eq!(resolved.value, "ABC");
        assert_eq!(resolved.strategy, "upper");
        assert_eq!(later_calls.get(), 0);
    }

    #[test]
    fn exhausted_chain_resolves_to_none() {
        let chain: LookupChain<'_, u32, u32> = LookupChain::new().then("never", |_| None);
        assert!(chain.resolve(&7).is_none());
    }

    #[test]
    fn first_success_collects_failures_in_order() {
        let result: Result<u32, Vec<String>> =
            first_success(["x", "y"], |c| Err(format!("bad {c}")));
        assert_eq!(result.unwrap_err(), vec!["bad x", "bad y"]);

        let result: Result<u32, Vec<String>> = first_success(["x", "42"], |c| {
            c.parse::<u32>().map_err(|e| e.to_string())
        });
        assert_eq!(result.unwrap(), 42);
    }
}
