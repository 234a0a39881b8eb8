//! Scenario trait and the input-selection helpers scenarios share

use async_trait::async_trait;
use loadcheck_core::{CheckGroup, Rate, Response};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::vu::Vu;

/// One pipeline's per-iteration request sequence
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Scenario name
    fn name(&self) -> &str;

    /// Run one iteration on `vu`.
    ///
    /// Request failures are recorded into metrics and never abort the
    /// iteration.
    async fn iteration(&self, vu: &mut Vu);
}

/// Uniform choice from `pool`, `None` when it is empty
pub fn pick<'a, T, R: Rng + ?Sized>(rng: &mut R, pool: &'a [T]) -> Option<&'a T> {
    pool.choose(rng)
}

/// Conjunction of every check group evaluated during one iteration.
///
/// Error rates take one sample per iteration: an iteration fails when any of
/// its responses failed a check.
#[derive(Debug, Clone, Copy)]
pub struct IterationOutcome {
    ok: bool,
}

impl Default for IterationOutcome {
    fn default() -> Self {
        Self { ok: true }
    }
}

impl IterationOutcome {
    /// Evaluate `group` against `response` and fold the result in
    pub fn check(&mut self, group: &CheckGroup, response: &Response) -> bool {
        let passed = group.evaluate(response);
        self.ok &= passed;
        passed
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Push the iteration's sample into `errors`
    pub fn finish(self, errors: &Rate) {
        errors.add(!self.ok);
    }
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Throwaway sign-up address `loadtest{epoch_ms}{5 base36 chars}@temp.com`
pub fn unique_email<R: Rng + ?Sized>(rng: &mut R, epoch_ms: i64) -> String {
    let suffix: String = (0..5)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("loadtest{}{}@temp.com", epoch_ms, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadcheck_core::{BuiltinMetrics, Predicate, Registry};
    use rand::SeedableRng;
    use std::time::Duration;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_pick_single_element_pool() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let pool = ["loadtest1@example.com".to_string()];
        for _ in 0..100 {
            assert_eq!(pick(&mut rng, &pool).unwrap(), "loadtest1@example.com");
        }
    }

    #[test]
    fn test_iteration_outcome_one_sample_per_iteration() {
        let mut registry = Registry::new();
        BuiltinMetrics::register(&mut registry).unwrap();
        let errors = registry.rate("errors").unwrap();
        let group = CheckGroup::new(
            &mut registry,
            [("status is 200", Predicate::status_in([200]))],
        )
        .unwrap();

        let ok = Response::new(200, Duration::from_millis(10));
        let failed = Response::new(503, Duration::from_millis(10));

        // Four iterations of five responses, one failing response in the last
        for i in 0..4 {
            let mut outcome = IterationOutcome::default();
            for j in 0..5 {
                let response = if i == 3 && j == 2 { &failed } else { &ok };
                outcome.check(&group, response);
            }
            assert_eq!(outcome.is_ok(), i != 3);
            outcome.finish(&errors);
        }

        assert_eq!(errors.total(), 4);
        assert_eq!(errors.passes(), 1);
        assert_eq!(errors.rate(), Some(0.25));
    }

    #[test]
    fn test_pick_empty_pool() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let pool: [u32; 0] = [];
        assert!(pick(&mut rng, &pool).is_none());
    }

    #[test]
    fn test_pick_covers_pool() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let pool = ["a", "b", "c", "d"];
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            seen.insert(*pick(&mut rng, &pool).unwrap());
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_unique_email_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let email = unique_email(&mut rng, 1_760_000_000_000);

        let local = email.strip_suffix("@temp.com").unwrap();
        let suffix = local.strip_prefix("loadtest1760000000000").unwrap();
        assert_eq!(suffix.len(), 5);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));

        assert_ne!(email, unique_email(&mut rng, 1_760_000_000_000));
    }
}
