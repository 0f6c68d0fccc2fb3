//! Interfering-rule detection.
//!
//! Runs only when a rule failed on `current` but matched `original` on retry.
//! Every earlier rule is replayed on `original`; if its rewrite leaves a string
//! the failing rule can no longer match, the earlier rule is reported. This is
//! diagnostics: the cascade's control flow does not depend on the result.

use std::sync::Arc;
use tracing::trace;

use crate::rule::{ExecLimits, Rule, RuleId};

/// Ids of the rules in `earlier` that defeat `rule` on `original`, in cascade
/// order.
pub(crate) fn find_interfering_rules(
    earlier: &[Arc<Rule>],
    rule: &Rule,
    original: &str,
    limits: &ExecLimits,
) -> Vec<RuleId> {
    let mut found = Vec::new();

    for candidate in earlier {
        let first = match candidate.simulate(original, limits) {
            Ok(rw) => rw,
            Err(err) => {
                trace!(rule = candidate.id(), %err, "interference check skipped");
                continue;
            }
        };
        if !first.changes(original) {
            continue;
        }

        match rule.simulate(&first.output, limits) {
            Ok(second) if !second.matched => found.push(candidate.id()),
            Ok(_) => {}
            Err(err) => trace!(rule = rule.id(), %err, "interference check skipped"),
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_set::RuleSetBuilder;

    #[test]
    fn reports_rule_that_eats_the_match() {
        // "amazon" is erased by rule 1, so rule 2 can only see it on the original.
        let set = RuleSetBuilder::new()
            .add(r"\d+", "N")
            .add("amazon", "")
            .add(r"amazon", "Ecommerce")
            .build()
            .unwrap();
        let found = find_interfering_rules(&set.rules()[..2], &set.rules()[2], "amazon 123", &ExecLimits::default());
        assert_eq!(found, [1]);
    }

    #[test]
    fn ignores_rules_that_do_not_touch_the_original() {
        let set = RuleSetBuilder::new().add("paypal", "PP").add("amazon", "Ecommerce").build().unwrap();
        let found = find_interfering_rules(&set.rules()[..1], &set.rules()[1], "amazon", &ExecLimits::default());
        assert!(found.is_empty());
    }
}
