//! Smart verify: a keyword-heuristic classifier used by the `verify` step
//! action in place of a full assertion language.
//!
//! Each predicate family is a pair of keyword lists, not a parser, the same
//! data-driven-over-clever-parsing approach the tool-bag dispatch table
//! uses.

/// Outcome of classifying a page against a `verify` step's predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Enough positive indicators, no contradicting negative ones.
    Pass,
    /// Negative indicators dominate, or no indicator fired at all.
    Fail(String),
}

struct Family {
    /// Lowercase substrings in the predicate that select this family.
    triggers: &'static [&'static str],
    positives: &'static [&'static str],
    negatives: &'static [&'static str],
}

const FAMILIES: &[Family] = &[
    Family {
        triggers: &["login", "signed in", "logged in", "sign in"],
        positives: &["welcome", "dashboard", "sign out", "log out", "logout", "account settings"],
        negatives: &["invalid", "incorrect password", "login failed", "try again", "sign in"],
    },
    Family {
        triggers: &["created", "post", "saved", "submitted"],
        positives: &["successfully created", "saved", "thank you", "confirmation", "your post"],
        negatives: &["failed", "error", "something went wrong", "could not"],
    },
    Family {
        triggers: &["approved", "approval"],
        positives: &["approved", "accepted", "confirmed"],
        negatives: &["rejected", "denied", "pending"],
    },
];

/// Generic indicators applied regardless of predicate family, so a
/// predicate that doesn't match any family above still gets a baseline
/// pass/fail signal.
const GENERIC_POSITIVES: &[&str] = &["success", "complete", "done"];
const GENERIC_NEGATIVES: &[&str] = &["error", "failed", "failure", "exception", "not found"];

/// Classifies `page_text` against `predicate`. `predicate` is matched,
/// lowercased, against each family's `triggers` to decide which keyword
/// lists apply; if none match, the generic lists are used alone.
///
/// `positives > 0 && negatives == 0`, or `positives > 2 * negatives`, is a
/// pass. Otherwise, any negative indicator is a fail; with neither
/// present, it's a fail for lack of signal.
pub fn classify(predicate: &str, page_text: &str) -> VerifyOutcome {
    let predicate_lower = predicate.to_lowercase();
    let page_lower = page_text.to_lowercase();

    let family = FAMILIES.iter().find(|family| family.triggers.iter().any(|t| predicate_lower.contains(t)));

    let (mut positives, mut negatives) = (0usize, 0usize);
    if let Some(family) = family {
        positives += count_hits(&page_lower, family.positives);
        negatives += count_hits(&page_lower, family.negatives);
    }
    positives += count_hits(&page_lower, GENERIC_POSITIVES);
    negatives += count_hits(&page_lower, GENERIC_NEGATIVES);

    let should_not = predicate_lower.contains("should not") || predicate_lower.contains("must not");
    let (positives, negatives) = if should_not { (negatives, positives) } else { (positives, negatives) };

    if positives > 0 && negatives == 0 {
        VerifyOutcome::Pass
    } else if negatives > 0 && positives > 2 * negatives {
        VerifyOutcome::Pass
    } else if negatives > 0 {
        VerifyOutcome::Fail("negative indicator present".to_string())
    } else {
        VerifyOutcome::Fail("no clear indicators".to_string())
    }
}

fn count_hits(haystack: &str, needles: &[&str]) -> usize {
    needles.iter().filter(|needle| haystack.contains(*needle)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_success_passes() {
        let outcome = classify("user should be logged in", "Welcome back! Go to your dashboard.");
        assert_eq!(outcome, VerifyOutcome::Pass);
    }

    #[test]
    fn login_failure_fails() {
        let outcome = classify("user should be logged in", "Login failed: invalid password, please try again.");
        assert!(matches!(outcome, VerifyOutcome::Fail(_)));
    }

    #[test]
    fn no_indicators_fails_for_lack_of_signal() {
        let outcome = classify("page has loaded", "Lorem ipsum dolor sit amet.");
        assert_eq!(outcome, VerifyOutcome::Fail("no clear indicators".to_string()));
    }

    #[test]
    fn should_not_predicate_inverts_polarity() {
        let outcome = classify("error message should not appear", "Everything completed successfully.");
        assert_eq!(outcome, VerifyOutcome::Pass);
    }
}
