//! When does a story end?
//!
//! After every continue call the host reports how many tokens it produced
//! and the text they decode to. Checked in order:
//!
//! 1. fewer tokens than the step budget: the model stopped on its own, done;
//! 2. a full budget of tokens but no text: the host is inconsistent, fail;
//! 3. otherwise there may be more, keep going.

use kiln_core::Generated;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// Ask the host for more.
    Continue,
    /// The story ended naturally.
    NaturalEnd,
    /// Full budget reported with empty text.
    Inconsistent,
}

impl Verdict {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Verdict::Continue)
    }
}

/// Classify one host reply against the step budget it was asked for.
pub fn classify(reply: &Generated, steps: u32) -> Verdict {
    if reply.tokens_produced < steps {
        Verdict::NaturalEnd
    } else if reply.text.is_empty() {
        Verdict::Inconsistent
    } else {
        Verdict::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(tokens_produced: u32, text: &str) -> Generated {
        Generated { tokens_produced, text: text.to_string() }
    }

    #[test]
    fn test_short_reply_ends_regardless_of_text() {
        assert_eq!(classify(&reply(19, "and they lived"), 20), Verdict::NaturalEnd);
        assert_eq!(classify(&reply(0, ""), 20), Verdict::NaturalEnd);
        assert_eq!(classify(&reply(3, ""), 20), Verdict::NaturalEnd);
    }

    #[test]
    fn test_full_reply_with_empty_text_is_inconsistent() {
        assert_eq!(classify(&reply(20, ""), 20), Verdict::Inconsistent);
        assert!(Verdict::Inconsistent.is_terminal());
    }

    #[test]
    fn test_full_reply_with_text_continues() {
        let v = classify(&reply(20, "once upon a time"), 20);
        assert_eq!(v, Verdict::Continue);
        assert!(!v.is_terminal());
    }

    #[test]
    fn test_over_budget_reply_treated_as_full() {
        assert_eq!(classify(&reply(25, "more"), 20), Verdict::Continue);
    }
}
