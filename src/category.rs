//! Category derivation: a title-and-ticker substring classifier mapping each
//! market to a two-level label (`Parent - Sub`), falling back to `Misc`.
//!
//! The rule table is data, not structure — add rows rather than branches.

struct Rule {
    parent: &'static str,
    sub: &'static str,
    keywords: &'static [&'static str],
}

const RULES: &[Rule] = &[
    Rule { parent: "Elections", sub: "Senate", keywords: &["senate", "senator"] },
    Rule { parent: "Elections", sub: "House", keywords: &["house race", "congressional district"] },
    Rule { parent: "Elections", sub: "Presidential", keywords: &["president", "presidential", "electoral college"] },
    Rule { parent: "Elections", sub: "Governor", keywords: &["governor", "gubernatorial"] },
    Rule { parent: "Appointments", sub: "Supreme Court", keywords: &["supreme court", "scotus"] },
    Rule { parent: "Appointments", sub: "Cabinet", keywords: &["secretary of", "cabinet nominee"] },
    Rule { parent: "Economics", sub: "Federal Reserve", keywords: &["fed ", "federal reserve", "fomc", "rate cut", "rate hike"] },
    Rule { parent: "Economics", sub: "Inflation", keywords: &["cpi", "inflation"] },
    Rule { parent: "Economics", sub: "Employment", keywords: &["jobs report", "unemployment", "nonfarm payroll"] },
    Rule { parent: "International", sub: "Foreign Policy", keywords: &["nato", "sanctions", "ceasefire", "treaty"] },
    Rule { parent: "International", sub: "Conflict", keywords: &["war", "invasion", "military strike"] },
    Rule { parent: "Weather", sub: "Climate", keywords: &["hurricane", "temperature record", "climate"] },
    Rule { parent: "Entertainment", sub: "Awards", keywords: &["oscar", "grammy", "academy award"] },
    Rule { parent: "Sports", sub: "Championship", keywords: &["super bowl", "world series", "championship"] },
];

pub const FALLBACK: &str = "Misc";

/// Classifies a market by its title and ticker, case-insensitively, returning
/// the first matching rule's `Parent - Sub` label, or [`FALLBACK`].
pub fn derive_category(title: &str, ticker: &str) -> String {
    let haystack = format!("{} {}", title.to_lowercase(), ticker.to_lowercase());
    for rule in RULES {
        if rule.keywords.iter().any(|kw| haystack.contains(kw)) {
            return format!("{} - {}", rule.parent, rule.sub);
        }
    }
    FALLBACK.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_senate_keyword() {
        assert_eq!(derive_category("Will the Senate pass the bill?", "SENATE-VOTE"), "Elections - Senate");
    }

    #[test]
    fn matches_on_ticker_when_title_is_silent() {
        assert_eq!(derive_category("Will it happen", "FED-RATE-25DEC"), "Economics - Federal Reserve");
    }

    #[test]
    fn falls_back_to_misc() {
        assert_eq!(derive_category("Will the new bridge open on time?", "BRIDGE-1"), FALLBACK);
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_category("Supreme Court nominee confirmed?", "SCOTUS-1");
        let b = derive_category("Supreme Court nominee confirmed?", "SCOTUS-1");
        assert_eq!(a, b);
    }
}
