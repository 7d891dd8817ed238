//! Match Rules
//!
//! Pure functions deciding how many times a wager number matches a draw. One
//! rule per bet category; all any-order logic goes through [`permutations`].

use std::collections::BTreeSet;

use crate::models::{BetCategory, DrawNumbers, ResultKind};

/// One matched component of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    pub kind: ResultKind,
    /// Number of independent wins (running bets can win more than once)
    pub count: u32,
}

/// All distinct orderings of the digits in `number`.
///
/// Repeated digits collapse: "112" yields {"112", "121", "211"}.
pub fn permutations(number: &str) -> BTreeSet<String> {
    let mut digits: Vec<char> = number.chars().collect();
    let mut out = BTreeSet::new();
    permute(&mut digits, 0, &mut out);
    out
}

fn permute(digits: &mut [char], start: usize, out: &mut BTreeSet<String>) {
    if start >= digits.len() {
        out.insert(digits.iter().collect());
        return;
    }
    for i in start..digits.len() {
        digits.swap(start, i);
        permute(digits, start + 1, out);
        digits.swap(start, i);
    }
}

/// True when `number` is some ordering of `result`'s digits.
pub fn is_any_order_match(number: &str, result: &str) -> bool {
    number.len() == result.len() && permutations(result).contains(number)
}

/// Occurrences of a single digit within a result string.
pub fn digit_occurrences(digit: &str, result: &str) -> u32 {
    let mut chars = digit.chars();
    match (chars.next(), chars.next()) {
        (Some(d), None) => result.chars().filter(|c| *c == d).count() as u32,
        _ => 0,
    }
}

/// Evaluate one wager number against the draw.
///
/// Returns one entry per winning component. An absent result field never
/// matches.
pub fn match_wager(category: BetCategory, number: &str, draw: &DrawNumbers) -> Vec<RuleMatch> {
    let hit = |kind| vec![RuleMatch { kind, count: 1 }];

    match category {
        BetCategory::TwoDigitHigh => match &draw.two_digit_high {
            Some(r) if r == number => hit(ResultKind::TwoDigitHigh),
            _ => Vec::new(),
        },
        BetCategory::TwoDigitLow => match &draw.two_digit_low {
            Some(r) if r == number => hit(ResultKind::TwoDigitLow),
            _ => Vec::new(),
        },
        BetCategory::ThreeDigitStraight => match &draw.three_digit {
            Some(r) if r == number => hit(ResultKind::ThreeDigitStraight),
            _ => Vec::new(),
        },
        BetCategory::ThreeDigitAnyOrder => match &draw.three_digit {
            Some(r) if is_any_order_match(number, r) => hit(ResultKind::ThreeDigitAnyOrder),
            _ => Vec::new(),
        },
        BetCategory::ThreeDigitStraightAnyOrder => match &draw.three_digit {
            // The exact number pays the straight component only.
            Some(r) if r == number => hit(ResultKind::ThreeDigitStraight),
            Some(r) if is_any_order_match(number, r) => hit(ResultKind::ThreeDigitAnyOrder),
            _ => Vec::new(),
        },
        BetCategory::RunningHigh => running(ResultKind::RunningHigh, number, &draw.three_digit),
        BetCategory::RunningLow => running(ResultKind::RunningLow, number, &draw.two_digit_low),
    }
}

fn running(kind: ResultKind, digit: &str, result: &Option<String>) -> Vec<RuleMatch> {
    let count = result
        .as_deref()
        .map(|r| digit_occurrences(digit, r))
        .unwrap_or(0);
    if count == 0 {
        Vec::new()
    } else {
        vec![RuleMatch { kind, count }]
    }
}

/// The result field a match of `kind` was made against.
pub fn winning_number(kind: ResultKind, draw: &DrawNumbers) -> Option<&str> {
    match kind {
        ResultKind::TwoDigitHigh => draw.two_digit_high.as_deref(),
        ResultKind::TwoDigitLow | ResultKind::RunningLow => draw.two_digit_low.as_deref(),
        ResultKind::ThreeDigitStraight
        | ResultKind::ThreeDigitAnyOrder
        | ResultKind::RunningHigh => draw.three_digit.as_deref(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(high: Option<&str>, low: Option<&str>, three: Option<&str>) -> DrawNumbers {
        DrawNumbers {
            two_digit_high: high.map(str::to_string),
            two_digit_low: low.map(str::to_string),
            three_digit: three.map(str::to_string),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_permutations_distinct_digits() {
        assert_eq!(
            permutations("123"),
            set(&["123", "132", "213", "231", "312", "321"])
        );
    }

    #[test]
    fn test_permutations_repeated_digits_collapse() {
        assert_eq!(permutations("112"), set(&["112", "121", "211"]));
        assert_eq!(permutations("777"), set(&["777"]));
    }

    #[test]
    fn test_any_order_matches_exactly_the_permutations() {
        let d = draw(None, None, Some("123"));
        let winners: BTreeSet<String> = (0..1000)
            .map(|n| format!("{n:03}"))
            .filter(|n| !match_wager(BetCategory::ThreeDigitAnyOrder, n, &d).is_empty())
            .collect();
        assert_eq!(winners, set(&["123", "132", "213", "231", "312", "321"]));

        let d = draw(None, None, Some("112"));
        let winners: BTreeSet<String> = (0..1000)
            .map(|n| format!("{n:03}"))
            .filter(|n| !match_wager(BetCategory::ThreeDigitAnyOrder, n, &d).is_empty())
            .collect();
        assert_eq!(winners, set(&["112", "121", "211"]));
    }

    #[test]
    fn test_two_digit_rules_use_their_own_field() {
        let d = draw(Some("12"), Some("34"), None);
        assert_eq!(
            match_wager(BetCategory::TwoDigitHigh, "12", &d),
            vec![RuleMatch { kind: ResultKind::TwoDigitHigh, count: 1 }]
        );
        assert!(match_wager(BetCategory::TwoDigitHigh, "34", &d).is_empty());
        assert_eq!(
            match_wager(BetCategory::TwoDigitLow, "34", &d),
            vec![RuleMatch { kind: ResultKind::TwoDigitLow, count: 1 }]
        );
    }

    #[test]
    fn test_straight_requires_exact_order() {
        let d = draw(None, None, Some("345"));
        assert_eq!(match_wager(BetCategory::ThreeDigitStraight, "345", &d).len(), 1);
        assert!(match_wager(BetCategory::ThreeDigitStraight, "453", &d).is_empty());
    }

    #[test]
    fn test_straight_any_order_exclusivity() {
        let d = draw(None, None, Some("123"));
        assert_eq!(
            match_wager(BetCategory::ThreeDigitStraightAnyOrder, "123", &d),
            vec![RuleMatch { kind: ResultKind::ThreeDigitStraight, count: 1 }]
        );
        assert_eq!(
            match_wager(BetCategory::ThreeDigitStraightAnyOrder, "213", &d),
            vec![RuleMatch { kind: ResultKind::ThreeDigitAnyOrder, count: 1 }]
        );
        assert!(match_wager(BetCategory::ThreeDigitStraightAnyOrder, "456", &d).is_empty());
    }

    #[test]
    fn test_running_counts_occurrences() {
        let d = draw(None, Some("77"), Some("779"));
        assert_eq!(
            match_wager(BetCategory::RunningHigh, "7", &d),
            vec![RuleMatch { kind: ResultKind::RunningHigh, count: 2 }]
        );
        assert_eq!(
            match_wager(BetCategory::RunningHigh, "9", &d),
            vec![RuleMatch { kind: ResultKind::RunningHigh, count: 1 }]
        );
        assert!(match_wager(BetCategory::RunningHigh, "3", &d).is_empty());
        assert_eq!(
            match_wager(BetCategory::RunningLow, "7", &d),
            vec![RuleMatch { kind: ResultKind::RunningLow, count: 2 }]
        );
    }

    #[test]
    fn test_missing_fields_never_match() {
        let d = DrawNumbers::default();
        for category in BetCategory::ALL {
            let number = "1".repeat(category.digits());
            assert!(match_wager(category, &number, &d).is_empty(), "{category}");
        }
    }

    #[test]
    fn test_digit_occurrences_rejects_multi_char() {
        assert_eq!(digit_occurrences("77", "777"), 0);
        assert_eq!(digit_occurrences("", "777"), 0);
    }

    #[test]
    fn test_winning_number_per_kind() {
        let d = draw(Some("12"), Some("34"), Some("567"));
        assert_eq!(winning_number(ResultKind::RunningLow, &d), Some("34"));
        assert_eq!(winning_number(ResultKind::RunningHigh, &d), Some("567"));
        assert_eq!(winning_number(ResultKind::TwoDigitHigh, &d), Some("12"));
    }
}
