//! Property tests for the match rules

use proptest::prelude::*;

use lottobook_backend::models::{BetCategory, DrawNumbers, ResultKind};
use lottobook_backend::settlement::rules::{
    digit_occurrences, is_any_order_match, match_wager, permutations,
};

fn three_digits() -> impl Strategy<Value = String> {
    "[0-9]{3}"
}

fn one_digit() -> impl Strategy<Value = String> {
    "[0-9]"
}

fn sorted(s: &str) -> Vec<char> {
    let mut chars: Vec<char> = s.chars().collect();
    chars.sort_unstable();
    chars
}

proptest! {
    #[test]
    fn prop_permutations_are_bounded_and_contain_original(n in three_digits()) {
        let perms = permutations(&n);
        prop_assert!(!perms.is_empty() && perms.len() <= 6);
        prop_assert!(perms.contains(&n));
        for p in &perms {
            prop_assert_eq!(sorted(p), sorted(&n));
            prop_assert!(is_any_order_match(p, &n));
        }
    }

    #[test]
    fn prop_any_order_is_symmetric(a in three_digits(), b in three_digits()) {
        prop_assert_eq!(is_any_order_match(&a, &b), is_any_order_match(&b, &a));
        prop_assert_eq!(is_any_order_match(&a, &b), sorted(&a) == sorted(&b));
    }

    #[test]
    fn prop_running_count_equals_occurrences(d in one_digit(), r in three_digits()) {
        let expected = r.chars().filter(|c| d.starts_with(*c)).count() as u32;
        prop_assert_eq!(digit_occurrences(&d, &r), expected);

        let draw = DrawNumbers { three_digit: Some(r.clone()), ..Default::default() };
        let matches = match_wager(BetCategory::RunningHigh, &d, &draw);
        let total: u32 = matches.iter().map(|m| m.count).sum();
        prop_assert_eq!(total, expected);
        prop_assert!(matches.iter().all(|m| m.kind == ResultKind::RunningHigh));
    }

    #[test]
    fn prop_straight_any_order_pays_one_component(n in three_digits(), r in three_digits()) {
        let draw = DrawNumbers { three_digit: Some(r.clone()), ..Default::default() };
        let matches = match_wager(BetCategory::ThreeDigitStraightAnyOrder, &n, &draw);
        prop_assert!(matches.len() <= 1);
        match matches.first().map(|m| m.kind) {
            Some(ResultKind::ThreeDigitStraight) => {
                prop_assert_eq!(&n, &r);
            }
            Some(ResultKind::ThreeDigitAnyOrder) => {
                prop_assert_ne!(&n, &r);
                prop_assert!(is_any_order_match(&n, &r));
            }
            Some(other) => {
                prop_assert!(false, "unexpected kind {:?}", other);
            }
            None => {
                prop_assert!(!is_any_order_match(&n, &r));
            }
        }
    }
}
