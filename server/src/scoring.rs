//! Answer validation, uniqueness scoring and the per-round draws

use crate::config::CategoryPool;
use log::warn;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::AnswerSheet;
use std::collections::HashMap;

pub const UNIQUE_ANSWER_POINTS: u32 = 10;
pub const SHARED_ANSWER_POINTS: u32 = 5;
pub const MIN_ANSWER_CHARS: usize = 3;
pub const MAX_CHAR_OCCURRENCES: usize = 2;

pub const DEFAULT_LETTER_WEIGHT: u32 = 5;
pub const RARE_LETTER_WEIGHTS: [(char, u32); 7] = [
    ('Z', 1),
    ('X', 1),
    ('Y', 1),
    ('W', 1),
    ('Q', 2),
    ('H', 2),
    ('K', 2),
];

/// One player's submission for a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSet {
    pub player: String,
    pub answers: AnswerSheet,
}

impl AnswerSet {
    pub fn new(player: &str, answers: AnswerSheet) -> Self {
        Self {
            player: player.to_string(),
            answers,
        }
    }
}

/// Checks an answer against the round letter
///
/// Valid answers have at least three characters, start with the round letter
/// (case-insensitive) and contain no character more than twice.
pub fn is_valid_answer(answer: &str, letter: char) -> bool {
    let starts_with_letter = match answer.chars().next() {
        Some(first) => first.to_uppercase().eq(letter.to_uppercase()),
        None => false,
    };
    if !starts_with_letter || answer.chars().count() < MIN_ANSWER_CHARS {
        return false;
    }

    let mut occurrences: HashMap<char, usize> = HashMap::new();
    for c in answer.chars() {
        let count = occurrences.entry(c).or_insert(0);
        *count += 1;
        if *count > MAX_CHAR_OCCURRENCES {
            return false;
        }
    }
    true
}

/// Counts how many players gave each valid answer, per round category
///
/// Answers are compared exactly as submitted, so "Paris" and "paris" are
/// different words. Keys outside the round's categories are ignored.
pub fn count_answers<'a>(
    letter: char,
    categories: &'a [String],
    submissions: &'a [AnswerSet],
) -> HashMap<&'a str, HashMap<&'a str, usize>> {
    let mut counts: HashMap<&str, HashMap<&str, usize>> = HashMap::new();

    for category in categories {
        let tally = counts.entry(category.as_str()).or_default();
        for submission in submissions {
            if let Some(answer) = submission.answers.get(category) {
                if is_valid_answer(answer, letter) {
                    *tally.entry(answer.as_str()).or_insert(0) += 1;
                }
            }
        }
    }

    counts
}

/// Computes the points each submitting player earned this round
///
/// A valid answer nobody else gave is worth 10 points, a valid answer shared
/// with at least one other player is worth 5. Every submitter gets an entry,
/// even when it is zero.
pub fn score_round(
    letter: char,
    categories: &[String],
    submissions: &[AnswerSet],
) -> HashMap<String, u32> {
    let counts = count_answers(letter, categories, submissions);
    let mut gains = HashMap::new();

    for submission in submissions {
        let mut points = 0;
        for category in categories {
            let Some(answer) = submission.answers.get(category) else {
                continue;
            };
            let seen = counts
                .get(category.as_str())
                .and_then(|tally| tally.get(answer.as_str()))
                .copied()
                .unwrap_or(0);

            points += match seen {
                0 => 0,
                1 => UNIQUE_ANSWER_POINTS,
                _ => SHARED_ANSWER_POINTS,
            };
        }
        *gains.entry(submission.player.clone()).or_insert(0) += points;
    }

    gains
}

pub fn letter_weights() -> Vec<(char, u32)> {
    ('A'..='Z')
        .map(|letter| {
            let weight = RARE_LETTER_WEIGHTS
                .iter()
                .find(|(rare, _)| *rare == letter)
                .map(|(_, weight)| *weight)
                .unwrap_or(DEFAULT_LETTER_WEIGHT);
            (letter, weight)
        })
        .collect()
}

/// Draws the round letter with rare letters down-weighted
pub fn draw_letter<R: Rng>(rng: &mut R) -> char {
    let weights = letter_weights();
    match WeightedIndex::new(weights.iter().map(|(_, weight)| *weight)) {
        Ok(dist) => weights[dist.sample(rng)].0,
        Err(e) => {
            warn!("Letter weights rejected ({}), drawing uniformly", e);
            rng.gen_range('A'..='Z')
        }
    }
}

/// Draws one prompt from every pool, in pool order
///
/// A prompt already drawn from an earlier pool is never drawn again, since a
/// repeated category would be tallied and scored twice. A pool left with no
/// fresh prompt contributes nothing.
pub fn draw_categories<R: Rng>(pools: &[CategoryPool], rng: &mut R) -> Vec<String> {
    let mut drawn: Vec<String> = Vec::with_capacity(pools.len());
    for pool in pools {
        let fresh: Vec<&String> = pool
            .prompts
            .iter()
            .filter(|prompt| !drawn.contains(*prompt))
            .collect();
        if let Some(prompt) = fresh.choose(rng) {
            drawn.push(prompt.to_string());
        }
    }
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sheet(pairs: &[(&str, &str)]) -> AnswerSheet {
        pairs
            .iter()
            .map(|(category, answer)| (category.to_string(), answer.to_string()))
            .collect()
    }

    fn categories(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_valid_answers() {
        assert!(is_valid_answer("Paris", 'P'));
        assert!(is_valid_answer("paris", 'P'));
        assert!(is_valid_answer("Pera", 'p'));
        assert!(is_valid_answer("Poo", 'P'));
    }

    #[test]
    fn test_answer_too_short() {
        assert!(!is_valid_answer("", 'P'));
        assert!(!is_valid_answer("P", 'P'));
        assert!(!is_valid_answer("Po", 'P'));
    }

    #[test]
    fn test_answer_wrong_letter() {
        assert!(!is_valid_answer("London", 'P'));
        assert!(!is_valid_answer(" Paris", 'P'));
    }

    #[test]
    fn test_answer_character_repetition() {
        // occurrences are counted across the whole word, not in runs
        assert!(!is_valid_answer("Paaaa", 'P'));
        assert!(!is_valid_answer("Papapa", 'P'));
        assert!(!is_valid_answer("Banana", 'B'));
        assert!(is_valid_answer("Baobab", 'B'));
        // case matters when counting repeats
        assert!(is_valid_answer("Ppp", 'P'));
        assert!(is_valid_answer("Pap", 'P'));
    }

    #[test]
    fn test_shared_and_unique_answers() {
        let cats = categories(&["City"]);
        let submissions = vec![
            AnswerSet::new("ana", sheet(&[("City", "Paris")])),
            AnswerSet::new("bia", sheet(&[("City", "Paris")])),
            AnswerSet::new("caio", sheet(&[("City", "Prague")])),
        ];

        let gains = score_round('P', &cats, &submissions);
        assert_eq!(gains["ana"], 5);
        assert_eq!(gains["bia"], 5);
        assert_eq!(gains["caio"], 10);
    }

    #[test]
    fn test_uniqueness_is_case_sensitive() {
        let cats = categories(&["City"]);
        let submissions = vec![
            AnswerSet::new("ana", sheet(&[("City", "Paris")])),
            AnswerSet::new("bia", sheet(&[("City", "paris")])),
        ];

        let gains = score_round('P', &cats, &submissions);
        assert_eq!(gains["ana"], 10);
        assert_eq!(gains["bia"], 10);
    }

    #[test]
    fn test_invalid_answers_score_nothing_and_are_not_tallied() {
        let cats = categories(&["City", "Fruit"]);
        let submissions = vec![
            AnswerSet::new("ana", sheet(&[("City", "Po"), ("Fruit", "Pear")])),
            AnswerSet::new("bia", sheet(&[("City", "Po"), ("Fruit", "Lemon")])),
        ];

        let counts = count_answers('P', &cats, &submissions);
        assert!(counts["City"].is_empty());
        assert_eq!(counts["Fruit"].get("Pear"), Some(&1));
        assert_eq!(counts["Fruit"].get("Lemon"), None);

        let gains = score_round('P', &cats, &submissions);
        assert_eq!(gains["ana"], 10);
        assert_eq!(gains["bia"], 0);
    }

    #[test]
    fn test_unknown_categories_are_ignored() {
        let cats = categories(&["City"]);
        let submissions = vec![AnswerSet::new(
            "ana",
            sheet(&[("City", "Porto"), ("Planet", "Pluto")]),
        )];

        let gains = score_round('P', &cats, &submissions);
        assert_eq!(gains["ana"], 10);
    }

    #[test]
    fn test_multiple_categories_accumulate() {
        let cats = categories(&["City", "Fruit", "Animal"]);
        let submissions = vec![
            AnswerSet::new(
                "ana",
                sheet(&[("City", "Paris"), ("Fruit", "Pear"), ("Animal", "Puma")]),
            ),
            AnswerSet::new("bia", sheet(&[("City", "Paris"), ("Fruit", "Plum")])),
            AnswerSet::new("caio", AnswerSheet::new()),
        ];

        let gains = score_round('P', &cats, &submissions);
        assert_eq!(gains["ana"], 5 + 10 + 10);
        assert_eq!(gains["bia"], 5 + 10);
        assert_eq!(gains["caio"], 0);
    }

    #[test]
    fn test_letter_weights() {
        let weights = letter_weights();
        assert_eq!(weights.len(), 26);
        assert_eq!(weights[0], ('A', 5));
        assert!(weights.contains(&('Z', 1)));
        assert!(weights.contains(&('Q', 2)));

        let total: u32 = weights.iter().map(|(_, w)| w).sum();
        assert_eq!(total, 19 * 5 + 4 + 6);
    }

    #[test]
    fn test_draw_letter_favours_common_letters() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<char, u32> = HashMap::new();

        for _ in 0..21_000 {
            let letter = draw_letter(&mut rng);
            assert!(letter.is_ascii_uppercase());
            *counts.entry(letter).or_insert(0) += 1;
        }

        // expected ~1000 for weight 5 and ~200 for weight 1
        let a = counts.get(&'A').copied().unwrap_or(0);
        let z = counts.get(&'Z').copied().unwrap_or(0);
        assert!(a > 800 && a < 1200, "A drawn {} times", a);
        assert!(z > 100 && z < 320, "Z drawn {} times", z);
    }

    #[test]
    fn test_draw_categories_never_repeats_a_prompt() {
        let pools = vec![
            CategoryPool::new("Place", &["City", "Country"]),
            CategoryPool::new("Nation", &["Country", "Capital"]),
            CategoryPool::new("Only", &["Country"]),
        ];

        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let drawn = draw_categories(&pools, &mut rng);
            let mut unique = drawn.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), drawn.len(), "seed {} drew {:?}", seed, drawn);
        }
    }

    #[test]
    fn test_draw_categories_with_default_pools() {
        let pools = crate::config::default_pools();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let drawn = draw_categories(&pools, &mut rng);
            assert_eq!(drawn.len(), pools.len());

            let mut unique = drawn.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), drawn.len(), "seed {} drew {:?}", seed, drawn);
        }
    }

    #[test]
    fn test_draw_categories_takes_one_prompt_per_pool() {
        let pools = vec![
            CategoryPool::new("Place", &["City", "Country"]),
            CategoryPool::new("Food", &["Fruit"]),
            CategoryPool::new("Empty", &[]),
        ];
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..20 {
            let drawn = draw_categories(&pools, &mut rng);
            assert_eq!(drawn.len(), 2);
            assert!(drawn[0] == "City" || drawn[0] == "Country");
            assert_eq!(drawn[1], "Fruit");
        }
    }
}
