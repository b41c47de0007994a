//! Strict-schema validation helpers. Unlike the teacher's warn-only config
//! validator, FAST's schema fails hard on any unknown key (SPEC_FULL.md §6):
//! every config struct derives `#[serde(deny_unknown_fields)]`, and this
//! module turns serde's unknown-field error into a friendlier message with a
//! Levenshtein-distance "did you mean" suggestion, in the same spirit as the
//! teacher's `config::validation::suggest_correction`.

/// Standard edit-distance between two strings (Levenshtein).
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = tmp;
        }
    }
    row[b.len()]
}

/// Returns the closest known key to `unknown` if it's within a small edit
/// distance, formatted as a `" (did you mean `x`?)"` suggestion suffix, else
/// an empty string.
pub fn suggest_correction(unknown: &str, known: &[&str]) -> String {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 2)
        .min_by_key(|(_, dist)| *dist)
        .map(|(k, _)| format!(" (did you mean `{k}`?)"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_have_zero_distance() {
        assert_eq!(levenshtein("tick_duration", "tick_duration"), 0);
    }

    #[test]
    fn single_typo_has_distance_one() {
        assert_eq!(levenshtein("tick_duraton", "tick_duration"), 1);
    }

    #[test]
    fn suggestion_found_for_close_typo() {
        let known = ["tick_duration", "flag_format", "team_ip"];
        let suggestion = suggest_correction("tick_duraton", &known);
        assert!(suggestion.contains("tick_duration"));
    }

    #[test]
    fn no_suggestion_for_unrelated_key() {
        let known = ["tick_duration", "flag_format", "team_ip"];
        let suggestion = suggest_correction("completely_unrelated_key", &known);
        assert_eq!(suggestion, "");
    }
}
