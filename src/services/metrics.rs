//! CER/WER divergence metrics between two recognized texts.
//!
//! Pure functions of two strings; no dependency on which engine produced
//! either side. CER/WER treat the first argument as the reference and are
//! therefore asymmetric.

/// Trim and collapse runs of whitespace to single spaces. Case and
/// punctuation are preserved: fidelity to source casing/punctuation is part
/// of what the metrics measure.
pub fn normalize_for_comparison(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character Error Rate: char-level Levenshtein distance over the reference
/// length, floored at 1 so an empty reference never divides by zero.
pub fn cer(reference: &str, hypothesis: &str) -> f64 {
    let reference = normalize_for_comparison(reference);
    let hypothesis = normalize_for_comparison(hypothesis);

    let ref_chars: Vec<char> = reference.chars().collect();
    let hyp_chars: Vec<char> = hypothesis.chars().collect();

    let distance = levenshtein(&ref_chars, &hyp_chars);
    distance as f64 / std::cmp::max(1, ref_chars.len()) as f64
}

/// Word Error Rate: word-level Levenshtein distance over the reference word
/// count, same floor denominator as CER.
pub fn wer(reference: &str, hypothesis: &str) -> f64 {
    let reference = normalize_for_comparison(reference);
    let hypothesis = normalize_for_comparison(hypothesis);

    let ref_words: Vec<&str> = reference.split_whitespace().collect();
    let hyp_words: Vec<&str> = hypothesis.split_whitespace().collect();

    let distance = levenshtein(&ref_words, &hyp_words);
    distance as f64 / std::cmp::max(1, ref_words.len()) as f64
}

/// Normalized Levenshtein similarity in [0, 1]: 1.0 is a perfect match.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_for_comparison(a);
    let b = normalize_for_comparison(b);

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let distance = levenshtein(&a_chars, &b_chars);
    let max_len = std::cmp::max(a_chars.len(), b_chars.len());

    1.0 - distance as f64 / max_len as f64
}

/// Unit-cost Levenshtein distance over arbitrary token slices, two-row DP.
fn levenshtein<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, token_a) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, token_b) in b.iter().enumerate() {
            let substitution_cost = if token_a == token_b { 0 } else { 1 };
            curr[j + 1] = std::cmp::min(
                std::cmp::min(curr[j] + 1, prev[j + 1] + 1),
                prev[j] + substitution_cost,
            );
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_have_zero_error() {
        let text = "Договор № 42 от 15.03.2023";
        assert_eq!(cer(text, text), 0.0);
        assert_eq!(wer(text, text), 0.0);
        assert_eq!(similarity(text, text), 1.0);
    }

    #[test]
    fn test_single_substitution_near_end() {
        let reference = "Иванов Иван Иванович";
        let hypothesis = "Иванов Иван Иваневич";

        // One substituted character over 20 reference characters.
        let expected_cer = 1.0 / 20.0;
        assert!((cer(reference, hypothesis) - expected_cer).abs() < 1e-9);

        // One of three words differs.
        let expected_wer = 1.0 / 3.0;
        assert!((wer(reference, hypothesis) - expected_wer).abs() < 1e-9);
    }

    #[test]
    fn test_cer_is_asymmetric_for_differing_lengths() {
        let short = "счёт";
        let long = "счёт на оплату";
        assert!(cer(short, long) != cer(long, short));
        assert!(cer(short, long) >= 0.0);
        assert!(cer(long, short) >= 0.0);
    }

    #[test]
    fn test_empty_reference_uses_floor_denominator() {
        assert_eq!(cer("", ""), 0.0);
        assert_eq!(wer("", ""), 0.0);

        // Edit distance over a denominator of 1: large but finite.
        assert_eq!(cer("", "abc"), 3.0);
        assert_eq!(wer("", "a b c"), 3.0);
    }

    #[test]
    fn test_whitespace_is_collapsed_before_comparison() {
        assert_eq!(cer("Иванов  Иван", "Иванов Иван"), 0.0);
        assert_eq!(wer("  Иванов \t Иван ", "Иванов Иван"), 0.0);
    }

    #[test]
    fn test_case_and_punctuation_are_preserved() {
        assert!(cer("Сумма: 100", "сумма: 100") > 0.0);
        assert!(cer("Сумма 100", "Сумма: 100") > 0.0);
    }

    #[test]
    fn test_divergence_can_exceed_one() {
        // Hypothesis much longer than reference.
        assert!(cer("ab", "abcdefgh") > 1.0);
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        let s = similarity("Договор", "Договоры");
        assert!(s > 0.0 && s < 1.0);
    }
}
