use std::collections::HashMap;

/// Shannon entropy (base 2) of the characters in `s`.
///
/// Returns 0.0 for an empty string and for a string made of a single
/// repeated character.
pub fn shannon_entropy(s: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }

    if total == 0 {
        return 0.0;
    }

    let len = total as f64;
    let entropy: f64 = counts
        .values()
        .map(|&n| {
            let p = n as f64 / len;
            -p * p.log2()
        })
        .sum();

    // -0.0 shows up for single-symbol input
    entropy.max(0.0)
}

/// Entropy rounded to three decimals, the precision reported in feature maps.
pub fn rounded_entropy(s: &str) -> f64 {
    (shannon_entropy(s) * 1000.0).round() / 1000.0
}
