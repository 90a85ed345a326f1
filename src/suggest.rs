//! "Did you mean?" hints for unknown keys and tags.

/// Candidates scoring below this are not worth suggesting.
const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Closest candidate, scored as the better of Jaro-Winkler (typos near the
/// front) and Sørensen-Dice bigram overlap (inserted or dropped prefixes).
/// Ties go to the lexicographically greatest candidate.
pub fn did_you_mean<'c>(unknown: &str, candidates: impl IntoIterator<Item = &'c str>) -> Option<&'c str> {
    let mut best: Option<(&'c str, f64)> = None;
    for known in candidates {
        let similarity = strsim::jaro_winkler(unknown, known).max(strsim::sorensen_dice(unknown, known));
        if similarity < SIMILARITY_THRESHOLD {
            continue;
        }
        let better = match best {
            None => true,
            Some((name, score)) => similarity > score || (similarity == score && known > name),
        };
        if better {
            best = Some((known, similarity));
        }
    }
    best.map(|(name, _)| name)
}
