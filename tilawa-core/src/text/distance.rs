//! Levenshtein distance over Unicode scalar values, via `strsim`.
//!
//! `strsim` keeps a single DP row sized by its second argument; the shorter
//! input always goes second, so memory is O(min(|a|, |b|)).

/// Borrowed char slice that `strsim` can iterate by value.
struct CharSeq<'a>(&'a [char]);

impl<'a, 'b> IntoIterator for &'b CharSeq<'a> {
    type Item = char;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, char>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

/// Edit distance between two character sequences (unit insert/delete/substitute).
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    strsim::generic_levenshtein(&CharSeq(long), &CharSeq(short))
}

/// `1 − Lev(a, b) / max(|a|, |b|)`, in [0, 1]. Two empty inputs are identical.
pub fn similarity(a: &[char], b: &[char]) -> f32 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f32 / max_len as f32
}
