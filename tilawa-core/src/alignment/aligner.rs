//! Word-level global alignment (Needleman–Wunsch) between spoken tokens and
//! the words of the chosen segment.
//!
//! ```text
//! S[i][j] = max(S[i-1][j-1] + sim(spoken[i], canonical[j]),
//!               S[i-1][j]   − DELETE_COST,    // extraneous spoken word
//!               S[i][j-1]   − INSERT_COST)    // canonical word not recited
//! ```
//!
//! Costs are configured as non-negative penalties. Traceback prefers the
//! diagonal, then a deletion, then an insertion, so equal-scoring paths
//! resolve the same way every time.

use crate::config::AlignmentConfig;
use crate::corpus::CanonicalWord;
use crate::ipc::MatchStatus;
use crate::text::similarity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Diagonal,
    Delete,
    Insert,
}

/// One column of the alignment path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedPair {
    /// Index into the spoken tokens, `None` for a canonical gap.
    pub spoken: Option<usize>,
    /// Index into the canonical words, `None` for an extraneous spoken word.
    pub canonical: Option<usize>,
    /// Word similarity for matched pairs, 0 otherwise.
    pub score: f32,
    pub status: MatchStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub pairs: Vec<AlignedPair>,
    /// `S[T][Q]`.
    pub total: f32,
}

impl Alignment {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn correct(&self) -> impl Iterator<Item = &AlignedPair> {
        self.pairs
            .iter()
            .filter(|p| p.status == MatchStatus::Correct)
    }
}

#[derive(Debug, Clone)]
pub struct WordAligner {
    threshold: f32,
    delete_cost: f32,
    insert_cost: f32,
}

impl WordAligner {
    pub fn new(config: &AlignmentConfig) -> Self {
        Self {
            threshold: config.word_similarity_threshold,
            delete_cost: config.delete_cost,
            insert_cost: config.insert_cost,
        }
    }

    pub fn align(&self, spoken: &[String], canonical: &[CanonicalWord]) -> Alignment {
        if spoken.is_empty() || canonical.is_empty() {
            return Alignment::default();
        }

        let spoken_chars: Vec<Vec<char>> = spoken.iter().map(|w| w.chars().collect()).collect();
        let canonical_chars: Vec<Vec<char>> = canonical
            .iter()
            .map(|w| w.normalized_text.chars().collect())
            .collect();

        let rows = spoken.len() + 1;
        let cols = canonical.len() + 1;
        let at = |i: usize, j: usize| i * cols + j;

        let mut score = vec![0.0f32; rows * cols];
        let mut steps = vec![Step::Diagonal; rows * cols];
        let mut sims = vec![0.0f32; rows * cols];

        for i in 1..rows {
            score[at(i, 0)] = score[at(i - 1, 0)] - self.delete_cost;
            steps[at(i, 0)] = Step::Delete;
        }
        for j in 1..cols {
            score[at(0, j)] = score[at(0, j - 1)] - self.insert_cost;
            steps[at(0, j)] = Step::Insert;
        }

        for i in 1..rows {
            for j in 1..cols {
                let sim = similarity(&spoken_chars[i - 1], &canonical_chars[j - 1]);
                sims[at(i, j)] = sim;

                let diagonal = score[at(i - 1, j - 1)] + sim;
                let delete = score[at(i - 1, j)] - self.delete_cost;
                let insert = score[at(i, j - 1)] - self.insert_cost;

                let (best, step) = if diagonal >= delete && diagonal >= insert {
                    (diagonal, Step::Diagonal)
                } else if delete >= insert {
                    (delete, Step::Delete)
                } else {
                    (insert, Step::Insert)
                };
                score[at(i, j)] = best;
                steps[at(i, j)] = step;
            }
        }

        let mut pairs = Vec::with_capacity(rows + cols);
        let (mut i, mut j) = (rows - 1, cols - 1);
        while i > 0 || j > 0 {
            match steps[at(i, j)] {
                Step::Diagonal => {
                    let sim = sims[at(i, j)];
                    let status = if sim >= self.threshold {
                        MatchStatus::Correct
                    } else {
                        MatchStatus::Incorrect
                    };
                    pairs.push(AlignedPair {
                        spoken: Some(i - 1),
                        canonical: Some(j - 1),
                        score: sim,
                        status,
                    });
                    i -= 1;
                    j -= 1;
                }
                Step::Delete => {
                    pairs.push(AlignedPair {
                        spoken: Some(i - 1),
                        canonical: None,
                        score: 0.0,
                        status: MatchStatus::Extra,
                    });
                    i -= 1;
                }
                Step::Insert => {
                    pairs.push(AlignedPair {
                        spoken: None,
                        canonical: Some(j - 1),
                        score: 0.0,
                        status: MatchStatus::Pending,
                    });
                    j -= 1;
                }
            }
        }
        pairs.reverse();

        Alignment {
            pairs,
            total: score[at(rows - 1, cols - 1)],
        }
    }
}
