//! Canonical word and aya reference types.

use serde::{Deserialize, Serialize};

/// One word of the canonical text with its structural position.
///
/// Created once when canonical data loads and never mutated. `global_index`
/// is unique and strictly increasing in reading order across the loaded unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalWord {
    /// Display text as it appears in the source data.
    pub text: String,
    /// `text` after normalization; what all comparisons use.
    pub normalized_text: String,
    pub global_index: usize,
    pub aya_id: u32,
    pub sura_no: u16,
    pub aya_no: u16,
    pub page_no: u16,
    pub juz_no: u8,
    /// 0-based position of the word inside its aya.
    pub word_index_in_aya: u16,
}

impl CanonicalWord {
    pub fn aya_ref(&self) -> AyaRef {
        AyaRef {
            aya_id: self.aya_id,
            sura_no: self.sura_no,
            aya_no: self.aya_no,
        }
    }
}

/// Identifies one aya by its dataset id and its sura/aya numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AyaRef {
    pub aya_id: u32,
    pub sura_no: u16,
    pub aya_no: u16,
}
