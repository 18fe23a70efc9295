//! Source dataset records and their conversion into canonical words.
//!
//! The dataset is a JSON array of aya objects (one per verse) in the shape
//! of the common "hafs smart" export:
//!
//! ```json
//! { "id": 1, "jozz": 1, "page": 1, "sura_no": 1, "sura_name_ar": "الفاتحة",
//!   "aya_no": 1, "aya_text_emlaey": "بسم الله الرحمن الرحيم", "aya_text": "..." }
//! ```
//!
//! Numeric metadata defaults to zero when absent so that validation can
//! report *which* field is missing instead of a generic parse failure.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TilawaError};
use crate::text::normalize;

use super::word::CanonicalWord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AyaRecord {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub jozz: u8,
    #[serde(default)]
    pub page: u16,
    #[serde(default)]
    pub sura_no: u16,
    #[serde(default)]
    pub sura_name_ar: String,
    #[serde(default)]
    pub aya_no: u16,
    /// Plain (imla'i) orthography; the text words are matched against.
    #[serde(default)]
    pub aya_text_emlaey: String,
    /// Uthmani display text, when the dataset carries it.
    #[serde(default)]
    pub aya_text: Option<String>,
}

impl AyaRecord {
    /// Reject records with absent or zero structural metadata.
    pub(crate) fn validate(&self) -> Result<()> {
        let missing = if self.id == 0 {
            Some("id")
        } else if self.page == 0 {
            Some("page")
        } else if self.sura_no == 0 {
            Some("sura_no")
        } else if self.aya_no == 0 {
            Some("aya_no")
        } else if self.jozz == 0 {
            Some("jozz")
        } else {
            None
        };
        match missing {
            Some(field) => Err(TilawaError::canonical(format!(
                "aya record {} has missing or zero `{field}`",
                self.id
            ))),
            None => Ok(()),
        }
    }

    /// Split the aya into canonical words starting at `first_global_index`.
    ///
    /// A source token that normalizes to several words (e.g. glued
    /// punctuation) yields one canonical word per normalized token; tokens
    /// that normalize to nothing (stray marks) are skipped.
    pub(crate) fn words(&self, first_global_index: usize) -> Result<Vec<CanonicalWord>> {
        let mut words = Vec::new();
        for raw in self.aya_text_emlaey.split_whitespace() {
            let normalized = normalize(raw);
            let parts: Vec<&str> = normalized.split(' ').filter(|p| !p.is_empty()).collect();
            for &part in &parts {
                let text = if parts.len() == 1 { raw } else { part };
                words.push(CanonicalWord {
                    text: text.to_string(),
                    normalized_text: part.to_string(),
                    global_index: first_global_index + words.len(),
                    aya_id: self.id,
                    sura_no: self.sura_no,
                    aya_no: self.aya_no,
                    page_no: self.page,
                    juz_no: self.jozz,
                    word_index_in_aya: words.len() as u16,
                });
            }
        }
        if words.is_empty() {
            return Err(TilawaError::canonical(format!(
                "aya record {} ({}:{}) has no matchable words",
                self.id, self.sura_no, self.aya_no
            )));
        }
        Ok(words)
    }
}
