//! Canonical Quran text: loading, structural indexes and page views.
//!
//! ## Invariants established at load time
//!
//! - Records are ordered by `id` (reading order); ids are unique.
//! - Page and sura numbers never decrease in reading order, so every page is
//!   one contiguous run of words.
//! - Word `global_index` values are `0..N` in reading order.
//!
//! Any violation is `TilawaError::CanonicalDataMissing` and aborts loading;
//! nothing here can fail once a session is running.

pub mod records;
pub mod word;

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TilawaError};
use crate::text::normalize;

pub use records::AyaRecord;
pub use word::{AyaRef, CanonicalWord};

/// The loaded canonical text with page, sura and juz indexes.
#[derive(Debug)]
pub struct QuranText {
    records: Vec<AyaRecord>,
    normalized_ayas: Vec<String>,
    words: Vec<CanonicalWord>,
    /// page → word range
    pages: BTreeMap<u16, Range<usize>>,
    /// sura → record indexes
    suras: BTreeMap<u16, Vec<usize>>,
    /// juz → record indexes
    juz: BTreeMap<u8, Vec<usize>>,
}

impl QuranText {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let quran = Self::from_json_str(&raw)?;
        info!(path = %path.display(), "canonical text loaded");
        Ok(quran)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let records: Vec<AyaRecord> = serde_json::from_str(raw)?;
        Self::from_records(records)
    }

    pub fn from_records(mut records: Vec<AyaRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(TilawaError::canonical("dataset contains no aya records"));
        }
        records.sort_by_key(|r| r.id);

        let mut words = Vec::new();
        let mut normalized_ayas = Vec::with_capacity(records.len());
        let mut pages: BTreeMap<u16, Range<usize>> = BTreeMap::new();
        let mut suras: BTreeMap<u16, Vec<usize>> = BTreeMap::new();
        let mut juz: BTreeMap<u8, Vec<usize>> = BTreeMap::new();

        let mut previous: Option<&AyaRecord> = None;
        for (idx, record) in records.iter().enumerate() {
            record.validate()?;
            if let Some(prev) = previous {
                if prev.id == record.id {
                    return Err(TilawaError::canonical(format!(
                        "duplicate aya id {}",
                        record.id
                    )));
                }
                if record.page < prev.page || record.sura_no < prev.sura_no {
                    return Err(TilawaError::canonical(format!(
                        "aya {} breaks reading order (page {} after {}, sura {} after {})",
                        record.id, record.page, prev.page, record.sura_no, prev.sura_no
                    )));
                }
            }
            previous = Some(record);

            let aya_words = record.words(words.len())?;
            let start = words.len();
            words.extend(aya_words);
            pages
                .entry(record.page)
                .and_modify(|range| range.end = words.len())
                .or_insert(start..words.len());
            suras.entry(record.sura_no).or_default().push(idx);
            juz.entry(record.jozz).or_default().push(idx);
            normalized_ayas.push(normalize(&record.aya_text_emlaey));
        }

        info!(
            ayat = records.len(),
            words = words.len(),
            pages = pages.len(),
            suras = suras.len(),
            "canonical text indexed"
        );

        Ok(Self {
            records,
            normalized_ayas,
            words,
            pages,
            suras,
            juz,
        })
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn words(&self) -> &[CanonicalWord] {
        &self.words
    }

    /// Words of one page as a standalone, shareable view.
    pub fn page(&self, page_no: u16) -> Result<PageText> {
        let range = self
            .pages
            .get(&page_no)
            .ok_or(TilawaError::PageNotFound(page_no))?;
        PageText::new(page_no, self.words[range.clone()].to_vec())
    }

    pub fn has_page(&self, page_no: u16) -> bool {
        self.pages.contains_key(&page_no)
    }

    /// Aya records of a sura, in reading order.
    pub fn sura(&self, sura_no: u16) -> Vec<&AyaRecord> {
        self.records_at(self.suras.get(&sura_no))
    }

    /// Aya records of a juz, in reading order.
    pub fn juz(&self, juz_no: u8) -> Vec<&AyaRecord> {
        self.records_at(self.juz.get(&juz_no))
    }

    fn records_at(&self, indexes: Option<&Vec<usize>>) -> Vec<&AyaRecord> {
        indexes
            .map(|idx| idx.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }

    pub fn metadata(&self) -> CorpusMetadata {
        let suras = self
            .suras
            .iter()
            .filter_map(|(&no, idx)| {
                let first = &self.records[*idx.first()?];
                Some(SuraInfo {
                    no,
                    name: first.sura_name_ar.clone(),
                    first_page: first.page,
                    aya_count: idx.len(),
                })
            })
            .collect();

        CorpusMetadata {
            total_pages: self.pages.keys().next_back().copied().unwrap_or(0),
            total_suras: self.suras.keys().next_back().copied().unwrap_or(0),
            total_juz: self.juz.keys().next_back().copied().unwrap_or(0),
            total_words: self.words.len(),
            suras,
        }
    }

    /// Ayat whose plain text or sura name contains `query` (compared after
    /// normalization), in reading order, at most `limit` results.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&AyaRecord> {
        let needle = normalize(query);
        if needle.is_empty() {
            return Vec::new();
        }
        self.records
            .iter()
            .zip(&self.normalized_ayas)
            .filter(|(record, text)| {
                text.contains(&needle) || normalize(&record.sura_name_ar).contains(&needle)
            })
            .map(|(record, _)| record)
            .take(limit)
            .collect()
    }
}

/// Summary of the loaded text for navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusMetadata {
    pub total_pages: u16,
    pub total_suras: u16,
    pub total_juz: u8,
    pub total_words: usize,
    pub suras: Vec<SuraInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuraInfo {
    pub no: u16,
    pub name: String,
    pub first_page: u16,
    pub aya_count: usize,
}

/// The ordered words of one page (or any other contiguous unit).
#[derive(Debug, Clone)]
pub struct PageText {
    page_no: u16,
    words: Arc<[CanonicalWord]>,
}

impl PageText {
    /// Wrap an ordered word list. Fails if it is empty or if global indexes
    /// are not strictly increasing.
    pub fn new(page_no: u16, words: Vec<CanonicalWord>) -> Result<Self> {
        if words.is_empty() {
            return Err(TilawaError::canonical(format!("page {page_no} has no words")));
        }
        if let Some(pair) = words
            .windows(2)
            .find(|pair| pair[1].global_index <= pair[0].global_index)
        {
            return Err(TilawaError::canonical(format!(
                "page {page_no}: global index {} does not follow {}",
                pair[1].global_index, pair[0].global_index
            )));
        }
        Ok(Self {
            page_no,
            words: words.into(),
        })
    }

    pub fn page_no(&self) -> u16 {
        self.page_no
    }

    pub fn words(&self) -> &[CanonicalWord] {
        &self.words
    }

    pub fn shared_words(&self) -> Arc<[CanonicalWord]> {
        Arc::clone(&self.words)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn first_global_index(&self) -> usize {
        self.words[0].global_index
    }

    /// One past the last word's global index.
    pub fn end_global_index(&self) -> usize {
        self.words[self.words.len() - 1].global_index + 1
    }

    /// Position of the first word whose global index is `>= global`.
    pub fn lower_bound(&self, global: usize) -> usize {
        self.words.partition_point(|w| w.global_index < global)
    }

    pub fn word_at(&self, global: usize) -> Option<&CanonicalWord> {
        let pos = self.lower_bound(global);
        self.words.get(pos).filter(|w| w.global_index == global)
    }

    /// First word at or after `global`, if any.
    pub fn word_at_or_after(&self, global: usize) -> Option<&CanonicalWord> {
        self.words.get(self.lower_bound(global))
    }

    /// Global index of the first page word of the aya holding the word at or
    /// after `global`; one past the page end when there is no such word.
    pub fn aya_start(&self, global: usize) -> usize {
        let pos = self.lower_bound(global);
        let Some(word) = self.words.get(pos) else {
            return self.end_global_index();
        };
        let first = self.words[..pos]
            .iter()
            .rposition(|w| w.aya_id != word.aya_id)
            .map_or(0, |p| p + 1);
        self.words[first].global_index
    }

    /// Number of distinct ayat among words with global index in `range`.
    pub fn distinct_ayas(&self, range: Range<usize>) -> usize {
        let lo = self.lower_bound(range.start);
        let hi = self.lower_bound(range.end);
        let mut count = 0;
        let mut last: Option<u32> = None;
        for word in &self.words[lo..hi.max(lo)] {
            if last != Some(word.aya_id) {
                count += 1;
                last = Some(word.aya_id);
            }
        }
        count
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, page: u16, sura: u16, aya: u16, text: &str) -> AyaRecord {
        AyaRecord {
            id,
            jozz: 1,
            page,
            sura_no: sura,
            sura_name_ar: if sura == 1 { "الفاتحة" } else { "البقرة" }.into(),
            aya_no: aya,
            aya_text_emlaey: text.into(),
            aya_text: None,
        }
    }

    fn sample() -> QuranText {
        QuranText::from_records(vec![
            record(2, 1, 1, 2, "الحمد لله رب العالمين"),
            record(1, 1, 1, 1, "بسم الله الرحمن الرحيم"),
            record(3, 1, 1, 3, "الرحمن الرحيم"),
            record(4, 2, 2, 1, "الم"),
            record(5, 2, 2, 2, "ذلك الكتاب لا ريب فيه هدى للمتقين"),
        ])
        .expect("sample loads")
    }

    #[test]
    fn assigns_global_indexes_in_reading_order() {
        let quran = sample();
        assert_eq!(quran.word_count(), 4 + 4 + 2 + 1 + 7);
        for (i, w) in quran.words().iter().enumerate() {
            assert_eq!(w.global_index, i);
        }
        assert_eq!(quran.words()[0].text, "بسم");
        assert_eq!(quran.words()[4].text, "الحمد");
    }

    #[test]
    fn page_view_is_contiguous() {
        let quran = sample();
        let page = quran.page(2).expect("page 2");
        assert_eq!(page.len(), 8);
        assert_eq!(page.first_global_index(), 10);
        assert_eq!(page.end_global_index(), 18);
        assert_eq!(page.word_at(11).map(|w| w.text.as_str()), Some("ذلك"));
        assert!(page.word_at(9).is_none());
        assert!(matches!(quran.page(9), Err(TilawaError::PageNotFound(9))));
    }

    #[test]
    fn distinct_ayas_counts_boundaries() {
        let page = sample().page(1).expect("page 1");
        assert_eq!(page.distinct_ayas(0..4), 1);
        assert_eq!(page.distinct_ayas(0..5), 2);
        assert_eq!(page.distinct_ayas(2..10), 3);
        assert_eq!(page.distinct_ayas(5..5), 0);
    }

    #[test]
    fn aya_start_finds_first_word_of_the_aya() {
        let page = fixtures::page(90, 20, 5);
        assert_eq!(page.aya_start(90), 90);
        assert_eq!(page.aya_start(97), 95);
        assert_eq!(page.aya_start(99), 95);
        assert_eq!(page.aya_start(100), 100);
        // before the page: first word's aya; past it: the end
        assert_eq!(page.aya_start(10), 90);
        assert_eq!(page.aya_start(500), 110);
    }

    #[test]
    fn rejects_duplicate_ids_and_out_of_order_pages() {
        let dup = QuranText::from_records(vec![
            record(1, 1, 1, 1, "بسم الله"),
            record(1, 1, 1, 2, "الحمد لله"),
        ]);
        assert!(matches!(dup, Err(TilawaError::CanonicalDataMissing { .. })));

        let disorder = QuranText::from_records(vec![
            record(1, 2, 1, 1, "بسم الله"),
            record(2, 1, 1, 2, "الحمد لله"),
        ]);
        assert!(matches!(disorder, Err(TilawaError::CanonicalDataMissing { .. })));

        assert!(QuranText::from_records(vec![]).is_err());
    }

    #[test]
    fn page_text_rejects_non_increasing_indexes() {
        let mut words = fixtures::page(0, 3, 3).words().to_vec();
        words[2].global_index = 1;
        assert!(PageText::new(1, words).is_err());
    }

    #[test]
    fn metadata_and_unit_indexes() {
        let quran = sample();
        let meta = quran.metadata();
        assert_eq!(meta.total_pages, 2);
        assert_eq!(meta.total_suras, 2);
        assert_eq!(meta.total_juz, 1);
        assert_eq!(meta.suras[1].name, "البقرة");
        assert_eq!(meta.suras[1].first_page, 2);
        assert_eq!(meta.suras[0].aya_count, 3);
        assert_eq!(quran.sura(2).len(), 2);
        assert_eq!(quran.juz(1).len(), 5);
        assert!(quran.sura(3).is_empty());
    }

    #[test]
    fn search_normalizes_query() {
        let quran = sample();
        let hits = quran.search("الرَّحِيمِ", 10);
        assert_eq!(hits.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(quran.search("الرحيم", 1).len(), 1);
        assert_eq!(quran.search("البقرة", 10).len(), 2);
        assert!(quran.search("؟", 10).is_empty());
    }

    #[test]
    fn fixture_words_are_distinct() {
        let page = fixtures::page(0, 120, 7);
        let mut seen = std::collections::HashSet::new();
        for w in page.words() {
            assert!(seen.insert(w.normalized_text.clone()), "duplicate {}", w.text);
        }
    }

    #[test]
    fn loads_from_json() {
        let json = r#"[
            {"id": 1, "jozz": 30, "page": 604, "sura_no": 112, "sura_name_ar": "الإخلاص",
             "aya_no": 1, "aya_text_emlaey": "قل هو الله أحد"}
        ]"#;
        let quran = QuranText::from_json_str(json).expect("json loads");
        assert_eq!(quran.word_count(), 4);
        assert_eq!(quran.words()[3].normalized_text, "احد");
        assert_eq!(quran.words()[3].text, "أحد");
    }
}
