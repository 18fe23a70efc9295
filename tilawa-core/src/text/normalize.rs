//! Arabic-aware text canonicalisation.
//!
//! ## Steps
//!
//! 1. NFKC: folds presentation forms and ligatures (`ﻻ` → `لا`, `ﷲ` → `الله`)
//!    and composes hamza/madda sequences onto their carriers.
//! 2. Lowercase (Latin text in mixed transcripts).
//! 3. Per character: drop combining marks (tashkeel, superscript alef,
//!    Quranic annotation marks), tatweel, small Quranic letters, format
//!    controls and digits; unify letter variants; everything that is not a
//!    letter separates words.
//! 4. Collapse whitespace.
//!
//! The output contains only letters and single spaces, so a second pass is a
//! no-op.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

const TATWEEL: char = '\u{0640}';
const SMALL_WAW: char = '\u{06E5}';
const SMALL_YEH: char = '\u{06E6}';

/// What to do with one character after NFKC + lowercasing.
enum Fold {
    Keep(char),
    Drop,
    Separator,
}

fn fold(c: char) -> Fold {
    if is_combining_mark(c) {
        return Fold::Drop;
    }
    match c {
        // alef with hamza above/below, madda, wasla, wavy hamza
        '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}' | '\u{0672}' | '\u{0673}' => {
            Fold::Keep('\u{0627}')
        }
        // alef maqsura, yeh with hamza, farsi yeh
        '\u{0649}' | '\u{0626}' | '\u{06CC}' => Fold::Keep('\u{064A}'),
        // ta marbuta
        '\u{0629}' => Fold::Keep('\u{0647}'),
        // waw with hamza
        '\u{0624}' => Fold::Keep('\u{0648}'),
        // keheh
        '\u{06A9}' => Fold::Keep('\u{0643}'),
        TATWEEL | SMALL_WAW | SMALL_YEH => Fold::Drop,
        // zero-width and directional controls
        '\u{200B}'..='\u{200F}' | '\u{2060}' | '\u{FEFF}' | '\u{061C}' => Fold::Drop,
        c if c.is_numeric() => Fold::Drop,
        c if c.is_alphabetic() => Fold::Keep(c),
        _ => Fold::Separator,
    }
}

/// Canonicalise `text` for comparison. Pure and idempotent; garbage or empty
/// input yields an empty string.
pub fn normalize(text: &str) -> String {
    let lowered: String = text.nfkc().collect::<String>().to_lowercase();

    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;
    for c in lowered.chars() {
        match fold(c) {
            Fold::Keep(k) => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(k);
            }
            Fold::Drop => {}
            Fold::Separator => pending_space = true,
        }
    }
    out
}

/// Split already-normalized text into word tokens.
pub fn tokenize(normalized: &str) -> Vec<String> {
    normalized.split_whitespace().map(str::to_owned).collect()
}
