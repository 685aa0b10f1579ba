//! Text cleanup shared by the scrapers and the summarizers.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    // Scraped text often loses the apostrophe: "Trump s plan" -> "Trump's plan"
    static ref SPLIT_CONTRACTION: Regex = Regex::new(r"\b([A-Za-z]+)\s([smtdl])\b").unwrap();
    static ref SPACE_BEFORE_PUNCT: Regex = Regex::new(r"\s([.,!?;:])").unwrap();
    static ref SENTENCE_START: Regex = Regex::new(r"(^|[.!?]\s+)([a-z])").unwrap();
}

fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => ' ',
            '\u{200B}' | '\u{FEFF}' => ' ',
            c => c,
        })
        .collect()
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Normalize a scraped headline or paragraph: straight quotes, single spaces
/// and restored contractions.
pub fn clean_text(text: &str) -> String {
    let text = collapse_whitespace(&normalize_quotes(text));
    SPLIT_CONTRACTION.replace_all(&text, "$1'$2").into_owned()
}

/// Tidy model output so it reads as prose.
pub fn clean_summary(text: &str) -> String {
    let text = collapse_whitespace(&normalize_quotes(text));
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
    let text = SENTENCE_START.replace_all(&text, |caps: &Captures| {
        format!("{}{}", &caps[1], caps[2].to_uppercase())
    });
    let mut text = SPLIT_CONTRACTION.replace_all(&text, "$1'$2").into_owned();

    if let Some(last) = text.chars().last() {
        if !matches!(last, '.' | '!' | '?') {
            text.push('.');
        }
    }
    text
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Truncate on a char boundary to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
