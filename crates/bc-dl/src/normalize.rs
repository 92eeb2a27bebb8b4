//! String normalization shared by the parser, the reconciler and the
//! destination naming.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static WHITESPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
// Separator characters, together with the whitespace leading into them.
static BORING_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[*_\-/:\\]+").expect("boring chars regex"));
static FILE_NAME_FORBIDDEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("file name regex"));

const ZERO_WIDTH_SPACE: char = '\u{200B}';

/// Collapse every run of whitespace to a single space.
pub fn clean_whitespaces(value: &str) -> String {
    WHITESPACES.replace_all(value, " ").into_owned()
}

/// Fold a title or file name so superficially different renderings compare equal.
pub fn clean_for_compare(value: &str) -> String {
    let folded: String = value.nfkc().collect::<String>().to_lowercase();
    let stripped = BORING_CHARS.replace_all(&folded, "");
    clean_whitespaces(&stripped).trim().to_string()
}

pub fn almost_equals(a: &str, b: &str) -> bool {
    clean_for_compare(a) == clean_for_compare(b)
}

/// Remove characters that are illegal in file names on common filesystems.
pub fn clean_file_name(value: &str) -> String {
    FILE_NAME_FORBIDDEN.replace_all(value, "").into_owned()
}

pub fn pad_number(n: u32, width: usize) -> String {
    format!("{n:0width$}")
}

/// Normalize text extracted from an HTML node.
pub fn clean_html(value: &str) -> String {
    let without_zero_width: String = value.chars().filter(|c| *c != ZERO_WIDTH_SPACE).collect();
    clean_whitespaces(without_zero_width.trim())
        .trim()
        .nfc()
        .collect()
}
