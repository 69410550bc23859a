use regex::Regex;
use std::sync::LazyLock;

static TOKEN_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,\s]+").expect("valid token separator pattern"));

static PLAIN_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid number pattern"));

/// Number, decimal or `min-max` range, including the partial forms seen while
/// the value is still being typed (`"12."`, `"1200-"`).
static AREA_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(\.\d*)?(\s*-\s*(\d+(\.\d*)?)?)?)?$").expect("valid area pattern")
});

/// Splits free-text BHK input on commas and whitespace. Bare numbers get a
/// `BHK` suffix; every other token passes through as typed.
pub fn bhk_tokens(raw: &str) -> Vec<String> {
    TOKEN_SEPARATOR
        .split(raw.trim())
        .filter(|token| !token.is_empty())
        .map(|token| {
            if token.chars().all(|character| character.is_ascii_digit()) {
                format!("{token}BHK")
            } else {
                token.to_string()
            }
        })
        .collect()
}

pub fn format_bhk_input(raw: &str) -> String {
    bhk_tokens(raw).join(", ")
}

/// Normalizes apartment price text to `"<number> Cr"`. Input that is not a
/// complete number once the suffix is stripped comes back untouched.
pub fn format_price_input(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_suffix = strip_crore_suffix(trimmed).trim();
    if PLAIN_NUMBER.is_match(without_suffix) {
        return format!("{without_suffix} Cr");
    }
    raw.to_string()
}

fn strip_crore_suffix(value: &str) -> &str {
    let split_at = value.len().saturating_sub(2);
    match (value.get(..split_at), value.get(split_at..)) {
        (Some(head), Some(tail)) if tail.eq_ignore_ascii_case("cr") => head,
        _ => value,
    }
}

pub fn accept_area_input(raw: &str) -> bool {
    AREA_INPUT.is_match(raw.trim())
}

/// Lower-cases `name` and collapses every run of non-alphanumerics into a
/// single hyphen, trimmed at both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for character in name.chars() {
        if character.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(character.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}
