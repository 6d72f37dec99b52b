use regex::Regex;
use std::sync::LazyLock;

static COLUMN_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s/()]").unwrap());

/// Makes a raw export column name safe for the warehouse (letters, numbers, underscores).
///
/// `"Distance(km)"` becomes `"Distance_km_"`.
pub fn clean_column_name(raw: &str) -> String {
    COLUMN_NAME_RE.replace_all(raw, "_").into_owned()
}

/// Upper-cases the first cased character of every word and lower-cases the rest.
/// A word starts after any character that has no case, so `"o'neil"` becomes `"O'Neil"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;

    for c in s.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_lowercase() || c.is_uppercase();
    }

    out
}

/// Treats blank cells the same as missing ones.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
