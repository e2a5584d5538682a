//! Attribute comparators used by C-FIND and C-MOVE matching
//!
//! `model` is the value supplied in the request identifier, `value` the one
//! stored in the index record. An empty model value matches everything.

use crate::index::catalog::MatchClass;

/// Match a stored value against a request value using the class comparator
pub fn matches(class: MatchClass, model: &str, value: &str) -> bool {
    if model.is_empty() {
        return true;
    }
    match class {
        MatchClass::Date => match_range(model, value, parse_date),
        MatchClass::Time => match_range(model, value, parse_time),
        MatchClass::Uid => match_uid(model, value),
        MatchClass::String => match_string(model, value),
        MatchClass::Other => model == value,
    }
}

fn trim_padding(value: &str) -> &str {
    value.trim_matches(|c: char| c == ' ' || c == '\0')
}

/// Exact value or inclusive range `-X`, `X-`, `X-Y`
fn match_range<T, F>(model: &str, value: &str, parse: F) -> bool
where
    T: PartialOrd,
    F: Fn(&str) -> Option<T>,
{
    let model = trim_padding(model);
    let Some(actual) = parse(trim_padding(value)) else {
        return false;
    };

    match model.split_once('-') {
        None => parse(model).is_some_and(|expected| actual == expected),
        Some((lower, upper)) => {
            let lower = trim_padding(lower);
            let upper = trim_padding(upper);
            if lower.is_empty() && upper.is_empty() {
                return false;
            }
            let above = lower.is_empty() || parse(lower).is_some_and(|l| actual >= l);
            let below = upper.is_empty() || parse(upper).is_some_and(|u| actual <= u);
            above && below
        }
    }
}

/// `YYYYMMDD` as a number; the old `YYYY.MM.DD` form is accepted too
pub(crate) fn parse_date(value: &str) -> Option<u32> {
    let digits: String = value.chars().filter(|c| *c != '.').collect();
    if digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `HH[MM[SS[.FFFFFF]]]` (or `HH:MM:SS`) as seconds of day
pub(crate) fn parse_time(value: &str) -> Option<f64> {
    let compact: String = value.chars().filter(|c| *c != ':').collect();
    let (whole, fraction) = match compact.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (compact.as_str(), None),
    };
    if whole.is_empty()
        || whole.len() > 6
        || whole.len() % 2 != 0
        || !whole.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let field = |range: std::ops::Range<usize>| -> f64 {
        whole.get(range).and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0)
    };
    let mut seconds = field(0..2) * 3600.0 + field(2..4) * 60.0 + field(4..6);
    if let Some(fraction) = fraction {
        if !fraction.is_empty() {
            if !fraction.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            seconds += format!("0.{}", fraction).parse::<f64>().ok()?;
        }
    }
    Some(seconds)
}

/// Exact UID or member of a backslash separated list
fn match_uid(model: &str, value: &str) -> bool {
    let value = trim_padding(value);
    trim_padding(model)
        .split('\\')
        .any(|candidate| trim_padding(candidate) == value)
}

/// Exact or wildcard match after trimming enclosing spaces
fn match_string(model: &str, value: &str) -> bool {
    let model = trim_padding(model);
    let value = trim_padding(value);
    if model.contains(|c: char| c == '*' || c == '?') {
        wildcard_match(model, value)
    } else {
        model == value
    }
}

/// DICOM wildcard match: `*` any run including empty, `?` exactly one character
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut p, mut v) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;
    while v < value.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == value[v]) {
            p += 1;
            v += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            mark = v;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            v = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
