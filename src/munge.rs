//! Name and tag sanitizing transforms.
//!
//! Both transforms are idempotent and produce ASCII-only output.

use regex::Regex;
use std::sync::LazyLock;

pub const NAME_MIN_LENGTH: usize = 2;
pub const NAME_MAX_LENGTH: usize = 100;
pub const TAG_MIN_LENGTH: usize = 2;
pub const TAG_MAX_LENGTH: usize = 100;

/// Room left for de-clash suffixes when a name has to be shortened.
const NAME_SHORTEN_TO: usize = NAME_MAX_LENGTH - 5;

static TRAILING_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*?[_-]((?:\d{2,4}[-/])?\d{2,4})$").expect("trailing year regex is valid")
});

/// Turns an arbitrary title or identifier into a stable slug usable as a
/// package or group name: lowercase ASCII alphanumerics, `-` and `_`.
pub fn munge_title_to_name(title: &str) -> String {
    let ascii = substitute_ascii_equivalents(title);

    let mut name = String::with_capacity(ascii.len());
    for c in ascii.chars() {
        let c = match c {
            ' ' | '.' | ':' | '/' => '-',
            c => c,
        };
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            // collapse runs of hyphens
            if c == '-' && name.ends_with('-') {
                continue;
            }
            name.push(c.to_ascii_lowercase());
        }
    }
    let mut name = name.trim_matches('-').to_string();

    if name.len() > NAME_SHORTEN_TO {
        name = match TRAILING_YEAR.captures(&name).and_then(|c| c.get(1)) {
            Some(year) => {
                let year = year.as_str();
                let head = name[..NAME_SHORTEN_TO - year.len() - 1].trim_end_matches('-');
                format!("{head}-{year}")
            }
            None => name[..NAME_SHORTEN_TO].trim_end_matches('-').to_string(),
        };
    }

    munge_to_length(name, NAME_MIN_LENGTH, NAME_MAX_LENGTH)
}

/// Sanitizes a free-text keyword into a tag: lowercase, spaces become `-`,
/// anything other than alphanumerics and `-` is dropped.
pub fn munge_tag(tag: &str) -> String {
    let ascii = substitute_ascii_equivalents(tag);
    let lowered = ascii.to_lowercase();
    let tag: String = lowered
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ' ')
        .map(|c| if c == ' ' { '-' } else { c })
        .collect();
    munge_to_length(tag, TAG_MIN_LENGTH, TAG_MAX_LENGTH)
}

fn munge_to_length(mut value: String, min: usize, max: usize) -> String {
    while value.len() < min {
        value.push('_');
    }
    value.truncate(max);
    value
}

/// Replaces common Latin accented characters with their ASCII equivalents.
/// Characters without an equivalent are left untouched.
pub fn substitute_ascii_equivalents(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let replacement = match c {
            'À' | 'Á' | 'Â' | 'Ã' | 'Å' => "A",
            'Ä' | 'Æ' => "Ae",
            'Ç' => "C",
            'È' | 'É' | 'Ê' | 'Ë' => "E",
            'Ì' | 'Í' | 'Î' | 'Ï' => "I",
            'Ð' => "Th",
            'Ñ' => "N",
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ø' => "O",
            'Ö' => "Oe",
            'Ù' | 'Ú' | 'Û' => "U",
            'Ü' => "Ue",
            'Ý' => "Y",
            'Þ' => "th",
            'ß' => "ss",
            'à' | 'á' | 'â' | 'ã' | 'å' => "a",
            'ä' | 'æ' => "ae",
            'ç' => "c",
            'è' | 'é' | 'ê' | 'ë' => "e",
            'ì' | 'í' | 'î' | 'ï' => "i",
            'ð' => "th",
            'ñ' => "n",
            'ò' | 'ó' | 'ô' | 'õ' | 'ø' => "o",
            'ö' => "oe",
            'ù' | 'ú' | 'û' => "u",
            'ü' => "ue",
            'ý' | 'ÿ' => "y",
            _ => {
                out.push(c);
                continue;
            }
        };
        out.push_str(replacement);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_oai_identifier() {
        assert_eq!(
            munge_title_to_name("oai:example.org:Record/42"),
            "oai-example-org-record-42"
        );
        assert_eq!(munge_title_to_name("  Mixed CASE -- name "), "mixed-case-name");
        assert_eq!(munge_title_to_name("Zürich Daten"), "zuerich-daten");
    }

    #[test]
    fn test_name_is_idempotent_and_bounded() {
        let long = "very long identifier segment ".repeat(10);
        let long_with_year = format!("{}-2019", "a".repeat(120));
        let inputs = [
            "oai:repo:1",
            "x",
            "",
            "!!!",
            "projectA",
            long.as_str(),
            long_with_year.as_str(),
        ];
        for input in inputs {
            let once = munge_title_to_name(input);
            assert_eq!(munge_title_to_name(&once), once, "input {input:?}");
            assert!(once.len() >= NAME_MIN_LENGTH && once.len() <= NAME_MAX_LENGTH);
            assert!(once
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn test_long_name_keeps_trailing_year() {
        let name = munge_title_to_name(&format!("{} 2019", "survey ".repeat(20)));
        assert!(name.ends_with("-2019"));
        assert!(name.len() <= NAME_SHORTEN_TO);
    }

    #[test]
    fn test_short_name_is_padded() {
        assert_eq!(munge_title_to_name("a"), "a_");
        assert_eq!(munge_title_to_name(""), "__");
    }

    #[test]
    fn test_tag() {
        assert_eq!(munge_tag("Social Sciences"), "social-sciences");
        assert_eq!(munge_tag(" Économie & Société "), "economie--societe");
        assert_eq!(munge_tag("x"), "x_");
    }

    #[test]
    fn test_tag_is_idempotent() {
        for input in ["Social Sciences", "a", "C++ / Rust", "ÄÖÜ", "already-clean"] {
            let once = munge_tag(input);
            assert_eq!(munge_tag(&once), once, "input {input:?}");
        }
    }
}
