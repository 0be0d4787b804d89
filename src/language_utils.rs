/*!
 * Language utilities for the source/target language settings.
 *
 * Codes are accepted as ISO 639-1 (`en`), ISO 639-2/T or /B (`eng`, `fre`),
 * optionally followed by a region subtag (`zh-CN`, `pt_BR`) which is kept
 * for display but ignored for matching.
 */

use anyhow::{Result, anyhow};
use isolang::Language;

/// ISO 639-2/B codes that differ from their 639-2/T counterpart
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Split off a region subtag: `zh-CN` -> (`zh`, Some(`CN`))
pub fn split_region(code: &str) -> (String, Option<String>) {
    let trimmed = code.trim();
    match trimmed.split_once(['-', '_']) {
        Some((base, region)) if !region.is_empty() => {
            (base.to_lowercase(), Some(region.to_uppercase()))
        }
        _ => (trimmed.to_lowercase(), None),
    }
}

fn lookup(code: &str) -> Option<Language> {
    let (base, _) = split_region(code);
    match base.len() {
        2 => Language::from_639_1(&base),
        3 => {
            let terminology = BIBLIOGRAPHIC_CODES
                .iter()
                .find(|(b, _)| *b == base)
                .map(|(_, t)| *t)
                .unwrap_or(base.as_str());
            Language::from_639_3(terminology)
        }
        _ => None,
    }
}

/// Validate that a language code names a known language
pub fn validate_language_code(code: &str) -> Result<()> {
    lookup(code)
        .map(|_| ())
        .ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    lookup(code)
        .map(|lang| lang.to_639_3().to_string())
        .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Check if two language codes represent the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (lookup(code1), lookup(code2)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name for a code, keeping any region subtag
///
/// `zh-TW` becomes `Chinese (TW)`; used when filling system prompts.
pub fn get_language_name(code: &str) -> Result<String> {
    let lang = lookup(code).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
    let (_, region) = split_region(code);
    Ok(match region {
        Some(region) => format!("{} ({})", lang.to_name(), region),
        None => lang.to_name().to_string(),
    })
}
