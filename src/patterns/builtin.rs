// src/patterns/builtin.rs
//! Built-in extraction patterns registered by `PatternRegistry::new`.

use super::PatternDefinition;
use crate::utils::text::normalize_whitespace;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static NON_DIGIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\D").expect("Failed to compile NON_DIGIT_RE")
});

/// Regex source, context keywords and priority for every built-in pattern.
const EMAIL: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
const PHONE: &str = r"(?:\+?1[-.\s]?)?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b";
const PHONE_INTERNATIONAL: &str = r"\+?[1-9]\d{0,3}[-.\s]?\(?\d{1,4}\)?[-.\s]?\d{1,4}[-.\s]?\d{1,9}";
const ZIP_CODE: &str = r"\b\d{5}(?:-\d{4})?\b";
// Case-sensitive on purpose so honorifics like "Ms." are not read as degrees.
const EDUCATION: &str = r"\b(?:J\.?D|LL\.?M|B\.?A|B\.?S|M\.?A|M\.?S|Ph\.?D|M\.?B\.?A|JD|LLM|PhD|MBA)\b\.?(?:,?\s+[A-Z][^,\n]*)?(?:,\s*(?:19|20)\d{2})?";
const BAR_ADMISSION: &str = r"(?i)(?:Admitted to|Member of|Licensed in|Bar Admissions?)[^.]+?(?:Bar|Court|Practice)[^.]*\.?";
const SOCIAL_MEDIA: &str = r"(?i)(?:https?://)?(?:www\.)?(?:linkedin\.com/in/|twitter\.com/|x\.com/|facebook\.com/)[A-Za-z0-9_.-]+";
const PRICE: &str = r"\$\s*\d+(?:,\d{3})*(?:\.\d{2})?";
const DATE: &str = r"(?i)\b(?:(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}|\d{1,2}[-/]\d{1,2}[-/]\d{2,4}|\d{4}[-/]\d{1,2}[-/]\d{1,2})\b";
const ADDRESS: &str = r"(?i)\d+\s+[A-Za-z\s]+(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Plaza|Place|Pl)(?:[,\s]+(?:Suite|Ste|Floor|Fl)?[,\s]*\d*)?[,\s]+[A-Za-z\s]+[,\s]+[A-Z]{2}\s+\d{5}(?:-\d{4})?";

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Builds the built-in pattern set. Sources are constants, so compilation
/// failures are programming errors.
pub(crate) fn builtin_patterns() -> Vec<PatternDefinition> {
    let table: Vec<(&str, &str, Vec<String>, i32)> = vec![
        ("email", EMAIL, keywords(&["email", "e-mail", "contact", "mail", "@"]), 100),
        ("phone", PHONE, keywords(&["phone", "tel", "call", "mobile", "cell", "direct", "office"]), 90),
        ("social_media", SOCIAL_MEDIA, keywords(&["linkedin", "twitter", "facebook", "social"]), 80),
        ("price", PRICE, keywords(&["price", "cost", "fee", "rate", "$"]), 70),
        ("date", DATE, keywords(&["date", "when", "deadline", "posted", "updated"]), 60),
        ("address", ADDRESS, keywords(&["address", "location", "office", "headquarters"]), 50),
        ("zip_code", ZIP_CODE, keywords(&["zip", "postal", "code"]), 40),
        ("phone_international", PHONE_INTERNATIONAL, keywords(&["phone", "tel", "international"]), 30),
        ("education", EDUCATION, keywords(&["education", "university", "college", "school", "degree", "graduated", "alumni"]), 20),
        ("bar_admission", BAR_ADMISSION, keywords(&["bar", "admission", "licensed", "admitted", "court", "practice"]), 10),
    ];

    table
        .into_iter()
        .map(|(name, source, context, priority)| {
            let definition = PatternDefinition::new(name, source)
                .unwrap_or_else(|e| panic!("built-in pattern '{}' failed to compile: {}", name, e))
                .with_context_keywords(context)
                .with_priority(priority);
            match name {
                "email" => definition.with_validator(Arc::new(validate_email)),
                "phone" => definition
                    .with_validator(Arc::new(validate_phone))
                    .with_normalizer(Arc::new(format_phone)),
                "phone_international" => definition.with_validator(Arc::new(validate_international_phone)),
                "zip_code" => definition.with_validator(Arc::new(|v: &str| {
                    matches!(v.replace('-', "").len(), 5 | 9)
                })),
                "education" => definition.with_normalizer(Arc::new(clean_education)),
                "social_media" => definition.with_normalizer(Arc::new(normalize_social_url)),
                "price" => definition.with_normalizer(Arc::new(normalize_price)),
                "date" => definition.with_validator(Arc::new(validate_date)),
                "address" => definition.with_normalizer(Arc::new(clean_address)),
                _ => definition,
            }
        })
        .collect()
}

fn digits(value: &str) -> String {
    NON_DIGIT_RE.replace_all(value, "").into_owned()
}

fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    domain.contains('.') && !email.contains("..") && !email.starts_with('.') && !email.ends_with('.')
}

/// North American numbers: the area code never starts with 0 or 1.
fn validate_phone(phone: &str) -> bool {
    let digits = digits(phone);
    let national = match digits.len() {
        10 => digits.as_str(),
        11 if digits.starts_with('1') => &digits[1..],
        _ => return false,
    };
    !matches!(national.as_bytes()[0], b'0' | b'1')
}

fn format_phone(phone: &str) -> String {
    let digits = digits(phone);
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        11 if digits.starts_with('1') => {
            format!("+1 ({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..])
        }
        _ => phone.to_string(),
    }
}

fn validate_international_phone(phone: &str) -> bool {
    (10..=15).contains(&digits(phone).len())
}

/// Rejects numeric dates whose month or day cannot exist.
fn validate_date(date: &str) -> bool {
    let parts: Vec<&str> = date.split(['-', '/']).collect();
    if parts.len() != 3 || !parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) {
        // Month-name form; the regex already constrains it.
        return true;
    }
    let nums: Vec<u32> = parts.iter().filter_map(|p| p.parse().ok()).collect();
    if nums.len() != 3 {
        return false;
    }
    let (month, day) = if parts[0].len() == 4 {
        (nums[1], nums[2])
    } else {
        (nums[0], nums[1])
    };
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

fn clean_education(education: &str) -> String {
    let mut cleaned = normalize_whitespace(education);
    for (old, new) in [
        ("J.D.", "JD"),
        ("LL.M.", "LLM"),
        ("B.A.", "BA"),
        ("B.S.", "BS"),
        ("M.A.", "MA"),
        ("M.S.", "MS"),
        ("Ph.D.", "PhD"),
        ("M.B.A.", "MBA"),
    ] {
        cleaned = cleaned.replace(old, new);
    }
    cleaned.trim().to_string()
}

fn normalize_social_url(url: &str) -> String {
    let trimmed = url.trim_end_matches(['/', '.']);
    if trimmed.to_lowercase().starts_with("http") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

fn normalize_price(price: &str) -> String {
    price.replace(['$', ',', ' '], "")
}

fn clean_address(address: &str) -> String {
    let mut cleaned = normalize_whitespace(address);
    for (old, new) in [
        (" Street", " St"),
        (" Avenue", " Ave"),
        (" Road", " Rd"),
        (" Boulevard", " Blvd"),
        (" Suite", " Ste"),
        (" Floor", " Fl"),
    ] {
        cleaned = cleaned.replace(old, new);
    }
    cleaned
}
