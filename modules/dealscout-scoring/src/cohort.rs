use std::sync::OnceLock;

use regex::Regex;

/// Canonicalize a cohort/batch label: "Winter 2022" and "W2022" both become
/// "W22". Already-canonical labels pass through uppercased; anything
/// unrecognized passes through unchanged (and will score 0 downstream).
pub fn canonicalize(batch: &str) -> String {
    let trimmed = batch.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // Already canonical: W22 / s23.
    if canonical_re()
        .captures(trimmed)
        .is_some()
    {
        return trimmed.to_uppercase();
    }

    // Full season names first (substring match tolerates "YC Winter 2022").
    let lower = trimmed.to_lowercase();
    if let Some(year) = find_year(&lower) {
        if lower.contains("winter") {
            return format!("W{year}");
        }
        if lower.contains("summer") {
            return format!("S{year}");
        }
    }

    // Fallback: {W|S}{4-digit-year} → {W|S}{2-digit-year}.
    if let Some(caps) = season_year_re().captures(trimmed) {
        let season = caps[1].to_uppercase();
        let year = &caps[2][2..];
        return format!("{season}{year}");
    }

    trimmed.to_string()
}

/// Last two digits of a 4-digit year found anywhere in the string.
fn find_year(s: &str) -> Option<String> {
    year_re()
        .find(s)
        .map(|m| m.as_str()[2..].to_string())
}

fn canonical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[WSws]\d{2}$").unwrap())
}

fn season_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([WSws])(\d{4})$").unwrap())
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_and_short_form_agree() {
        assert_eq!(canonicalize("Winter 2022"), "W22");
        assert_eq!(canonicalize("W22"), "W22");
        assert_eq!(canonicalize(canonicalize("Winter 2022").as_str()), "W22");
    }

    #[test]
    fn summer_season() {
        assert_eq!(canonicalize("Summer 2023"), "S23");
        assert_eq!(canonicalize("s23"), "S23");
    }

    #[test]
    fn season_letter_with_four_digit_year() {
        assert_eq!(canonicalize("W2022"), "W22");
        assert_eq!(canonicalize("s2024"), "S24");
    }

    #[test]
    fn embedded_season_name() {
        assert_eq!(canonicalize("YC Winter 2023 batch"), "W23");
    }

    #[test]
    fn unrecognized_passes_through() {
        assert_eq!(canonicalize("Batch 7"), "Batch 7");
        assert_eq!(canonicalize(""), "");
    }
}
