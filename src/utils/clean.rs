// src/utils/clean.rs

//! Text cleaning and date parsing for upstream payloads.
//!
//! Station names and addresses arrive with diacritics and typographic
//! punctuation; fingerprints and display both use the cleaned form, so
//! cleaning must be idempotent.

use chrono::NaiveDate;

/// Replacement table for diacritics and typographic punctuation.
///
/// Applied in order; replacement output never contains a character that
/// appears as a later key, which is what keeps `clean_text` idempotent.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("ä", "ae"),
    ("ö", "oe"),
    ("ü", "ue"),
    ("ß", "ss"),
    ("Ä", "Ae"),
    ("Ö", "OE"),
    ("Ü", "UE"),
    ("Á", "A"),
    ("É", "E"),
    ("Í", "I"),
    ("Ó", "O"),
    ("Ú", "U"),
    ("á", "a"),
    ("é", "e"),
    ("í", "i"),
    ("ó", "o"),
    ("ú", "u"),
    ("ø", "oe"),
    ("Ø", "OE"),
    ("\u{2018}", ""),
    ("\u{2019}", ""),
    ("\u{201C}", ""),
    ("\u{201D}", ""),
    (",", ""),
    (";", ""),
    (":", ""),
    ("!", ""),
    ("?", ""),
    (".", ""),
    ("-", " "),
    ("_", " "),
    ("/", " "),
    ("\\", " "),
    ("|", " "),
    ("(", ""),
    (")", ""),
    ("'", ""),
    ("\"", ""),
    ("\t", " "),
];

/// Normalize a station name or address to a safe ASCII-ish subset.
///
/// Collapses internal whitespace and trims the result. Idempotent:
/// `clean_text(clean_text(s)) == clean_text(s)`.
pub fn clean_text(text: &str) -> String {
    let mut result = text.to_string();
    for (from, to) in REPLACEMENTS {
        if result.contains(from) {
            result = result.replace(from, to);
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse the date portion of an ISO-8601 timestamp.
///
/// Only the first 10 characters (`YYYY-MM-DD`) are significant; the
/// time and offset parts vary per upstream endpoint and are ignored.
pub fn parse_iso_date(timestamp: &str) -> Option<NaiveDate> {
    let date_part = timestamp.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_diacritics() {
        assert_eq!(clean_text("München"), "Muenchen");
        assert_eq!(clean_text("Málaga"), "Malaga");
        assert_eq!(clean_text("Køge"), "Koege");
    }

    #[test]
    fn test_clean_text_punctuation() {
        assert_eq!(clean_text("Hamburg-Nord (Hauptbahnhof)"), "Hamburg Nord Hauptbahnhof");
        assert_eq!(clean_text("Calle Mayor, 3"), "Calle Mayor 3");
    }

    #[test]
    fn test_clean_text_whitespace_collapse() {
        assert_eq!(clean_text("  a \t b\t\tc  "), "a b c");
    }

    #[test]
    fn test_clean_text_idempotent() {
        let samples = [
            "München Ost-Bahnhof (Tor 2)",
            "Århus, ø-gade 1",
            "plain text already clean",
        ];
        for s in samples {
            let once = clean_text(s);
            assert_eq!(clean_text(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(
            parse_iso_date("2024-07-01T00:00:00+02:00"),
            NaiveDate::from_ymd_opt(2024, 7, 1)
        );
        assert_eq!(
            parse_iso_date("2024-07-01"),
            NaiveDate::from_ymd_opt(2024, 7, 1)
        );
    }

    #[test]
    fn test_parse_iso_date_invalid() {
        assert!(parse_iso_date("not a date").is_none());
        assert!(parse_iso_date("2024-7").is_none());
        assert!(parse_iso_date("").is_none());
    }
}
