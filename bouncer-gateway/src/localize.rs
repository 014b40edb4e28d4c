//! Localized upgrade messages.
//!
//! The message table is embedded at compile time and parsed once at filter
//! construction. Language negotiation is a small `Accept-Language` q-value
//! parse matched on primary subtags against the locales we ship; anything
//! unsupported falls back to English.

use std::collections::HashMap;

use crate::platform::Platform;

const LANG_TABLE: &str = include_str!("../assets/lang.json");

/// Locales with shipped translations, in table order.
pub const SUPPORTED_LOCALES: [&str; 14] = [
    "en", "ar", "bn", "de", "es", "fa", "fr", "id", "it", "ms", "nl", "ru", "tr", "ur",
];

const FALLBACK_LOCALE: &str = "en";

/// Platform → locale → message, loaded from the embedded table.
pub struct UpgradeMessages {
    table: HashMap<String, HashMap<String, String>>,
}

impl UpgradeMessages {
    pub fn load() -> Self {
        let table = serde_json::from_str(LANG_TABLE).expect("embedded lang.json is well-formed");
        Self { table }
    }

    /// Message for the platform in the best-matching language from an
    /// `Accept-Language` header.
    pub fn for_request(&self, platform: Platform, accept_language: &str) -> &str {
        let locale = negotiate_locale(accept_language);
        self.table
            .get(platform.as_str())
            .and_then(|messages| {
                messages
                    .get(locale)
                    .or_else(|| messages.get(FALLBACK_LOCALE))
            })
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Pick the supported locale best matching an `Accept-Language` header.
///
/// Entries are ordered by q-value (descending, header order breaking ties)
/// and matched on their primary subtag, so `de-AT` selects `de`. No match,
/// an empty header, or `*` yields English.
pub fn negotiate_locale(accept_language: &str) -> &'static str {
    let mut candidates: Vec<(f32, usize, &str)> = accept_language
        .split(',')
        .enumerate()
        .filter_map(|(position, entry)| {
            let mut parts = entry.split(';');
            let tag = parts.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }

            let quality = parts
                .filter_map(|param| {
                    let param = param.trim();
                    param.strip_prefix("q=")?.parse::<f32>().ok()
                })
                .next()
                .unwrap_or(1.0);

            // Drops q=0 and anything unparseable-to-positive (incl. NaN).
            if !(quality > 0.0) {
                return None;
            }
            Some((quality, position, tag))
        })
        .collect();

    // Highest quality first; header order breaks ties.
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then(a.1.cmp(&b.1)));

    for (_, _, tag) in candidates {
        let primary = tag.split('-').next().unwrap_or(tag).to_ascii_lowercase();
        if let Some(supported) = SUPPORTED_LOCALES.iter().find(|l| **l == primary) {
            return *supported;
        }
    }

    FALLBACK_LOCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_language_matches() {
        assert_eq!(negotiate_locale("de"), "de");
        assert_eq!(negotiate_locale("tr"), "tr");
    }

    #[test]
    fn regional_variant_matches_primary_subtag() {
        assert_eq!(negotiate_locale("de-AT"), "de");
        assert_eq!(negotiate_locale("es-419"), "es");
    }

    #[test]
    fn q_values_order_preferences() {
        assert_eq!(negotiate_locale("fr;q=0.5, de;q=0.9"), "de");
        assert_eq!(negotiate_locale("xx;q=1.0, ru;q=0.3"), "ru");
    }

    #[test]
    fn unsupported_language_falls_back_to_english() {
        assert_eq!(negotiate_locale("ja-JP, ko;q=0.8"), "en");
        assert_eq!(negotiate_locale(""), "en");
        assert_eq!(negotiate_locale("*"), "en");
    }

    #[test]
    fn zero_quality_entries_are_ignored() {
        assert_eq!(negotiate_locale("de;q=0, fr"), "fr");
    }

    #[test]
    fn table_has_every_supported_locale_for_both_platforms() {
        let messages = UpgradeMessages::load();
        for platform in [Platform::Ios, Platform::Android] {
            for locale in SUPPORTED_LOCALES {
                let message = messages
                    .table
                    .get(platform.as_str())
                    .and_then(|m| m.get(locale));
                assert!(
                    message.is_some_and(|m| !m.is_empty()),
                    "missing {locale} for {}",
                    platform.as_str()
                );
            }
        }
    }

    #[test]
    fn message_selection_honours_accept_language() {
        let messages = UpgradeMessages::load();
        let german = messages.for_request(Platform::Ios, "de-DE, en;q=0.5");
        assert!(german.contains("App Store"));
        assert!(german.contains("aktualisiere"));

        let fallback = messages.for_request(Platform::Android, "ja");
        assert!(fallback.contains("Google Play"));
        assert!(fallback.starts_with("This version"));
    }
}
