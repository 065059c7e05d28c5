//! Message catalogs for user-facing text.
//!
//! Catalogs are JSON maps from message id to text, embedded at build time.
//! Lookups fall back to English and then to the key itself so a missing
//! translation never hides output.

use rust_embed::RustEmbed;
use std::collections::HashMap;
use std::fmt;
use unic_langid::LanguageIdentifier;

#[derive(RustEmbed)]
#[folder = "assets/i18n/"]
struct Catalogs;

/// Tags served in Russian; everything else is English
const RUSSIAN_TAGS: [&str; 2] = ["ru", "ru-RU"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    En,
    Ru,
}

impl Locale {
    /// Map a language tag (`ru`, `ru-RU`, `ru_RU.UTF-8`, `en-US`, ...) to a supported locale
    pub fn from_tag(tag: &str) -> Self {
        // POSIX locales carry an encoding and use `_`: ru_RU.UTF-8
        let tag = tag.split(['.', '@']).next().unwrap_or_default().replace('_', "-");
        let Ok(lang) = tag.parse::<LanguageIdentifier>() else {
            tracing::debug!("Unparsable language tag `{tag}`");
            return Locale::En;
        };

        let russian = RUSSIAN_TAGS
            .iter()
            .filter_map(|t| t.parse::<LanguageIdentifier>().ok())
            .any(|known| known == lang);
        if russian {
            Locale::Ru
        } else {
            Locale::En
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ru => "ru",
        }
    }

    fn catalog_file(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the locale: explicit request first, then the OS locale, then English
pub fn resolve_locale(requested: Option<&str>) -> Locale {
    if let Some(tag) = requested.filter(|t| !t.trim().is_empty()) {
        return Locale::from_tag(tag.trim());
    }
    match sys_locale::get_locale() {
        Some(os_tag) => Locale::from_tag(&os_tag),
        None => Locale::En,
    }
}

pub struct Messages {
    locale: Locale,
    catalog: HashMap<String, String>,
    fallback: HashMap<String, String>,
}

impl Messages {
    pub fn new(locale: Locale) -> Self {
        let fallback = load_catalog(Locale::En);
        let catalog = match locale {
            Locale::En => HashMap::new(),
            Locale::Ru => load_catalog(locale),
        };
        tracing::debug!("Loaded {} messages for locale {}", catalog.len(), locale);
        Self {
            locale,
            catalog,
            fallback,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Translate a message key
    pub fn tr(&self, key: &str) -> String {
        self.catalog
            .get(key)
            .or_else(|| self.fallback.get(key))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self::new(Locale::En)
    }
}

fn load_catalog(locale: Locale) -> HashMap<String, String> {
    let file = locale.catalog_file();
    let Some(content) = Catalogs::get(&file) else {
        tracing::error!("Message catalog {file} is not embedded");
        return HashMap::new();
    };
    match serde_json::from_slice(content.data.as_ref()) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!("Broken message catalog {file}: {e}");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_from_tag() {
        assert_eq!(Locale::from_tag("ru"), Locale::Ru);
        assert_eq!(Locale::from_tag("ru-RU"), Locale::Ru);
        assert_eq!(Locale::from_tag("ru_RU.UTF-8"), Locale::Ru);
        assert_eq!(Locale::from_tag("RU-ru"), Locale::Ru);
        assert_eq!(Locale::from_tag("en-US"), Locale::En);
        assert_eq!(Locale::from_tag("fr"), Locale::En);
        assert_eq!(Locale::from_tag(""), Locale::En);
    }

    #[test]
    fn test_other_russian_regions_are_english() {
        assert_eq!(Locale::from_tag("ru-UA"), Locale::En);
        assert_eq!(Locale::from_tag("ru-BY"), Locale::En);
        assert_eq!(Locale::from_tag("ru_KZ.UTF-8"), Locale::En);
        assert_eq!(Locale::from_tag("ru-Cyrl-RU"), Locale::En);
        assert_eq!(Locale::from_tag("not a tag"), Locale::En);
    }

    #[test]
    fn test_explicit_locale_wins() {
        assert_eq!(resolve_locale(Some("ru-RU")), Locale::Ru);
        assert_eq!(resolve_locale(Some("de")), Locale::En);
    }

    #[test]
    fn test_catalogs_share_keys() {
        let en = load_catalog(Locale::En);
        let ru = load_catalog(Locale::Ru);
        assert!(!en.is_empty());
        let mut en_keys: Vec<_> = en.keys().collect();
        let mut ru_keys: Vec<_> = ru.keys().collect();
        en_keys.sort();
        ru_keys.sort();
        assert_eq!(en_keys, ru_keys);
    }

    #[test]
    fn test_translation_and_fallback() {
        let en = Messages::new(Locale::En);
        assert_eq!(en.tr("request.no_ca"), "Not found available CA");

        let ru = Messages::new(Locale::Ru);
        assert_eq!(ru.tr("request.select_ca"), "Выберите УЦ:");
        assert_eq!(ru.tr("no.such.key"), "no.such.key");
    }
}
