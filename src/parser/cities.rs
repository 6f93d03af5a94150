use std::cmp::Reverse;
use std::sync::LazyLock;

use regex::Regex;

/// Municipalities and villages in the Savon Voima distribution area.
pub const DEFAULT_CITIES: &[&str] = &[
    "Iisalmi", "Joensuu", "Joroinen", "Juankoski", "Karttula", "Keitele", "Kiuruvesi",
    "Lapinlahti", "Leppävirta", "Maaninka", "Nilsiä", "Pieksämäki", "Pielavesi", "Rautalampi",
    "Siilinjärvi", "Suonenjoki", "Tahkovuori", "Varpaisjärvi", "Vuorela", "Toivala",
];

/// Finnish place names inflect at the end ("Iisalmi" → "Iisalmessa"), so a
/// shared stem of this many characters counts as a match.
const PREFIX_LEN: usize = 5;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zåäö]{3,}\b").unwrap());

struct City {
    name: String,
    prefix: String,
}

/// Prefix matcher over a canonical city list, longest names tried first.
pub struct CityMatcher {
    cities: Vec<City>,
}

impl Default for CityMatcher {
    fn default() -> Self {
        CityMatcher::new(DEFAULT_CITIES)
    }
}

impl CityMatcher {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut cities: Vec<City> = names
            .iter()
            .map(|n| {
                let name = n.as_ref().trim().to_string();
                let prefix = name.to_lowercase().chars().take(PREFIX_LEN).collect();
                City { name, prefix }
            })
            .filter(|c| !c.name.is_empty())
            .collect();
        // stable: equal lengths keep list order
        cities.sort_by_key(|c| Reverse(c.name.chars().count()));
        CityMatcher { cities }
    }

    /// First city (longest first) whose stem starts some word of `text`.
    pub fn find(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = WORD_RE.find_iter(&lower).map(|m| m.as_str()).collect();
        self.cities
            .iter()
            .find(|city| words.iter().any(|w| w.starts_with(city.prefix.as_str())))
            .map(|city| city.name.as_str())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inflected_name() {
        let m = CityMatcher::default();
        assert_eq!(m.find("Kaivinkoneella katkaistu kaapeli Iisalmessa"), Some("Iisalmi"));
        assert_eq!(m.find("katko Siilinjärven keskustassa"), Some("Siilinjärvi"));
        assert_eq!(m.find("Nilsiän Tahkovuorella"), Some("Tahkovuori"));
    }

    #[test]
    fn no_city() {
        let m = CityMatcher::default();
        assert_eq!(m.find("huoltotyön vuoksi sähkökatko"), None);
        assert_eq!(m.find(""), None);
    }

    #[test]
    fn longest_first_wins() {
        // both share the stem "piela"; the longer name is tried first
        let m = CityMatcher::new(&["Piela", "Pielavesi"]);
        assert_eq!(m.find("pielaveden alueella"), Some("Pielavesi"));
    }

    #[test]
    fn short_names_match_in_full() {
        let m = CityMatcher::new(&["Ii", "Oulu"]);
        // tokens need at least three letters, so "ii" alone never matches
        assert_eq!(m.find("ii"), None);
        assert_eq!(m.find("Iin kunnassa"), Some("Ii"));
        assert_eq!(m.find("oulussa"), Some("Oulu"));
    }

    #[test]
    fn word_order_does_not_beat_city_order() {
        let m = CityMatcher::default();
        // "Iisalmi" (7) is tried before "Vuorela" (7, later in list) and both appear
        assert_eq!(m.find("Vuorelan ja Iisalmen välillä"), Some("Iisalmi"));
    }
}
