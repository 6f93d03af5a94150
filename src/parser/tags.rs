use std::sync::LazyLock;

use regex::Regex;

/// Word stems that mark the cause or kind of an outage: district heating,
/// maintenance, distribution, renovation, damage, excavation, repair...
pub const TAG_PREFIXES: &[&str] = &[
    "kauko", "huol", "jake", "saneer", "lämmö", "kesk", "vahin", "kaiv", "sähk", "vaurio",
    "korj", "per",
];

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b((?:{})\w*)\b", TAG_PREFIXES.join("|"))).unwrap()
});

/// Every whole word in `text` that starts with a tag prefix, in order of
/// appearance, duplicates kept, original casing kept.
pub fn extract_tags(text: &str) -> Vec<String> {
    TAG_RE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintenance_and_outage() {
        assert_eq!(
            extract_tags("huoltotyön vuoksi sähkökatko"),
            vec!["huoltotyön", "sähkökatko"]
        );
    }

    #[test]
    fn keeps_case_and_duplicates() {
        assert_eq!(
            extract_tags("Kaivinkoneella katkaistu kaapeli. Korjaus ja korjaus jatkuu"),
            vec!["Kaivinkoneella", "Korjaus", "korjaus"]
        );
    }

    #[test]
    fn prefix_must_start_the_word() {
        // "asiakaskeskus" contains "kesk" but not at a word start
        assert!(extract_tags("ota yhteyttä asiakaskeskukseen").is_empty());
        assert_eq!(extract_tags("Keskeytys alueella"), vec!["Keskeytys"]);
    }

    #[test]
    fn nordic_letters_stay_in_word() {
        assert_eq!(
            extract_tags("lämmönjakelun keskeytys; vahingot"),
            vec!["lämmönjakelun", "keskeytys", "vahingot"]
        );
    }

    #[test]
    fn empty_tail() {
        assert!(extract_tags("").is_empty());
    }
}
