//! Static registry of supported marketplaces.
//!
//! Each entry carries everything the pipeline needs to harvest one source:
//! the search page to render, a regex recognising that source's listing
//! detail URLs, and the city list used when a listing's location cannot be
//! recovered from the page text.

/// Configuration for one marketplace.
#[derive(Debug, Clone, Copy)]
pub struct SourceConfig {
    pub name: &'static str,
    pub search_url: &'static str,
    pub country: &'static str,
    pub base_url: &'static str,
    /// Matches a listing detail-page URL on this source.
    pub listing_url_pattern: &'static str,
    pub cities: &'static [&'static str],
}

static SOURCES: &[SourceConfig] = &[
    SourceConfig {
        name: "autoplius",
        search_url: "https://autoplius.lt/skelbimai/naudoti-automobiliai",
        country: "LT",
        base_url: "https://autoplius.lt",
        listing_url_pattern: r"autoplius\.lt/skelbimai/[\w-]+-\d+\.html",
        cities: &["Vilnius", "Kaunas", "Klaipėda", "Šiauliai", "Panevėžys"],
    },
    SourceConfig {
        name: "autogidas",
        search_url: "https://autogidas.lt/skelbimai/automobiliai",
        country: "LT",
        base_url: "https://autogidas.lt",
        listing_url_pattern: r"autogidas\.lt/skelbimas/[\w-]+\.html",
        cities: &["Vilnius", "Kaunas", "Klaipėda", "Alytus", "Marijampolė"],
    },
    SourceConfig {
        name: "mobile_de",
        search_url: "https://suchen.mobile.de/fahrzeuge/search.html?isSearchRequest=true&vc=Car",
        country: "DE",
        base_url: "https://suchen.mobile.de",
        listing_url_pattern: r"suchen\.mobile\.de/fahrzeuge/details\.html\?id=\d+",
        cities: &["Berlin", "Hamburg", "München", "Köln", "Frankfurt", "Stuttgart"],
    },
    SourceConfig {
        name: "otomoto",
        search_url: "https://otomoto.pl/osobowe",
        country: "PL",
        base_url: "https://otomoto.pl",
        listing_url_pattern: r"otomoto\.pl/osobowe/oferta/[\w-]+\.html",
        cities: &["Warszawa", "Kraków", "Gdańsk", "Wrocław", "Poznań"],
    },
    SourceConfig {
        name: "autoscout24",
        search_url: "https://autoscout24.de/lst?sort=age&desc=1",
        country: "DE",
        base_url: "https://autoscout24.de",
        listing_url_pattern: r"autoscout24\.[a-z]+/angebote/[\w-]+",
        cities: &["Berlin", "Hamburg", "Dresden", "Leipzig", "Hannover"],
    },
];

/// Look up a source by id. Unknown ids are a caller error.
pub fn config_for(source_id: &str) -> Option<&'static SourceConfig> {
    SOURCES.iter().find(|s| s.name == source_id)
}

pub fn all() -> impl Iterator<Item = &'static SourceConfig> {
    SOURCES.iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn known_source_resolves() {
        let cfg = config_for("autoplius").unwrap();
        assert_eq!(cfg.country, "LT");
        assert!(!cfg.cities.is_empty());
    }

    #[test]
    fn unknown_source_is_none() {
        assert!(config_for("craigslist").is_none());
    }

    #[test]
    fn listing_patterns_compile_and_match() {
        for src in all() {
            let re = Regex::new(src.listing_url_pattern).unwrap();
            // Every pattern must reference its own host.
            assert!(
                src.listing_url_pattern.contains('\\'),
                "{} pattern looks unescaped",
                src.name
            );
            if src.name == "autoplius" {
                assert!(re.is_match("https://autoplius.lt/skelbimai/bmw-320d-12345678.html"));
                assert!(!re.is_match("https://autoplius.lt/naujienos/straipsnis.html"));
            }
        }
    }
}
