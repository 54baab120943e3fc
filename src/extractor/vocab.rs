//! Brand and model vocabularies for the heuristic extractor.
//!
//! The marketplace pages are uncontrolled third-party HTML rendered to
//! markdown, so recognition is plain case-insensitive substring matching
//! against a fixed vocabulary rather than anything structural.

/// (needle, canonical name). Longer spellings come before their
/// abbreviations so "Volkswagen Golf" is not claimed by the "vw" needle.
static BRANDS: &[(&str, &str)] = &[
    ("volkswagen", "Volkswagen"),
    ("vw", "Volkswagen"),
    ("mercedes", "Mercedes"),
    ("bmw", "BMW"),
    ("audi", "Audi"),
    ("toyota", "Toyota"),
    ("porsche", "Porsche"),
    ("tesla", "Tesla"),
    ("volvo", "Volvo"),
    ("skoda", "Skoda"),
    ("ford", "Ford"),
    ("opel", "Opel"),
    ("honda", "Honda"),
    ("kia", "Kia"),
    ("hyundai", "Hyundai"),
    ("mazda", "Mazda"),
    ("lexus", "Lexus"),
    ("nissan", "Nissan"),
    ("peugeot", "Peugeot"),
    ("renault", "Renault"),
];

static MODELS: &[(&str, &[&str])] = &[
    ("BMW", &["320", "318", "330", "520", "530", "X5", "X3", "X1", "M3", "116", "730"]),
    ("Mercedes", &["C220", "C200", "E220", "E350", "A180", "GLC", "GLE", "ML", "Vito", "Sprinter"]),
    ("Audi", &["A4", "A6", "A3", "A8", "Q5", "Q7", "Q3", "TT"]),
    ("Volkswagen", &["Golf", "Passat", "Tiguan", "Polo", "Touran", "Touareg", "Caddy", "Transporter"]),
    ("Toyota", &["Corolla", "RAV4", "Avensis", "Yaris", "Auris", "Camry", "Land Cruiser"]),
    ("Porsche", &["Cayenne", "Macan", "Panamera", "Taycan", "911"]),
    ("Tesla", &["Model 3", "Model S", "Model X", "Model Y"]),
    ("Volvo", &["XC60", "XC90", "XC40", "V60", "V40", "S60", "S90"]),
    ("Skoda", &["Octavia", "Superb", "Kodiaq", "Fabia", "Karoq"]),
    ("Ford", &["Focus", "Mondeo", "Kuga", "Fiesta", "Galaxy", "Transit"]),
    ("Opel", &["Astra", "Insignia", "Zafira", "Corsa", "Mokka", "Vectra"]),
    ("Honda", &["Civic", "CR-V", "Accord", "Jazz", "HR-V"]),
    ("Kia", &["Sportage", "Ceed", "Sorento", "Rio", "Niro", "Picanto"]),
    ("Hyundai", &["Tucson", "i30", "i20", "Santa Fe", "Kona", "Ioniq"]),
    ("Mazda", &["CX-5", "CX-3", "CX-30", "MX-5", "6", "3"]),
    ("Lexus", &["RX", "NX", "IS", "ES", "CT", "UX"]),
    ("Nissan", &["Qashqai", "Juke", "X-Trail", "Leaf", "Micra", "Navara"]),
    ("Peugeot", &["308", "508", "3008", "2008", "208", "Partner"]),
    ("Renault", &["Megane", "Clio", "Captur", "Scenic", "Talisman", "Trafic"]),
];

/// Fallback model label when no vocabulary entry matches the line.
pub const FALLBACK_MODEL: &str = "Modelis";

pub const GENERIC_IMAGE: &str =
    "https://images.unsplash.com/photo-1494976388531-d1058494cdd8?w=800";

/// Stock photos used when a page yields no usable image for a listing.
static BRAND_IMAGES: &[(&str, &str)] = &[
    ("BMW", "https://images.unsplash.com/photo-1555215695-3004980ad54e?w=800"),
    ("Mercedes", "https://images.unsplash.com/photo-1618843479313-40f8afb4b4d8?w=800"),
    ("Audi", "https://images.unsplash.com/photo-1603584173870-7f23fdae1b7a?w=800"),
    ("Volkswagen", "https://images.unsplash.com/photo-1572811298797-f2090fb4b4d9?w=800"),
    ("Toyota", "https://images.unsplash.com/photo-1559416523-140ddc3d238c?w=800"),
    ("Porsche", "https://images.unsplash.com/photo-1503376780353-7e6692767b70?w=800"),
    ("Tesla", "https://images.unsplash.com/photo-1560958089-b8a1929cea89?w=800"),
    ("Volvo", "https://images.unsplash.com/photo-1626668893632-6f3a4466d22f?w=800"),
];

/// First brand whose needle appears in the line, case-insensitively.
/// "VW" and "Volkswagen" both normalize to "Volkswagen".
pub fn detect_brand(line: &str) -> Option<&'static str> {
    let lower = line.to_lowercase();
    BRANDS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, canonical)| *canonical)
}

/// First model from the brand's vocabulary found in the line, else the
/// literal fallback.
pub fn detect_model(brand: &str, line: &str) -> String {
    let lower = line.to_lowercase();
    MODELS
        .iter()
        .find(|(b, _)| *b == brand)
        .and_then(|(_, models)| {
            models
                .iter()
                .find(|m| lower.contains(&m.to_lowercase()))
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| FALLBACK_MODEL.to_string())
}

/// Brand-specific stock photo, or the generic one.
pub fn default_image(brand: &str) -> &'static str {
    BRAND_IMAGES
        .iter()
        .find(|(b, _)| *b == brand)
        .map(|(_, url)| *url)
        .unwrap_or(GENERIC_IMAGE)
}
