//! Free-text helpers shared by the resolvers: normalization, city-name
//! extraction and the meeting fields read from a calendar title.

use crate::model::{EditionType, TimingType};
use chrono::NaiveDate;

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ä' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Lowercase ASCII letters and digits only: `"Reggio nell'Emilia"` → `"reggionellemilia"`.
pub fn normalize(text: &str) -> String {
    text.to_lowercase().chars().map(fold_accent).filter(char::is_ascii_alphanumeric).collect()
}

pub fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn strip_parentheticals(text: &str) -> String {
    collapse_spaces(&regex!(r"\([^)]*\)|\[[^\]]*\]").replace_all(text, " "))
}

pub fn title_case(text: &str) -> String {
    collapse_spaces(text)
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn is_address_word(word: &str) -> bool {
    regex!(r"(?i)^(?:via|viale|v\.le|piazza|p\.zza|piazzale|corso|c\.so|largo|vicolo|strada|str\.|localit[aà]|loc\.|frazione|fraz\.)$")
        .is_match(word.trim())
}

fn is_pool_segment(segment: &str) -> bool {
    regex!(r"(?i)^(?:piscin[ae]|vasca|impianto|centro\s+(?:natatorio|sportivo)|stadio|polo\s+natatorio|palazzetto)\b")
        .is_match(segment)
}

fn is_org_segment(segment: &str) -> bool {
    regex!(r"(?i)\b(?:a\.?s\.?d\b|s\.?s\.?d\b|societ[aà]|polisportiva|nuoto|swim|team\b|club\b|tel\b|fax\b|e-?mail|www\.|https?:)")
        .is_match(segment)
}

/// Most plausible city name inside a free-text place description.
///
/// Segments (split on commas, semicolons and spaced dashes) that describe the
/// pool, an address, an organization or a phone number are dropped; the first
/// remaining segment wins. When every segment is pool text, a trailing
/// `di <Name>` is used instead (`"Piscina Comunale di Modena"` → `"Modena"`).
pub fn city_name_candidate(text: &str) -> String {
    let text = strip_parentheticals(text);
    let text = regex!(r"\b\d{5}\b").replace_all(&text, " ");
    let segments: Vec<&str> =
        regex!(r"\s*(?:[,;\n]|\s[-–]\s)\s*").split(&text).map(str::trim).filter(|s| !s.is_empty()).collect();

    let clean = segments.iter().find(|segment| {
        let first = segment.split_whitespace().next().unwrap_or_default();
        !is_pool_segment(segment)
            && !is_address_word(first)
            && !is_org_segment(segment)
            && !segment.chars().any(|c| c.is_ascii_digit())
    });
    if let Some(segment) = clean {
        let segment = regex!(r"(?i)^(?:di|a|presso|in)\s+").replace(segment, "");
        return collapse_spaces(&segment);
    }

    segments
        .iter()
        .filter(|s| is_pool_segment(s))
        .find_map(|s| regex!(r"\b(?:di|a)\s+(\p{Lu}[\w']*(?:\s+\p{Lu}[\w']*)*)\s*$").captures(s))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

// --- Calendar titles ---------------------------------------------------------

const GENERIC_TITLE_WORDS: &[&str] = &[
    "trofeo", "meeting", "memorial", "citta", "della", "delle", "degli", "campionato", "campionati", "master", "masters",
    "nuoto", "gara", "regionale", "regionali", "invernale", "invernali", "estivo", "estivi", "edizione", "coppa",
    "torneo", "manifestazione", "vasca", "corta", "lunga", "italiano", "italiani", "nazionale",
];

fn significant_words(title: &str) -> impl Iterator<Item = String> {
    let words: Vec<String> =
        strip_edition(title).split(|c: char| !c.is_alphanumeric() && c != '\'').map(normalize).collect();
    words.into_iter().filter(|w| w.len() >= 4 && !w.chars().all(|c| c.is_ascii_digit()))
}

/// First distinctive word of a title, used as a partial meeting-code match.
pub fn title_code_token(title: &str) -> Option<String> {
    significant_words(title).find(|w| !GENERIC_TITLE_WORDS.contains(&w.as_str()))
}

/// First non-generic word of a title long enough to discriminate descriptions.
pub fn description_token(title: &str) -> Option<String> {
    significant_words(title).find(|w| w.len() >= 5 && !GENERIC_TITLE_WORDS.contains(&w.as_str()))
}

pub fn is_regional(title: &str) -> bool {
    regex!(r"(?i)\bregional").is_match(title)
}

fn strip_edition(title: &str) -> String {
    regex!(r"^\s*(?:\d{1,3}\s*[°^ªº]|[IVXLC]+\s)\s*").replace(title, "").to_string()
}

pub fn roman_to_int(numeral: &str) -> Option<u32> {
    let mut total = 0;
    let mut previous = 0;
    for c in numeral.chars().rev() {
        let value = match c.to_ascii_uppercase() {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            'L' => 50,
            'C' => 100,
            _ => return None,
        };
        if value < previous {
            total -= value;
        } else {
            total += value;
            previous = value;
        }
    }
    (total > 0).then_some(total)
}

/// Edition number and its notation, read from the title prefix or a year in the title.
pub fn edition_from_title(title: &str) -> (u32, EditionType) {
    if let Some(caps) = regex!(r"^\s*(\d{1,3})\s*[°^ªº]").captures(title) {
        if let Ok(n) = caps[1].parse() {
            return (n, EditionType::Ordinal);
        }
    }
    if let Some(caps) = regex!(r"^\s*([IVXLC]+)\s").captures(title) {
        if let Some(n) = roman_to_int(&caps[1]) {
            return (n, EditionType::Roman);
        }
    }
    if let Some(caps) = regex!(r"\b((?:19|20)\d{2})\b").captures(title) {
        if let Ok(year) = caps[1].parse() {
            return (year, EditionType::Yearly);
        }
    }
    (0, EditionType::None)
}

/// `scadenza iscrizioni ... 12/02/2024` and similar phrasings.
pub fn entry_deadline(text: &str) -> Option<NaiveDate> {
    let caps = regex!(
        r"(?is)(?:scadenza|chiusura|termine)\s+(?:delle\s+)?iscrizioni\D{0,40}?(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{2,4})"
    )
    .captures(text)?;
    let day = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let mut year: i32 = caps[3].parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn timing_from_text(text: &str) -> Option<TimingType> {
    let caps = regex!(r"(?i)cronometraggio\s+(manuale|semi-?automatico|automatico)").captures(text)?;
    let kind = caps[1].to_lowercase();
    Some(if kind.starts_with("semi") {
        TimingType::SemiAutomatic
    } else if kind == "manuale" {
        TimingType::Manual
    } else {
        TimingType::Automatic
    })
}
