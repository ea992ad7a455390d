/// Functional words that carry no diagnostic signal.
pub const STOPWORDS: [&str; 7] = ["입니다", "있습니다", "했습니다", "됩니다", "것", "수", "등"];

/// Plant-anatomy and damage terms. Tokens containing any of these are moved to
/// the front of a processed query.
pub const SYMPTOM_KEYWORDS: [&str; 14] = [
    "잎", "줄기", "뿌리", "꽃", "열매", "시들", "썩", "반점", "갈변", "황화", "위축", "곰팡이",
    "벌레", "구멍",
];

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Turns a free-text symptom description into a search-ready query.
///
/// Punctuation and symbols become spaces, whitespace collapses, stopwords are
/// dropped and symptom-bearing tokens are placed first (each group keeps its
/// original order). Empty input gives an empty string.
pub fn normalize_query(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .map(|ch| if is_query_char(ch) { ch } else { ' ' })
        .collect();

    let (symptom_tokens, other_tokens): (Vec<&str>, Vec<&str>) = stripped
        .split_whitespace()
        .filter(|token| !STOPWORDS.contains(token))
        .partition(|token| is_symptom_token(token));

    symptom_tokens
        .into_iter()
        .chain(other_tokens)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_symptom_token(token: &str) -> bool {
    SYMPTOM_KEYWORDS.iter().any(|keyword| token.contains(keyword))
}

fn is_query_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch.is_whitespace() || ('\u{AC00}'..='\u{D7A3}').contains(&ch)
}

/// Cleans a text field returned by the disease catalog: unit glyphs are
/// mapped to ASCII, `<br>` tags and line breaks become spaces.
pub fn clean_catalog_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let replaced = text
        .replace('～', "~")
        .replace('㎜', "mm")
        .replace("<br/>", " ")
        .replace("<br>", " ")
        .replace(['\n', '\r'], " ");

    normalize_whitespace(&replaced).trim().to_string()
}
