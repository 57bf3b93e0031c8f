//! Text normalization shared by the router and the workflow machines.
//!
//! Patients write in Spanish on a phone keyboard: accents come and go,
//! punctuation is optional and casing is random. Everything that matches
//! keywords works on the output of [`normalize`].

/// Lowercases, folds accents, drops punctuation and collapses whitespace.
///
/// Characters that carry meaning in dates, times, identifiers and emails
/// (`/ : @ . - + _`) are preserved.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_alphanumeric() || matches!(c, '/' | ':' | '@' | '.' | '-' | '+' | '_') {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    // a trailing period is punctuation, not part of a token
    while out.ends_with('.') {
        out.pop();
    }
    out
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        other => other,
    }
}

/// True when `phrase` (already normalized) occurs in `text` on word boundaries.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let padded = format!(" {} ", text);
    padded.contains(&format!(" {} ", phrase))
}

/// True when any phrase occurs in `text`.
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(text, p))
}

const QUESTION_OPENERS: &[&str] = &[
    "que", "cual", "cuales", "como", "donde", "cuando", "cuanto", "cuanta", "por que",
    "quien", "hay", "tienen", "aceptan", "atienden", "puedo", "se puede",
];

/// Heuristic for "the user is asking something" rather than answering.
pub fn is_question(raw: &str) -> bool {
    if raw.contains('?') || raw.contains('¿') {
        return true;
    }
    let text = normalize(raw);
    QUESTION_OPENERS
        .iter()
        .any(|opener| text == *opener || text.starts_with(&format!("{} ", opener)))
}

const AFFIRMATIVE: &[&str] = &[
    "si", "sip", "ok", "okay", "dale", "confirmo", "confirmar", "correcto", "claro",
    "de acuerdo", "perfecto", "listo", "yes", "bueno", "esta bien", "asi es",
];

const NEGATIVE: &[&str] = &[
    "no", "nop", "incorrecto", "negativo", "cambiar", "otra", "otro", "prefiero otra",
];

/// Short confirmations such as "sí", "dale", "ok".
pub fn is_affirmative(normalized: &str) -> bool {
    contains_any(normalized, AFFIRMATIVE) && !is_negative(normalized)
}

/// Short rejections such as "no", "cambiar", "otra".
pub fn is_negative(normalized: &str) -> bool {
    contains_any(normalized, NEGATIVE)
}

/// Parses a bare ordinal answer ("2", "la 3", "opcion 1") into a 1-based index.
pub fn ordinal(normalized: &str) -> Option<usize> {
    let tokens: Vec<&str> = normalized.split(' ').collect();
    let last = match tokens.as_slice() {
        [n] => *n,
        ["la" | "el" | "opcion" | "numero", n] => *n,
        _ => return None,
    };
    last.parse::<usize>().ok().filter(|n| (1..=10).contains(n))
}

/// Truncates to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_accents_and_case() {
        assert_eq!(normalize("Mañana en la TARDE, ¿sí?"), "manana en la tarde si");
    }

    #[test]
    fn normalize_keeps_dates_and_emails() {
        assert_eq!(normalize("el 20/10 a las 10:30"), "el 20/10 a las 10:30");
        assert_eq!(normalize("Ana.Perez@Mail.cl."), "ana.perez@mail.cl");
    }

    #[test]
    fn contains_phrase_respects_word_boundaries() {
        assert!(contains_phrase("quiero pagar ahora", "pagar"));
        assert!(!contains_phrase("pagaremos", "pagar"));
        assert!(contains_phrase("pedir hora", "pedir hora"));
    }

    #[test]
    fn question_detection() {
        assert!(is_question("¿Dónde están ubicados?"));
        assert!(is_question("cuanto cuesta la consulta"));
        assert!(!is_question("mañana en la tarde"));
    }

    #[test]
    fn affirmative_and_negative() {
        assert!(is_affirmative("si"));
        assert!(is_affirmative("dale perfecto"));
        assert!(!is_affirmative("no"));
        assert!(is_negative("no prefiero otra"));
    }

    #[test]
    fn ordinal_parsing() {
        assert_eq!(ordinal("2"), Some(2));
        assert_eq!(ordinal("la 3"), Some(3));
        assert_eq!(ordinal("opcion 1"), Some(1));
        assert_eq!(ordinal("0"), None);
        assert_eq!(ordinal("quiero la 2 o la 3"), None);
    }

    #[test]
    fn truncate_chars_respects_multibyte() {
        assert_eq!(truncate_chars("Consulta Pediátrica General", 20), "Consulta Pediátrica ");
        assert_eq!(truncate_chars("corto", 20), "corto");
    }
}
