//! Month-name lookup covering every language seen on real servers, plus
//! the month-name+number hybrids some of them emit.

use std::collections::HashMap;
use std::sync::OnceLock;

#[rustfmt::skip]
const NAMES: &[(&str, u32)] = &[
    // English
    ("jan", 1), ("feb", 2), ("mar", 3), ("apr", 4), ("may", 5), ("jun", 6),
    ("june", 6), ("jul", 7), ("july", 7), ("aug", 8), ("sep", 9), ("sept", 9),
    ("oct", 10), ("nov", 11), ("dec", 12),
    // German
    ("mrz", 3), ("mär", 3), ("märz", 3), ("mai", 5), ("juni", 6), ("juli", 7),
    ("okt", 10), ("dez", 12),
    // Austrian
    ("jän", 1),
    // French
    ("janv", 1), ("féb", 1), ("fév", 2), ("fev", 2), ("févr", 2), ("fevr", 2),
    ("mars", 3), ("mrs", 3), ("avr", 4), ("avril", 4), ("juin", 6), ("juil", 7),
    ("jui", 7), ("aoû", 8), ("août", 8), ("aout", 8), ("déc", 12),
    // Italian
    ("gen", 1), ("mag", 5), ("giu", 6), ("lug", 7), ("ago", 8), ("set", 9),
    ("ott", 10), ("dic", 12),
    // Spanish
    ("ene", 1), ("fbro", 2), ("mzo", 3), ("ab", 4), ("abr", 4), ("agto", 8),
    ("sbre", 9), ("obre", 9), ("nbre", 9), ("dbre", 9),
    // Polish
    ("sty", 1), ("lut", 2), ("kwi", 4), ("maj", 5), ("cze", 6), ("lip", 7),
    ("sie", 8), ("wrz", 9), ("paz", 10), ("paź", 10), ("lis", 11), ("gru", 12),
    // Russian (KOI/1251 renderings arrive already decoded)
    ("янв", 1), ("фев", 2), ("мар", 3), ("апр", 4), ("май", 5), ("июн", 6),
    ("июл", 7), ("авг", 8), ("сен", 9), ("окт", 10), ("ноя", 11), ("дек", 12),
    // Dutch
    ("mrt", 3), ("mei", 5),
    // Portuguese
    ("out", 10),
    // Finnish
    ("tammi", 1), ("helmi", 2), ("maalis", 3), ("huhti", 4), ("touko", 5),
    ("kesä", 6), ("heinä", 7), ("elo", 8), ("syys", 9), ("loka", 10),
    ("marras", 11), ("joulu", 12),
    // Slovenian
    ("avg", 8),
    // Icelandic
    ("maí", 5), ("jún", 6), ("júl", 7), ("ág", 8), ("nóv", 11), ("des", 12),
    // Lithuanian
    ("sau", 1), ("vas", 2), ("kov", 3), ("bal", 4), ("geg", 5), ("bir", 6),
    ("lie", 7), ("rgp", 8), ("rgs", 9), ("spa", 10), ("lap", 11), ("grd", 12),
    // Hungarian
    ("szept", 9),
];

fn table() -> &'static HashMap<String, u32> {
    static TABLE: OnceLock<HashMap<String, u32>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut map = HashMap::new();
        for &(name, month) in NAMES {
            map.insert(name.to_owned(), month);
        }
        // Name+number combos: the numeric part may be zero- or one-based
        // depending on how the server counts.
        let mut combos = Vec::new();
        for (name, &month) in &map {
            for value in [month, month.wrapping_sub(1)] {
                combos.push((format!("{name}{value:02}"), month));
                combos.push((format!("{name}{}", value % 10), month));
            }
        }
        map.extend(combos);
        for month in 1..=12u32 {
            map.insert(month.to_string(), month);
            map.insert(format!("{month:02}"), month);
        }
        map
    })
}

/// Resolves a month column to 1..=12. Accepts names in any known
/// language, bare numbers, and name+number hybrids; trailing dots and
/// commas are ignored.
#[must_use]
pub(crate) fn month_from_name(name: &str) -> Option<u32> {
    let trimmed = name.trim_end_matches(['.', ',']);
    if trimmed.is_empty() {
        return None;
    }
    table().get(&trimmed.to_lowercase()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_and_numeric_months_resolve() {
        assert_eq!(month_from_name("Jan"), Some(1));
        assert_eq!(month_from_name("dec."), Some(12));
        assert_eq!(month_from_name("09"), Some(9));
        assert_eq!(month_from_name("7"), Some(7));
    }

    #[test]
    fn localised_months_resolve() {
        assert_eq!(month_from_name("okt"), Some(10));
        assert_eq!(month_from_name("janv"), Some(1));
        assert_eq!(month_from_name("touko"), Some(5));
        assert_eq!(month_from_name("авг"), Some(8));
    }

    #[test]
    fn hybrid_month_number_combos_resolve() {
        assert_eq!(month_from_name("jan01"), Some(1));
        assert_eq!(month_from_name("jan0"), Some(1));
        assert_eq!(month_from_name("dec12"), Some(12));
    }

    #[test]
    fn garbage_is_rejected(){
        assert_eq!(month_from_name("notamonth"), None);
        assert_eq!(month_from_name(""), None);
        assert_eq!(month_from_name("13"), None);
    }
}
