use unicode_normalization::UnicodeNormalization;

/// Lower-cases, strips combining diacritical marks (NFD decomposition then
/// drop combining-class codepoints), and collapses runs of whitespace to a
/// single space. All keyword and organism-name comparisons go through this
/// so "Región" and "region" compare equal.
pub fn normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let decomposed: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    collapse_whitespace(&decomposed)
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F)
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics() {
        assert_eq!(normalize("Región"), "region");
        assert_eq!(normalize("NIÑO"), "nino");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("  hola   mundo  "), "hola mundo");
    }

    #[test]
    fn lowercases() {
        assert_eq!(normalize("SEGUNDO LLAMADO"), "segundo llamado");
    }
}
