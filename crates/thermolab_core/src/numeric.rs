//! Conversão numérica independente de locale.
//!
//! O firmware imprime valores com `Serial.print`, então o texto pode ter
//! `nan`, `inf` ou lixo colado no número. [`parse_prefix`] aceita o maior
//! prefixo numérico válido (como `strtof` do C); [`parse_exact`] exige que o
//! texto inteiro seja um número.

/// Converte o maior prefixo numérico de `text`.
///
/// Espaços iniciais são ignorados, assim como qualquer texto após o prefixo.
/// Retorna `None` quando nenhuma conversão é possível.
pub fn parse_prefix(text: &str) -> Option<f32> {
    let text = text.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let len = prefix_len(text.as_bytes());
    if len == 0 {
        return None;
    }
    text[..len].parse::<f32>().ok()
}

/// Converte `text` inteiro (ignorando espaços nas pontas).
pub fn parse_exact(text: &str) -> Option<f32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f32>().ok()
}

/// Comprimento do maior prefixo numérico, 0 se não houver.
fn prefix_len(bytes: &[u8]) -> usize {
    let mut pos = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        pos = 1;
    }

    let rest = &bytes[pos..];
    for token in ["infinity", "inf", "nan"] {
        if starts_with_ignore_case(rest, token.as_bytes()) {
            return pos + token.len();
        }
    }

    let int_digits = count_digits(&bytes[pos..]);
    pos += int_digits;

    let mut frac_digits = 0;
    if bytes.get(pos) == Some(&b'.') {
        frac_digits = count_digits(&bytes[pos + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            pos += 1 + frac_digits;
        }
    }

    if int_digits == 0 && frac_digits == 0 {
        return 0;
    }

    // Expoente só conta se tiver dígitos
    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        let mut exp = pos + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = count_digits(&bytes[exp.min(bytes.len())..]);
        if exp_digits > 0 {
            pos = exp + exp_digits;
        }
    }

    pos
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn starts_with_ignore_case(bytes: &[u8], token: &[u8]) -> bool {
    bytes.len() >= token.len() && bytes[..token.len()].eq_ignore_ascii_case(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_decimals() {
        assert_eq!(parse_prefix("42"), Some(42.0));
        assert_eq!(parse_prefix("-3.5"), Some(-3.5));
        assert_eq!(parse_prefix("+.25"), Some(0.25));
        assert_eq!(parse_prefix("7."), Some(7.0));
        assert_eq!(parse_prefix("1.5e2"), Some(150.0));
    }

    #[test]
    fn prefix_ignores_trailing_text() {
        assert_eq!(parse_prefix("  12.5abc"), Some(12.5));
        assert_eq!(parse_prefix("3e"), Some(3.0));
        assert_eq!(parse_prefix("3e+x"), Some(3.0));
        assert_eq!(parse_prefix("98.6\r"), Some(98.6));
    }

    #[test]
    fn special_tokens() {
        assert!(parse_prefix("nan").unwrap().is_nan());
        assert!(parse_prefix("NaN").unwrap().is_nan());
        assert_eq!(parse_prefix("inf"), Some(f32::INFINITY));
        assert_eq!(parse_prefix("-Infinity"), Some(f32::NEG_INFINITY));
        assert_eq!(parse_prefix("INFx"), Some(f32::INFINITY));
    }

    #[test]
    fn nothing_to_convert() {
        assert_eq!(parse_prefix(""), None);
        assert_eq!(parse_prefix("   "), None);
        assert_eq!(parse_prefix("abc"), None);
        assert_eq!(parse_prefix("-"), None);
        assert_eq!(parse_prefix("."), None);
        assert_eq!(parse_prefix("\u{fffd}12"), None);
    }

    #[test]
    fn exact_requires_whole_text() {
        assert_eq!(parse_exact(" 55 "), Some(55.0));
        assert_eq!(parse_exact("55abc"), None);
        assert_eq!(parse_exact(""), None);
        assert!(parse_exact("nan").unwrap().is_nan());
    }
}
