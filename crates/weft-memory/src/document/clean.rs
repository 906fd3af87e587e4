/// Strip NUL, BOM and control characters (keeping `\n`, `\r`, `\t`), then trim.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|&c| c != '\u{feff}' && (!c.is_control() || matches!(c, '\n' | '\r' | '\t')))
        .collect::<String>()
        .trim()
        .to_owned()
}

/// BLAKE3 hex digest used for de-duplication.
#[must_use]
pub fn checksum(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_nul_bom_and_controls() {
        let dirty = "\u{feff}  hello\u{0}\u{7} world\r\n\tindent\u{1b}  ";
        assert_eq!(clean_text(dirty), "hello world\r\n\tindent");
    }

    #[test]
    fn whitespace_only_cleans_to_empty() {
        assert_eq!(clean_text(" \u{0}\n "), "");
    }

    #[test]
    fn checksum_is_stable_and_content_sensitive() {
        assert_eq!(checksum("abc"), checksum("abc"));
        assert_ne!(checksum("abc"), checksum("abd"));
        assert_eq!(checksum("").len(), 64);
    }
}
