//! Table formatting helpers for command output

/// Truncate to at most `max_bytes` without splitting a UTF-8 character.
pub fn truncate_utf8_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Fit a cell into `width` characters: pad short values, cut long ones with "…".
pub fn fit(s: &str, width: usize) -> String {
    let count = s.chars().count();
    if count <= width {
        return format!("{:<width$}", s, width = width);
    }
    if width == 0 {
        return String::new();
    }
    let cut: String = s.chars().take(width - 1).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_shorter_than_max() {
        assert_eq!(truncate_utf8_safe("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_at_utf8_boundary() {
        // 3 bytes per character
        let s = "日本語";
        assert_eq!(truncate_utf8_safe(s, 4), "日");
        assert_eq!(truncate_utf8_safe(s, 6), "日本");
        assert_eq!(truncate_utf8_safe(s, 2), "");
    }

    #[test]
    fn test_fit_pads_short_values() {
        assert_eq!(fit("ab", 4), "ab  ");
    }

    #[test]
    fn test_fit_cuts_long_values() {
        assert_eq!(fit("Passport renewal", 8), "Passpor…");
        assert_eq!(fit("Zoë Zürich", 4), "Zoë…");
        assert_eq!(fit("x", 0), "");
    }
}
