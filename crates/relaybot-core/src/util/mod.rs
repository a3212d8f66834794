pub mod http;

/// Milliseconds since the Unix epoch, as used by request signatures.
pub fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`.
pub fn local_time() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Convert a string to a safe filename.
pub fn safe_filename(name: &str) -> String {
    const UNSAFE: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    let mut result = name.to_string();
    for &c in UNSAFE {
        result = result.replace(c, "_");
    }
    result.trim().to_string()
}

/// Truncate a string to max length, adding suffix if truncated.
pub fn truncate_string(s: &str, max_len: usize, suffix: &str) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(suffix.len());
    // Ensure we don't split a multi-byte UTF-8 character
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], suffix)
}

/// Escape text for inclusion in an HTML document.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("hello"), "hello");
        assert_eq!(safe_filename("file<name>"), "file_name_");
        assert_eq!(safe_filename("Q3 report: sales/costs"), "Q3 report_ sales_costs");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10, "..."), "hello");
        assert_eq!(truncate_string("hello world", 8, "..."), "hello...");
        assert_eq!(truncate_string("ab", 2, "..."), "ab");
    }

    #[test]
    fn test_truncate_string_multibyte() {
        // Each CJK char is 3 bytes; cutting must land on a char boundary
        let s = "天气很好天气很好";
        let out = truncate_string(s, 10, "...");
        assert!(out.ends_with("..."));
        assert!(out.len() <= 10);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_local_time_format() {
        let t = local_time();
        assert_eq!(t.len(), 19);
        assert_eq!(t.chars().nth(4), Some('-'));
        assert_eq!(t.chars().nth(13), Some(':'));
    }

    #[test]
    fn test_timestamp_millis_is_recent() {
        // 2020-01-01 in ms
        assert!(timestamp_millis() > 1_577_836_800_000);
    }
}
