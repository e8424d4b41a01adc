//! Input cleanup for user-supplied names and descriptions.

use std::sync::LazyLock;

use regex::Regex;

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9 _\-]").expect("name regex is valid"));

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1F\x7F]").expect("control regex is valid"));

/// Keeps only letters, digits, spaces, underscores and dashes.
///
/// Used for project, client, task, block and template names.
pub fn sanitize_name(input: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(input, "").into_owned()
}

/// Flattens line breaks to spaces and strips remaining control characters.
pub fn sanitize_description(input: &str) -> String {
    let flattened = input.replace(['\n', '\r'], " ");
    CONTROL_CHARS.replace_all(&flattened, "").into_owned()
}

/// Returns true when the value has non-whitespace content.
pub fn is_present(input: &str) -> bool {
    !input.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_strips_punctuation() {
        assert_eq!(sanitize_name("Acme Corp!"), "Acme Corp");
        assert_eq!(sanitize_name("api-v2_work"), "api-v2_work");
        assert_eq!(sanitize_name("<script>x</script>"), "scriptxscript");
    }

    #[test]
    fn sanitize_description_flattens_lines() {
        assert_eq!(
            sanitize_description("Fixed bug\nin parser\r\n"),
            "Fixed bug in parser  "
        );
        assert_eq!(sanitize_description("tab\there\u{7f}"), "tabhere");
        assert_eq!(sanitize_description("Reviewed PR #42: ok"), "Reviewed PR #42: ok");
    }

    #[test]
    fn is_present_rejects_blank() {
        assert!(is_present(" a "));
        assert!(!is_present("   "));
        assert!(!is_present(""));
    }
}
