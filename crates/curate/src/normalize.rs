/// Canonicalize a raw entity name into a comparable key.
///
/// Lower-cases, trims, drops punctuation and collapses every run of
/// separators (whitespace, `-`, `_`) away entirely, so `"dLight 1.1"`,
/// `"dlight-1.1"` and `"DLIGHT11"` all become `"dlight11"`. Total and
/// idempotent: the output contains only lowercase alphanumerics.
pub fn normalize_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}
