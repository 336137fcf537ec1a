//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: release automation branches
//! on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                              |
//! |---------|-----------|------------------------------------------|
//! | 0       | Universal | Success (release gate GO)                |
//! | 1       | Universal | General error (unspecified)              |
//! | 2       | Universal | CLI usage error (bad args)               |
//! | 60-69   | curate    | Curation run outcomes                    |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed, release gate GO.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Curate (60-69)
// =============================================================================

/// Run completed but the release gate returned NO-GO.
/// The full result (including failing thresholds) was still emitted.
pub const EXIT_CURATE_NO_GO: u8 = 60;

/// Policy file failed to parse or validate (bad TOML, alias conflict,
/// malformed no-merge pair, threshold out of range, unknown no-merge name).
pub const EXIT_CURATE_INVALID_POLICY: u8 = 61;

/// Runtime failure: unreadable file, CSV framing error, missing required
/// column, unwritable output.
pub const EXIT_CURATE_RUNTIME: u8 = 62;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_CURATE_NO_GO,
            EXIT_CURATE_INVALID_POLICY,
            EXIT_CURATE_RUNTIME,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
