/// Token estimation for French/English mixed content.
/// Deterministic grapheme-based approximation so that budget math is
/// reproducible across restarts and backends.
use unicode_segmentation::UnicodeSegmentation;

/// Default divisor: one token per ~4 visible characters.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Estimate tokens from text as grapheme count / chars_per_token, rounded up.
/// Non-empty text always costs at least one token.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    if text.is_empty() {
        return 0;
    }

    let divisor = chars_per_token.max(1);
    let graphemes = text.graphemes(true).count();

    graphemes.div_ceil(divisor).max(1)
}

/// Check if adding text would push the running total past a limit.
pub fn would_exceed_limit(
    current_tokens: usize,
    new_text: &str,
    chars_per_token: usize,
    max_tokens: usize,
) -> bool {
    current_tokens + estimate_tokens(new_text, chars_per_token) > max_tokens
}
