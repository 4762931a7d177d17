//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Close
//! enough for budgeting against BPE tokenizers on English text when the
//! provider does not report usage.

use ragent_core::message::Turn;

/// Per-message overhead for role names and delimiters in the wire format.
pub const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4)
}

/// Estimate tokens for a turn as it will be sent to the provider.
pub fn estimate_turn_tokens(turn: &Turn) -> usize {
    MESSAGE_OVERHEAD + estimate_tokens(turn.wire_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn turn_uses_wire_text() {
        let turn = Turn::thought("ab").with_rendered("<Thought>ab</Thought>");
        // 21 chars → 6 tokens + 4 overhead
        assert_eq!(estimate_turn_tokens(&turn), 10);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 4 characters, 8 bytes
        assert_eq!(estimate_tokens("éèêë"), 1);
    }
}
