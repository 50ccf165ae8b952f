use rand::Rng;
use rand::distributions::Alphanumeric;

/// Prefix shared by wallet addresses and API keys.
pub const TOKEN_PREFIX: &str = "ora_";

/// `ora_` followed by `len` random ASCII letters and digits.
pub(crate) fn prefixed_token(len: usize) -> String {
    let body: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    format!("{}{}", TOKEN_PREFIX, body)
}

/// Returns true if `token` is `ora_` followed by exactly `len` letters and digits.
pub(crate) fn is_prefixed_token(token: &str, len: usize) -> bool {
    token
        .strip_prefix(TOKEN_PREFIX)
        .is_some_and(|body| body.len() == len && body.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_token_shape() {
        let token = prefixed_token(12);
        assert!(token.starts_with("ora_"));
        assert_eq!(token.len(), 16);
        assert!(is_prefixed_token(&token, 12));
    }

    #[test]
    fn test_tokens_differ() {
        assert_ne!(prefixed_token(28), prefixed_token(28));
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        assert!(!is_prefixed_token("abc_123", 3));
        assert!(!is_prefixed_token("ora_12", 3));
        assert!(!is_prefixed_token("ora_1-3", 3));
    }
}
