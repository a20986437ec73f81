//! Input validation for network symbols and free-text fields
//!
//! Symbols are wrapped in a newtype with a private field so a value that made
//! it past `new()` is known to be well formed everywhere else.

use std::fmt;

use crate::error::WalletError;

const SYMBOL_MAX_LEN: usize = 32;
const MESSAGE_MAX_LEN: usize = 255;

/// Validated network symbol: `^[A-Z0-9_]{1,32}$`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkSymbol(String);

impl NetworkSymbol {
    /// # Examples
    /// ```
    /// use wallet_io::validation::NetworkSymbol;
    ///
    /// assert_eq!(NetworkSymbol::new("BSC_BEP20").unwrap().as_str(), "BSC_BEP20");
    /// assert!(NetworkSymbol::new("eth").is_err());
    /// ```
    pub fn new(symbol: &str) -> Result<Self, WalletError> {
        if symbol.is_empty() || symbol.len() > SYMBOL_MAX_LEN {
            return Err(WalletError::validation(
                "network",
                format!("length must be 1-{} characters", SYMBOL_MAX_LEN),
            ));
        }

        if !symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(WalletError::validation(
                "network",
                format!(
                    "'{}' may contain uppercase letters, numbers and underscore only",
                    symbol
                ),
            ));
        }

        Ok(Self(symbol.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NetworkSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[inline]
fn is_message_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            ' ' | '_'
                | ','
                | '@'
                | '#'
                | '%'
                | '.'
                | '\\'
                | '/'
                | '+'
                | '?'
                | '['
                | ']'
                | '$'
                | '('
                | ')'
                | '='
                | '!'
                | ':'
                | '-'
        )
}

/// Transfer message: 1-255 characters from a restricted printable set.
pub fn validate_transfer_message(message: &str) -> Result<(), WalletError> {
    let len = message.chars().count();
    if len == 0 || len > MESSAGE_MAX_LEN {
        return Err(WalletError::validation(
            "message",
            format!("length must be 1-{} characters", MESSAGE_MAX_LEN),
        ));
    }
    if !message.chars().all(is_message_char) {
        return Err(WalletError::validation(
            "message",
            "contains unsupported characters",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_symbol_valid() {
        for s in ["BTC", "ETH", "BSC_BEP20", "A", "X".repeat(32).as_str()] {
            assert!(NetworkSymbol::new(s).is_ok(), "{} should be valid", s);
        }
    }

    #[test]
    fn test_network_symbol_invalid() {
        let too_long = "X".repeat(33);
        for s in ["", "eth", "BSC-BEP20", "BTC ", too_long.as_str(), "ÉTH"] {
            let err = NetworkSymbol::new(s).unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR", "{:?} should be rejected", s);
        }
    }

    #[test]
    fn test_message_accepts_allowed_set() {
        assert!(validate_transfer_message("Rent for March (flat #4) = $100!").is_ok());
        assert!(validate_transfer_message("a/b\\c+d?[e]:f-g_h,i@j%k.").is_ok());
    }

    #[test]
    fn test_message_rejects() {
        assert!(validate_transfer_message("").is_err());
        assert!(validate_transfer_message("line\nbreak").is_err());
        assert!(validate_transfer_message("<script>").is_err());
        assert!(validate_transfer_message("quote\"").is_err());
        assert!(validate_transfer_message(&"a".repeat(256)).is_err());
        assert!(validate_transfer_message(&"a".repeat(255)).is_ok());
    }
}
