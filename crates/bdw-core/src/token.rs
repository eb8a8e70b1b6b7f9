use std::fmt;

use uuid::Uuid;

use crate::error::GatewayError;

/// Opaque credential shared between the host and the worker at launch.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

#[derive(Debug, Clone)]
pub struct TokenGuard {
    expected: Token,
}

impl TokenGuard {
    pub fn new(expected: Token) -> Self {
        Self { expected }
    }

    /// Fails with `AccessDenied` unless `presented` equals the launch token.
    pub fn validate(&self, presented: &str) -> Result<(), GatewayError> {
        let expected = self.expected.as_str();
        if expected.is_empty() || !constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
            return Err(GatewayError::AccessDenied);
        }
        Ok(())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_the_launch_token() {
        let guard = TokenGuard::new(Token::new("s3cret"));
        assert!(guard.validate("s3cret").is_ok());
        assert_eq!(guard.validate("s3cre"), Err(GatewayError::AccessDenied));
        assert_eq!(guard.validate("s3cret "), Err(GatewayError::AccessDenied));
        assert_eq!(guard.validate(""), Err(GatewayError::AccessDenied));
    }

    #[test]
    fn empty_launch_token_denies_everything() {
        let guard = TokenGuard::new(Token::new(""));
        assert_eq!(guard.validate(""), Err(GatewayError::AccessDenied));
    }

    #[test]
    fn debug_output_hides_the_value() {
        let token = Token::generate();
        assert_eq!(format!("{token:?}"), "Token(***)");
        assert_eq!(token.as_str().len(), 32);
    }
}
