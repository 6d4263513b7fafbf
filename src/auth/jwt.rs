use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}


#[cfg(test)]
mod tests {
    use super::testing::token;
    use super::*;

    #[test]
    fn verifies_tokens_signed_with_the_same_secret() {
        let t = token(7, 3, Some(42), TokenType::Access, "secret");
        let claims = verify_token(&t, "secret").unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.employee_id, Some(42));
        assert_eq!(claims.token_type, TokenType::Access);

        assert!(verify_token(&t, "other").is_err());
    }
}
