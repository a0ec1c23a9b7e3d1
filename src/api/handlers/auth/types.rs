//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub redirect_to: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyRequest {
    pub code: String,
    #[serde(rename = "type")]
    pub verification_type: String,
    pub target: String,
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyResponse {
    pub redirect_to: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub username: String,
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
    #[serde(default)]
    pub redirect_to: Option<String>,
}

/// Returned by login and signup once a session cookie has been committed.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub user_id: String,
    pub redirect_to: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub username: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorEnrollResponse {
    pub secret: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub roles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn verify_request_uses_the_type_key() -> Result<()> {
        let request: VerifyRequest = serde_json::from_value(serde_json::json!({
            "code": "ABC234",
            "type": "onboarding",
            "target": "a@x.com"
        }))?;
        assert_eq!(request.verification_type, "onboarding");
        assert_eq!(request.redirect_to, None);

        let value = serde_json::to_value(&request)?;
        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .context("missing type key")?;
        assert_eq!(tag, "onboarding");
        Ok(())
    }

    #[test]
    fn login_request_defaults_remember_off() -> Result<()> {
        let request: LoginRequest = serde_json::from_value(serde_json::json!({
            "username": "newuser",
            "password": "Sup3rSecret!"
        }))?;
        assert!(!request.remember);
        Ok(())
    }

    #[test]
    fn session_response_round_trips() -> Result<()> {
        let response = SessionResponse {
            user_id: "id".to_string(),
            email: "a@x.com".to_string(),
            username: "newuser".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        let decoded: SessionResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.email, "a@x.com");
        Ok(())
    }
}
