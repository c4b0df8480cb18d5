use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::AuthUser;

/// Errors that can occur when verifying a caller
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Auth provider error: {0}")]
    Provider(String),

    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
}

/// Auth port: turns a bearer credential into a verified identity
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError>;
}

/// Pull the token out of an `Authorization: Bearer ...` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or_else(|| AuthError::InvalidToken("expected a Bearer credential".to_string()))?;

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// Verifies provider-issued HS256 JWTs locally
pub struct JwtAuth {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: &str, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl AuthProvider for JwtAuth {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(AuthUser {
            id: data.claims.sub,
            email: data.claims.email,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Asks the auth provider who owns a token
///
/// Calls `GET {base_url}/auth/v1/user` with the caller's token and the
/// project api key.
pub struct RemoteAuth {
    base_url: String,
    api_key: String,
    client: Client,
}

impl RemoteAuth {
    pub fn new(base_url: String, api_key: String) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl AuthProvider for RemoteAuth {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let url = format!("{}/auth/v1/user", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AuthError::InvalidToken("rejected by auth provider".to_string()));
            }
            status => {
                tracing::error!("Auth provider returned {}", status);
                return Err(AuthError::Provider(format!("unexpected status {}", status)));
            }
        }

        let user: ProviderUser = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("Failed to parse user: {}", e)))?;

        Ok(AuthUser {
            id: user.id,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        email: &'a str,
        aud: &'a str,
        exp: usize,
    }

    fn token(secret: &str, aud: &str) -> String {
        let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
        encode(
            &Header::new(Algorithm::HS256),
            &TestClaims { sub: "user-1", email: "a@example.com", aud, exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(matches!(bearer_token(None), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(Some("Bearer ")), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(Some("Basic abc")), Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn test_jwt_roundtrip() {
        let auth = JwtAuth::new("secret", Some("authenticated"));
        let user = auth.verify(&token("secret", "authenticated")).await.unwrap();
        assert_eq!(user.id, "user-1");
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn test_jwt_wrong_secret() {
        let auth = JwtAuth::new("secret", None);
        let err = auth.verify(&token("other", "authenticated")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_jwt_wrong_audience() {
        let auth = JwtAuth::new("secret", Some("service_role"));
        let err = auth.verify(&token("secret", "authenticated")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_remote_auth_accepts_known_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .match_header("authorization", "Bearer good-token")
            .match_header("apikey", "anon-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"user-9","email":"shop@example.com","role":"authenticated"}"#)
            .create_async()
            .await;

        let auth = RemoteAuth::new(server.url(), "anon-key".to_string()).unwrap();
        let user = auth.verify("good-token").await.unwrap();

        assert_eq!(user.id, "user-9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remote_auth_rejects_unknown_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .create_async()
            .await;

        let auth = RemoteAuth::new(server.url(), "anon-key".to_string()).unwrap();
        let err = auth.verify("bad-token").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_remote_auth_provider_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .with_status(500)
            .create_async()
            .await;

        let auth = RemoteAuth::new(server.url(), "anon-key".to_string()).unwrap();
        let err = auth.verify("any").await.unwrap_err();
        assert!(matches!(err, AuthError::Provider(_)));
    }
}
