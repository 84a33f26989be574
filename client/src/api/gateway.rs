use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use super::error::{classify, ErrorKind};
use super::types::{
    LogoutRequest, MessageResponse, RequestPasswordResetRequest, ResetPasswordRequest,
    SigninRequest, SigninResponse, SignupRequest, SignupResponse, UserProfile, VerifyEmailRequest,
};

/// Network seam of the session manager. Every method performs exactly one
/// attempt; retry policy belongs to the caller.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login(&self, request: &SigninRequest) -> Result<SigninResponse, ErrorKind>;

    /// Same as [`login`](Self::login) but instructs the backend to
    /// invalidate any other active session for the account first.
    async fn force_login(&self, request: &SigninRequest) -> Result<SigninResponse, ErrorKind>;

    async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse, ErrorKind>;

    /// Exchanges a stored bearer token for the current user profile.
    async fn fetch_current_session(&self, token: &str) -> Result<UserProfile, ErrorKind>;

    /// Cheap authenticated probe; `Ok` means the server still honors the
    /// token.
    async fn check_session(&self, token: &str) -> Result<(), ErrorKind>;

    async fn logout(&self, token: &str, session_id: &str) -> Result<(), ErrorKind>;

    async fn request_password_reset(&self, email: &str) -> Result<MessageResponse, ErrorKind>;

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageResponse, ErrorKind>;

    async fn verify_email(&self, email: &str, code: &str) -> Result<MessageResponse, ErrorKind>;
}

/// [`AuthGateway`] over the marketplace REST backend.
pub struct HttpAuthGateway {
    client: Client,
    base_url: String,
}

impl HttpAuthGateway {
    /// `base_url` carries any path prefix, e.g. `https://host/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(&self, request: &SigninRequest) -> Result<SigninResponse, ErrorKind> {
        let response = self
            .client
            .post(format!("{}/auth/signin", self.base_url))
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn force_login(&self, request: &SigninRequest) -> Result<SigninResponse, ErrorKind> {
        let response = self
            .client
            .post(format!("{}/auth/force-login", self.base_url))
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse, ErrorKind> {
        let response = self
            .client
            .post(format!("{}/auth/signup", self.base_url))
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn fetch_current_session(&self, token: &str) -> Result<UserProfile, ErrorKind> {
        let response = self
            .client
            .get(format!("{}/auth/me", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        read_json(response).await
    }

    async fn check_session(&self, token: &str) -> Result<(), ErrorKind> {
        let response = self
            .client
            .get(format!("{}/auth/session-check", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        read_empty(response).await
    }

    async fn logout(&self, token: &str, session_id: &str) -> Result<(), ErrorKind> {
        let request = LogoutRequest {
            session_id: session_id.to_string(),
        };
        let response = self
            .client
            .post(format!("{}/auth/logout", self.base_url))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;
        read_empty(response).await
    }

    async fn request_password_reset(&self, email: &str) -> Result<MessageResponse, ErrorKind> {
        let request = RequestPasswordResetRequest {
            email: email.to_string(),
        };
        let response = self
            .client
            .post(format!("{}/auth/forgot-password", self.base_url))
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageResponse, ErrorKind> {
        let request = ResetPasswordRequest {
            token: token.to_string(),
            new_password: new_password.to_string(),
        };
        let response = self
            .client
            .post(format!("{}/auth/reset-password", self.base_url))
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn verify_email(&self, email: &str, code: &str) -> Result<MessageResponse, ErrorKind> {
        let request = VerifyEmailRequest {
            email: email.to_string(),
            verification_code: code.to_string(),
        };
        let response = self
            .client
            .post(format!("{}/auth/verify-email", self.base_url))
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ErrorKind> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(read_error(response).await)
    }
}

async fn read_empty(response: Response) -> Result<(), ErrorKind> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(read_error(response).await)
    }
}

async fn read_error(response: Response) -> ErrorKind {
    let status = response.status().as_u16();
    // A plain-text or empty error body still classifies by status alone.
    let body = response.json().await.unwrap_or_default();
    classify(status, body)
}
