//! Identification of the local user calling the client-facing endpoints.

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use uma_types::address::UMA_ADDRESS_PREFIX;

/// A user of this VASP, on whose behalf payments are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub uma_user_name: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl LocalUser {
    /// `$user@domain` of this user at the given VASP domain.
    pub fn uma_address(&self, vasp_domain: &str) -> String {
        let user_name = self
            .uma_user_name
            .strip_prefix(UMA_ADDRESS_PREFIX)
            .unwrap_or(&self.uma_user_name);
        format!("{UMA_ADDRESS_PREFIX}{user_name}@{vasp_domain}")
    }
}

#[async_trait]
pub trait UserService: Send + Sync {
    /// The authenticated caller, or `None` when the request is not authorized.
    async fn calling_user(&self, headers: &HeaderMap) -> Option<LocalUser>;

    /// The user that counterparty-initiated messages are addressed to.
    fn account_holder(&self) -> LocalUser;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Parses an `Authorization: Basic ...` header.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, encoded) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Serves the single user from the config file.
///
/// When credentials are configured, callers must present them with HTTP Basic auth.
#[derive(Debug, Clone)]
pub struct ConfiguredUserService {
    user: LocalUser,
    credentials: Option<BasicCredentials>,
}

impl ConfiguredUserService {
    pub fn new(user: LocalUser, credentials: Option<BasicCredentials>) -> Self {
        Self { user, credentials }
    }
}

#[async_trait]
impl UserService for ConfiguredUserService {
    async fn calling_user(&self, headers: &HeaderMap) -> Option<LocalUser> {
        match &self.credentials {
            None => Some(self.user.clone()),
            Some(expected) => {
                let presented = BasicCredentials::from_headers(headers)?;
                (presented == *expected).then(|| self.user.clone())
            }
        }
    }

    fn account_holder(&self) -> LocalUser {
        self.user.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn alice() -> LocalUser {
        LocalUser {
            uma_user_name: "alice".to_string(),
            name: Some("Alice".to_string()),
            email: None,
        }
    }

    fn basic(credentials: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(credentials));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn uma_address_has_single_prefix() {
        assert_eq!(alice().uma_address("vasp1.example"), "$alice@vasp1.example");
        let prefixed = LocalUser {
            uma_user_name: "$alice".to_string(),
            ..alice()
        };
        assert_eq!(prefixed.uma_address("vasp1.example"), "$alice@vasp1.example");
    }

    #[tokio::test]
    async fn open_service_accepts_everyone() {
        let service = ConfiguredUserService::new(alice(), None);
        assert_eq!(service.calling_user(&HeaderMap::new()).await, Some(alice()));
    }

    #[tokio::test]
    async fn basic_auth_is_enforced() {
        let service = ConfiguredUserService::new(
            alice(),
            Some(BasicCredentials {
                username: "alice".to_string(),
                password: "pa:ss".to_string(),
            }),
        );
        assert_eq!(service.calling_user(&basic("alice:pa:ss")).await, Some(alice()));
        assert_eq!(service.calling_user(&basic("alice:wrong")).await, None);
        assert_eq!(service.calling_user(&HeaderMap::new()).await, None);
        assert_eq!(service.account_holder(), alice());
    }
}
