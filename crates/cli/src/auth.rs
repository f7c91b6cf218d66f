//! HTTP authentication decoration for the CLI

use wiregit::RequestDecorator;

/// Applies the caller-chosen authentication scheme to outgoing requests:
/// either a verbatim `Authorization` header or HTTP Basic credentials.
pub struct AuthDecorator {
    authz_header: Option<String>,
    basic: Option<(String, String)>,
}

impl AuthDecorator {
    /// Build from the CLI flags; `None` when no scheme was configured.
    pub fn from_flags(
        authz_header: Option<String>,
        basic_user: Option<String>,
        basic_password: Option<String>,
    ) -> Option<Self> {
        let basic = match (basic_user, basic_password) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        };
        if authz_header.is_none() && basic.is_none() {
            return None;
        }
        Some(Self { authz_header, basic })
    }
}

impl RequestDecorator for AuthDecorator {
    fn decorate(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        if let Some(header) = &self.authz_header {
            request.header("Authorization", header)
        } else if let Some((user, password)) = &self.basic {
            request.basic_auth(user, Some(password))
        } else {
            request
        }
    }
}
