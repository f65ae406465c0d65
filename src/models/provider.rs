use std::fmt;

use serde_json::Value;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};
use crate::models::user::Profile;

/// Maps a provider's userinfo document to a [`Profile`].
pub type ProfileMapper = fn(&Value) -> Option<Profile>;

/// The client credentials registered with an identity provider.
#[derive(Clone)]
pub struct ProviderRegistration {
    /// The provider id used in URLs, e.g. `github`.
    pub provider_id: String,
    /// The OAuth client id.
    pub client_id: String,
    /// The OAuth client secret.
    pub client_secret: Zeroizing<String>,
}

impl fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("provider_id", &self.provider_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// An OAuth identity provider: its credentials plus its endpoints.
#[derive(Clone, Debug)]
pub struct Provider {
    pub registration: ProviderRegistration,
    /// The human readable name.
    pub name: String,
    pub authorization_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scope: String,
    pub map_profile: ProfileMapper,
}

impl Provider {
    pub fn id(&self) -> &str {
        &self.registration.provider_id
    }
}

/// Builds the GitHub provider.
pub fn github(client_id: String, client_secret: Zeroizing<String>) -> Provider {
    Provider {
        registration: ProviderRegistration {
            provider_id: "github".to_string(),
            client_id,
            client_secret,
        },
        name: "GitHub".to_string(),
        authorization_url: "https://github.com/login/oauth/authorize".to_string(),
        token_url: "https://github.com/login/oauth/access_token".to_string(),
        userinfo_url: "https://api.github.com/user".to_string(),
        scope: "read:user user:email".to_string(),
        map_profile: github_profile,
    }
}

fn github_profile(doc: &Value) -> Option<Profile> {
    let id = match doc.get("id")? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    let text = |key: &str| doc.get(key).and_then(Value::as_str).map(str::to_string);

    Some(Profile {
        id,
        name: text("name").or_else(|| text("login")).unwrap_or_default(),
        email: text("email").unwrap_or_default(),
        image: text("avatar_url").unwrap_or_default(),
    })
}

/// The immutable set of providers registered at startup.
#[derive(Clone, Debug)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    /// Creates a registry, rejecting an empty list and duplicate ids.
    pub fn new(providers: Vec<Provider>) -> Result<Self> {
        if providers.is_empty() {
            return Err(AppError::Config("at least one provider is required".to_string()));
        }

        for (i, provider) in providers.iter().enumerate() {
            if provider.registration.client_id.is_empty() {
                return Err(AppError::Config(format!(
                    "provider {} has an empty client id",
                    provider.id()
                )));
            }
            if providers[..i].iter().any(|p| p.id() == provider.id()) {
                return Err(AppError::Config(format!(
                    "provider {} registered twice",
                    provider.id()
                )));
            }
        }

        Ok(Self { providers })
    }

    pub fn get(&self, provider_id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id() == provider_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gh() -> Provider {
        github("client".to_string(), Zeroizing::new("secret".to_string()))
    }

    #[test]
    fn github_profile_falls_back_to_login_and_empty_image() {
        let profile = github_profile(&json!({
            "id": 42,
            "login": "octocat",
            "name": null,
            "email": "octo@example.com"
        }))
        .unwrap();

        assert_eq!(profile.id, "42");
        assert_eq!(profile.name, "octocat");
        assert_eq!(profile.email, "octo@example.com");
        assert_eq!(profile.image, "");
    }

    #[test]
    fn github_profile_without_id_is_rejected() {
        assert!(github_profile(&json!({ "login": "octocat" })).is_none());
    }

    #[test]
    fn registry_rejects_duplicates_and_empty() {
        assert!(ProviderRegistry::new(vec![]).is_err());
        assert!(ProviderRegistry::new(vec![gh(), gh()]).is_err());

        let registry = ProviderRegistry::new(vec![gh()]).unwrap();
        assert!(registry.get("github").is_some());
        assert!(registry.get("gitlab").is_none());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let out = format!("{:?}", gh().registration);
        assert!(!out.contains("secret\""));
        assert!(out.contains("<redacted>"));
    }
}
