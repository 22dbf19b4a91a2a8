//! Precedence-ordered authentication for MCP requests (§4.9).
//!
//! Three schemes are tried in order, returning on first success: a
//! first-party session bearer, an API key header, then the
//! `Authorization: Bearer` header (routed by prefix to either OAuth
//! token validation or API-key lookup). A scheme that's *present but
//! invalid* does not fall through to the next scheme — e.g. an
//! expired OAuth bearer is not then reinterpreted as an API key.

use std::sync::Arc;

use crate::collaborators::{ApiKeyService, FeatureFlagReader, OrganizationSelector, SessionResolver};
use crate::crypto::ACCESS_TOKEN_PREFIX;
use crate::models::{ExternalOrganization, ExternalUser};
use crate::services::oauth_service::OAuthService;

pub struct AuthDispatcher {
    session_resolver: Arc<dyn SessionResolver>,
    organization_selector: Arc<dyn OrganizationSelector>,
    api_keys: Arc<dyn ApiKeyService>,
    oauth: Arc<OAuthService>,
    feature_flags: Arc<dyn FeatureFlagReader>,
}

impl AuthDispatcher {
    pub fn new(
        session_resolver: Arc<dyn SessionResolver>,
        organization_selector: Arc<dyn OrganizationSelector>,
        api_keys: Arc<dyn ApiKeyService>,
        oauth: Arc<OAuthService>,
        feature_flags: Arc<dyn FeatureFlagReader>,
    ) -> Self {
        Self {
            session_resolver,
            organization_selector,
            api_keys,
            oauth,
            feature_flags,
        }
    }

    /// Resolves `(user, organization)` from whichever credential is
    /// present, in precedence order. `session_token` is opaque to this
    /// core (first-party cookie, resolved via the out-of-scope session
    /// system); `api_key_header` is the dedicated API-key header value;
    /// `authorization_bearer` is the raw token from an
    /// `Authorization: Bearer <token>` header, if any.
    pub async fn authenticate(
        &self,
        session_token: Option<&str>,
        api_key_header: Option<&str>,
        authorization_bearer: Option<&str>,
    ) -> Option<(ExternalUser, ExternalOrganization)> {
        if let Some(token) = session_token {
            if let Some(user) = self.session_resolver.resolve_user(token).await {
                let organization = self.organization_selector.select_for_user(&user).await?;
                return Some((user, organization));
            }
        }

        if let Some(key) = api_key_header {
            if key.starts_with("bow_") && !key.starts_with(ACCESS_TOKEN_PREFIX) {
                return self.resolve_api_key(key).await;
            }
        }

        if let Some(token) = authorization_bearer {
            if token.starts_with(ACCESS_TOKEN_PREFIX) {
                return self.oauth.validate_access_token(token).await;
            }
            if token.starts_with("bow_") {
                return self.resolve_api_key(token).await;
            }
        }

        None
    }

    /// Resolves only the first-party session scheme, for endpoints that
    /// must reject the OAuth bearer they are themselves about to mint
    /// (§9): the consent POST and admin client-registry endpoints.
    pub async fn authenticate_session(
        &self,
        session_token: &str,
    ) -> Option<(ExternalUser, ExternalOrganization)> {
        let user = self.session_resolver.resolve_user(session_token).await?;
        let organization = self.organization_selector.select_for_user(&user).await?;
        Some((user, organization))
    }

    async fn resolve_api_key(&self, key: &str) -> Option<(ExternalUser, ExternalOrganization)> {
        let user = self.api_keys.get_user_by_api_key(key).await?;
        let organization = self.api_keys.get_organization_by_api_key(key).await?;
        Some((user, organization))
    }

    pub async fn mcp_enabled(&self, organization: &ExternalOrganization) -> bool {
        self.feature_flags.mcp_enabled(organization).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        MockApiKeyService, MockFeatureFlagReader, MockOrganizationSelector, MockSessionResolver,
    };
    use crate::repositories::client_repository::MockClientRepository;
    use crate::repositories::code_repository::MockAuthorizationCodeRepository;
    use crate::repositories::token_repository::MockAccessTokenRepository;
    use crate::collaborators::MockDomainLookup;

    fn oauth_service_with_no_token() -> Arc<OAuthService> {
        Arc::new(OAuthService::new(
            Arc::new(MockClientRepository::new()),
            Arc::new(MockAuthorizationCodeRepository::new()),
            Arc::new(MockAccessTokenRepository::new()),
            Arc::new(MockDomainLookup::new()),
        ))
    }

    #[tokio::test]
    async fn session_bearer_takes_precedence_and_does_not_touch_other_schemes() {
        let mut session = MockSessionResolver::new();
        session.expect_resolve_user().returning(|_| {
            Box::pin(async {
                Some(ExternalUser {
                    id: "user-1".into(),
                    email: "a@example.com".into(),
                })
            })
        });

        let mut orgs = MockOrganizationSelector::new();
        orgs.expect_select_for_user().returning(|_| {
            Box::pin(async {
                Some(ExternalOrganization {
                    id: "org-1".into(),
                    name: "Acme".into(),
                    mcp_enabled: true,
                })
            })
        });

        // If the dispatcher touched the API-key scheme, this mock would
        // panic on an unexpected call.
        let api_keys = MockApiKeyService::new();

        let dispatcher = AuthDispatcher::new(
            Arc::new(session),
            Arc::new(orgs),
            Arc::new(api_keys),
            oauth_service_with_no_token(),
            Arc::new(MockFeatureFlagReader::new()),
        );

        let result = dispatcher
            .authenticate(Some("session-token"), Some("bow_some_key"), None)
            .await;

        assert!(result.is_some());
        assert_eq!(result.unwrap().0.id, "user-1");
    }

    #[tokio::test]
    async fn unrecognized_credentials_yield_none() {
        let mut session = MockSessionResolver::new();
        session
            .expect_resolve_user()
            .returning(|_| Box::pin(async { None }));

        let dispatcher = AuthDispatcher::new(
            Arc::new(session),
            Arc::new(MockOrganizationSelector::new()),
            Arc::new(MockApiKeyService::new()),
            oauth_service_with_no_token(),
            Arc::new(MockFeatureFlagReader::new()),
        );

        let result = dispatcher.authenticate(Some("bad-session"), None, None).await;
        assert!(result.is_none());
    }
}
