pub mod external;
pub mod oauth;

pub use external::{ExternalOrganization, ExternalUser};
pub use oauth::{AccessTokenRecord, AuthorizationCode, OAuthClient};
