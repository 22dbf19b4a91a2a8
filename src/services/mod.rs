pub mod auth_dispatcher;
pub mod oauth_service;

pub use auth_dispatcher::AuthDispatcher;
pub use oauth_service::OAuthService;
