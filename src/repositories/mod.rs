pub mod client_repository;
pub mod code_repository;
pub mod token_repository;

pub use client_repository::{ClientRepository, SqliteClientRepository};
pub use code_repository::{AuthorizationCodeRepository, SqliteAuthorizationCodeRepository};
pub use token_repository::{AccessTokenRepository, SqliteAccessTokenRepository};
