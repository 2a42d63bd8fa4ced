//! Google authorization and free/busy queries.
//!
//! - [`CredentialStore`] - reads and writes the `authorized_user` token file
//! - [`Authorizer`] - returns an [`AuthorizedClient`] from the stored token,
//!   or runs interactive consent ([`LoopbackConsent`]) and persists the result
//! - [`FreeBusyClient`] - queries one calendar's busy intervals
//!
//! # Example
//!
//! ```ignore
//! use freebusy_google::{Authorizer, FreeBusyClient, GoogleConfig};
//! use freebusy_core::FreeBusyQuery;
//!
//! let config = GoogleConfig::new("credentials.json", "token.json");
//! let authorizer = Authorizer::new(config.clone())?;
//! let fetcher = FreeBusyClient::new(&config)?;
//!
//! let query = FreeBusyQuery::from_form("primary", "2024-01-01", "2024-01-02")?;
//! let client = authorizer.authorize().await?;
//! let busy = fetcher.get_busy_intervals(&client, &query).await?;
//! ```

mod authorizer;
mod config;
mod error;
mod freebusy;
mod oauth;
mod store;

pub use authorizer::{AuthorizedClient, Authorizer, BoxFuture, ConsentFlow};
pub use config::{GoogleConfig, GoogleEndpoints, OAuthCredentials};
pub use error::{GoogleError, GoogleErrorCode, GoogleResult};
pub use freebusy::{FreeBusyClient, INVALID_CALENDAR_MESSAGE};
pub use oauth::{LoopbackConsent, OAuthClient, PkceFlow};
pub use store::{AUTHORIZED_USER, AuthorizedUser, CredentialStore, TokenInfo};
