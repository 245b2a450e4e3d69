//! Authentication hook for validating player credentials.
//!
//! Parlor does not own accounts; they live in the external store. The
//! lobby only needs something that turns credentials into an
//! [`Identity`], so that is the whole [`Authenticator`] trait. The
//! store-backed catalog implements it in production, tests plug in a
//! mock.

use parlor_protocol::PlayerId;

use crate::SessionError;

/// A validated account reference, held per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub player_id: PlayerId,
    pub username: String,
}

/// Validates a client's credentials and returns their identity.
///
/// # Example
///
/// ```rust
/// use parlor_protocol::PlayerId;
/// use parlor_session::{Authenticator, Identity, SessionError};
///
/// /// Accepts any username whose password hash is "letmein".
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(
///         &self,
///         username: &str,
///         password_hash: &str,
///     ) -> Result<Identity, SessionError> {
///         if password_hash != "letmein" {
///             return Err(SessionError::AuthFailed("bad password".into()));
///         }
///         Ok(Identity {
///             player_id: PlayerId(username.len() as u64),
///             username: username.to_string(),
///         })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Checks the credentials sent in a lobby `Authenticate` request.
    ///
    /// # Returns
    /// - `Ok(Identity)`: the account exists and the hash matches
    /// - `Err(SessionError::AuthFailed)`: bad credentials
    /// - `Err(SessionError::Backend)`: the account store is unreachable
    fn authenticate(
        &self,
        username: &str,
        password_hash: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}

/// Lets the caller keep a handle on the authenticator it hands over.
impl<T: Authenticator> Authenticator for std::sync::Arc<T> {
    fn authenticate(
        &self,
        username: &str,
        password_hash: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send {
        (**self).authenticate(username, password_hash)
    }
}
