// ── Authentication token state ──

use secrecy::{ExposeSecret, SecretString};

/// Current authentication status of the companion app.
///
/// The token is never printed by `Debug`.
#[derive(Debug, Clone, Default)]
pub enum CurrentToken {
    LoggedIn {
        token: SecretString,
    },
    #[default]
    LoggedOut,
}

impl CurrentToken {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::LoggedIn { .. })
    }

    pub fn token(&self) -> Option<&SecretString> {
        match self {
            Self::LoggedIn { token } => Some(token),
            Self::LoggedOut => None,
        }
    }
}

impl PartialEq for CurrentToken {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::LoggedIn { token: a }, Self::LoggedIn { token: b }) => {
                a.expose_secret() == b.expose_secret()
            }
            (Self::LoggedOut, Self::LoggedOut) => true,
            _ => false,
        }
    }
}

impl Eq for CurrentToken {}

/// Signal reported by the authentication collaborator.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    LoggedIn(SecretString),
    LoggedOut,
}

impl From<AuthEvent> for CurrentToken {
    fn from(event: AuthEvent) -> Self {
        match event {
            AuthEvent::LoggedIn(token) => Self::LoggedIn { token },
            AuthEvent::LoggedOut => Self::LoggedOut,
        }
    }
}
