//! Static credential store consulted by the login endpoint.

use std::fmt;

use subtle::ConstantTimeEq;

use crate::error::CredentialError;

struct Credential {
    username: String,
    password: String,
}

/// List of `username:password` pairs.
pub struct CredentialStore {
    credentials: Vec<Credential>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let usernames: Vec<&str> = self.credentials.iter().map(|c| c.username.as_str()).collect();
        f.debug_struct("CredentialStore")
            .field("usernames", &usernames)
            .finish()
    }
}

impl CredentialStore {
    /// Parses a comma-separated `user:pass` list.
    ///
    /// The password is everything after the first `:`, so passwords may
    /// themselves contain colons. Blank entries between commas are skipped.
    pub fn parse(list: &str) -> Result<Self, CredentialError> {
        let mut credentials = Vec::new();

        for (position, entry) in list.split(',').map(str::trim).enumerate() {
            if entry.is_empty() {
                continue;
            }
            let (username, password) = entry
                .split_once(':')
                .ok_or(CredentialError::InvalidEntry(position))?;
            if username.is_empty() || password.is_empty() {
                return Err(CredentialError::InvalidEntry(position));
            }
            credentials.push(Credential {
                username: username.to_string(),
                password: password.to_string(),
            });
        }

        if credentials.is_empty() {
            return Err(CredentialError::Empty);
        }

        Ok(Self { credentials })
    }

    /// Returns `true` if the pair matches a configured credential.
    ///
    /// Every entry is compared so timing does not reveal which usernames exist.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let mut matched = subtle::Choice::from(0u8);
        for credential in &self.credentials {
            let user_ok = credential.username.as_bytes().ct_eq(username.as_bytes());
            let pass_ok = credential.password.as_bytes().ct_eq(password.as_bytes());
            matched |= user_ok & pass_ok;
        }
        matched.into()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_verify() {
        let store = CredentialStore::parse("admin:s3cret, alice:wonder:land").unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.verify("admin", "s3cret"));
        assert!(store.verify("alice", "wonder:land"));
        assert!(!store.verify("alice", "wonder"));
        assert!(!store.verify("bob", "s3cret"));
        assert!(!store.verify("", ""));
    }

    #[test]
    fn test_blank_entries_skipped() {
        let store = CredentialStore::parse("admin:pw,, ").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_entries_rejected() {
        assert_eq!(
            CredentialStore::parse("admin:pw,nocolon").unwrap_err(),
            CredentialError::InvalidEntry(1)
        );
        assert_eq!(
            CredentialStore::parse(":pw").unwrap_err(),
            CredentialError::InvalidEntry(0)
        );
        assert_eq!(CredentialStore::parse(" , ").unwrap_err(), CredentialError::Empty);
    }

    #[test]
    fn test_debug_hides_passwords() {
        let store = CredentialStore::parse("admin:topsecret").unwrap();
        let rendered = format!("{store:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("topsecret"));
    }
}
