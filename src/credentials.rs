//! Flat-file credential store.
//!
//! The store is a text file of whitespace-separated `login password digit`
//! records. It is re-read on every lookup so edits take effect immediately.

use crate::error::AuthError;
use crate::session::Privilege;
use std::path::PathBuf;

/// Longest accepted login or password.
pub const MAX_FIELD_LEN: usize = 10;

/// Default location of the credential store.
pub const DEFAULT_ACCOUNTS_PATH: &str = "/tmp/accounts";

/// One parsed store record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub login: String,
    pub password: String,
    pub privilege: Privilege,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Checks `login`/`password` against the store; the first matching record wins.
    ///
    /// A record whose digit grants no access is treated like a failed match.
    pub async fn lookup(&self, login: &str, password: &str) -> Result<Privilege, AuthError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| AuthError::StoreUnavailable {
                path: self.path.clone(),
                source,
            })?;

        let account = parse_accounts(&content)
            .into_iter()
            .find(|account| account.login == login && account.password == password)
            .ok_or(AuthError::Rejected)?;

        match account.privilege {
            Privilege::None => Err(AuthError::Rejected),
            privilege => Ok(privilege),
        }
    }
}

fn valid_login(login: &str) -> bool {
    (1..=MAX_FIELD_LEN).contains(&login.len()) && login.chars().all(|c| c.is_ascii_alphabetic())
}

fn valid_password(password: &str) -> bool {
    (1..=MAX_FIELD_LEN).contains(&password.chars().count())
        && !password.chars().any(|c| c == ';' || c.is_whitespace())
}

/// Parses store records, stopping at the first malformed one.
pub fn parse_accounts(content: &str) -> Vec<Account> {
    let mut tokens = content.split_whitespace();
    let mut accounts = Vec::new();

    while let (Some(login), Some(password), Some(digit)) =
        (tokens.next(), tokens.next(), tokens.next())
    {
        let mut digit_chars = digit.chars();
        let privilege = match (digit_chars.next(), digit_chars.next()) {
            (Some(d), None) if d.is_ascii_digit() => Privilege::from_digit(d),
            _ => break,
        };
        if !valid_login(login) || !valid_password(password) {
            break;
        }
        accounts.push(Account {
            login: login.to_string(),
            password: password.to_string(),
            privilege,
        });
    }

    accounts
}

/// Splits an AUTH argument of the form `login;password`.
pub fn parse_credentials(arg: &str) -> Result<(&str, &str), AuthError> {
    let (login, password) = arg.split_once(';').ok_or(AuthError::Malformed)?;
    if valid_login(login) && valid_password(password) {
        Ok((login, password))
    } else {
        Err(AuthError::Malformed)
    }
}
