use super::registry::Accounts;
use crate::error::ValidationError;

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 50;
const MAX_PASSWORD_LEN: usize = 40;

/// Identifiers are UUID-shaped: 36 or 37 hex digits and dashes.
pub fn is_valid_identifier(id: &str) -> bool {
    matches!(id.len(), 36 | 37) && id.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

/// Check an authorization request against the accounts already registered.
///
/// Re-authorizing a registered identifier is allowed as long as the name is the
/// one it was registered under.
pub fn validate_authorization(
    accounts: &Accounts,
    id: &str,
    name: &str,
    password: &str,
) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::NameRequired);
    }
    if name.chars().count() < MIN_NAME_LEN {
        return Err(ValidationError::NameTooShort);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }

    if !is_valid_identifier(id) {
        return Err(ValidationError::InvalidIdentifier);
    }

    match accounts.get(id) {
        Some(existing) if existing.name != name => return Err(ValidationError::AlreadyRegistered),
        Some(_) => {}
        None => {
            if accounts.values().any(|account| account.name == name) {
                return Err(ValidationError::NameTaken);
            }
        }
    }

    if password.is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    if password.chars().count() > MAX_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooLong);
    }

    Ok(())
}
