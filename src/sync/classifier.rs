use super::models::NetworkState;
use crate::error::ApiError;

/// Map a failed remote call to the account health it implies.
///
/// 401/404 mean the stored token is no longer accepted and the account has to be
/// re-authorized. Everything else is treated as transient.
pub fn classify(error: &ApiError) -> NetworkState {
    if error.is_auth_rejection() {
        NetworkState::Unauthorized
    } else {
        NetworkState::NetworkError
    }
}

/// Health implied by the outcome of any remote call.
pub fn classify_outcome<T>(outcome: &Result<T, ApiError>) -> NetworkState {
    match outcome {
        Ok(_) => NetworkState::Active,
        Err(error) => classify(error),
    }
}
