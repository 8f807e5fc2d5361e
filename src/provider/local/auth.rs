// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local accounts and sessions.
//!
//! Passwords are stored as `sha256$<salt>$<hex digest of salt + password>`.
//! Tokens are opaque random strings held in memory.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::{new_id, sha256_hex, LocalBackend};
use crate::provider::traits::{AuthProvider, ErrorCode, ProviderError, ProviderResult};
use crate::provider::types::{
    now_millis, AuthSession, ImportResult, Operation, Page, SignUpRequest, TokenClaims, User,
    UserExport,
};

const HASH_SCHEME: &str = "sha256";
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    user: User,
    password_hash: Option<String>,
}

#[derive(Debug, Clone)]
struct Session {
    user_id: String,
    issued_at: i64,
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct RefreshGrant {
    user_id: String,
    expires_at: i64,
}

#[derive(Debug, Default)]
pub(super) struct AuthState {
    accounts: BTreeMap<String, Account>,
    /// lowercase email → user id
    by_email: HashMap<String, String>,
    sessions: HashMap<String, Session>,
    refresh_tokens: HashMap<String, RefreshGrant>,
}

impl AuthState {
    /// Drop sessions and refresh tokens that can no longer be used.
    fn prune_expired(&mut self, now: i64) {
        let sessions = self.sessions.len();
        let grants = self.refresh_tokens.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        self.refresh_tokens.retain(|_, g| g.expires_at > now);

        let pruned = sessions - self.sessions.len() + grants - self.refresh_tokens.len();
        if pruned > 0 {
            debug!(pruned, "Pruned expired sessions");
        }
    }
}

fn hash_password(password: &str) -> String {
    let salt = new_id();
    let digest = sha256_hex(&[salt.as_bytes(), password.as_bytes()]);
    format!("{}${}${}", HASH_SCHEME, salt, digest)
}

fn verify_password(stored: &str, password: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(HASH_SCHEME), Some(salt), Some(digest)) => {
            sha256_hex(&[salt.as_bytes(), password.as_bytes()]) == digest
        }
        _ => false,
    }
}

fn validate_credentials(email: &str, password: &str) -> ProviderResult<()> {
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(ProviderError::invalid_argument(format!("invalid email '{}'", email)));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ProviderError::invalid_argument(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

impl LocalBackend {
    fn open_session(&self, state: &mut AuthState, user: User) -> AuthSession {
        let access_token = new_id();
        let refresh_token = new_id();
        let issued_at = now_millis();
        let expires_at = issued_at + self.config.token_ttl.as_millis() as i64;

        state.prune_expired(issued_at);
        state.sessions.insert(
            access_token.clone(),
            Session {
                user_id: user.id.clone(),
                issued_at,
                expires_at,
            },
        );
        state.refresh_tokens.insert(
            refresh_token.clone(),
            RefreshGrant {
                user_id: user.id.clone(),
                expires_at: issued_at + self.config.refresh_token_ttl.as_millis() as i64,
            },
        );

        AuthSession {
            user,
            access_token,
            refresh_token,
            expires_at,
        }
    }
}

#[async_trait]
impl AuthProvider for LocalBackend {
    async fn sign_up(&self, request: &SignUpRequest) -> ProviderResult<AuthSession> {
        self.enter(Operation::SignUp)?;
        validate_credentials(&request.email, &request.password)?;

        let mut state = self.auth.write();
        let email_key = request.email.to_ascii_lowercase();
        if state.by_email.contains_key(&email_key) {
            return Err(ProviderError::new(
                ErrorCode::AlreadyExists,
                format!("account for '{}' already exists", request.email),
            ));
        }

        let user = User {
            id: new_id(),
            email: request.email.clone(),
            display_name: request.display_name.clone(),
            email_verified: false,
            disabled: false,
            created_at: now_millis(),
        };
        state.by_email.insert(email_key, user.id.clone());
        state.accounts.insert(
            user.id.clone(),
            Account {
                user: user.clone(),
                password_hash: Some(hash_password(&request.password)),
            },
        );
        info!(user_id = %user.id, "Local account created");

        Ok(self.open_session(&mut state, user))
    }

    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<AuthSession> {
        self.enter(Operation::SignIn)?;

        let mut state = self.auth.write();
        let account = state
            .by_email
            .get(&email.to_ascii_lowercase())
            .and_then(|id| state.accounts.get(id))
            .cloned()
            .ok_or_else(|| ProviderError::unauthenticated("invalid credentials"))?;

        let valid = account
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(hash, password));
        if !valid {
            return Err(ProviderError::unauthenticated("invalid credentials"));
        }
        if account.user.disabled {
            return Err(ProviderError::new(ErrorCode::PermissionDenied, "account disabled"));
        }

        Ok(self.open_session(&mut state, account.user))
    }

    async fn sign_out(&self, access_token: &str) -> ProviderResult<()> {
        self.enter(Operation::SignOut)?;
        self.auth.write().sessions.remove(access_token);
        Ok(())
    }

    async fn verify_token(&self, access_token: &str) -> ProviderResult<TokenClaims> {
        self.enter(Operation::VerifyToken)?;

        let mut state = self.auth.write();
        let session = state
            .sessions
            .get(access_token)
            .cloned()
            .ok_or_else(|| ProviderError::unauthenticated("unknown token"))?;
        if session.expires_at <= now_millis() {
            state.sessions.remove(access_token);
            return Err(ProviderError::unauthenticated("token expired"));
        }
        let account = state
            .accounts
            .get(&session.user_id)
            .ok_or_else(|| ProviderError::unauthenticated("account no longer exists"))?;

        Ok(TokenClaims {
            user_id: session.user_id,
            email: account.user.email.clone(),
            issued_at: session.issued_at,
            expires_at: session.expires_at,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<AuthSession> {
        self.enter(Operation::RefreshToken)?;

        let mut state = self.auth.write();
        // Refresh tokens are single use
        let grant = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| ProviderError::unauthenticated("unknown refresh token"))?;
        if grant.expires_at <= now_millis() {
            return Err(ProviderError::unauthenticated("refresh token expired"));
        }
        let user = state
            .accounts
            .get(&grant.user_id)
            .map(|a| a.user.clone())
            .ok_or_else(|| ProviderError::unauthenticated("account no longer exists"))?;

        Ok(self.open_session(&mut state, user))
    }

    async fn send_password_reset(&self, email: &str) -> ProviderResult<()> {
        self.enter(Operation::SendPasswordReset)?;

        let known = self.auth.read().by_email.contains_key(&email.to_ascii_lowercase());
        // Unknown addresses succeed silently so accounts can't be enumerated
        if known {
            self.record_outbox_email(
                vec![email.to_string()],
                "Reset your password".to_string(),
                format!("Use this code to reset your password: {}", new_id()),
            );
        }
        debug!(known, "Password reset requested");
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> ProviderResult<Option<User>> {
        self.enter(Operation::GetUser)?;
        Ok(self.auth.read().accounts.get(user_id).map(|a| a.user.clone()))
    }

    async fn export_users(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> ProviderResult<Page<UserExport>> {
        self.enter(Operation::ExportUsers)?;

        let state = self.auth.read();
        let start = match cursor {
            Some(c) => std::ops::Bound::Excluded(c.to_string()),
            None => std::ops::Bound::Unbounded,
        };
        let mut remaining = state
            .accounts
            .range((start, std::ops::Bound::Unbounded))
            .map(|(_, a)| UserExport {
                user: a.user.clone(),
                password_hash: a.password_hash.clone(),
            });

        let items: Vec<UserExport> = remaining.by_ref().take(limit.max(1)).collect();
        let next_cursor = match remaining.next() {
            Some(_) => items.last().map(|u| u.user.id.clone()),
            None => None,
        };
        Ok(Page { items, next_cursor })
    }

    async fn import_users(&self, users: &[UserExport]) -> ProviderResult<ImportResult> {
        self.enter(Operation::ImportUsers)?;

        let mut state = self.auth.write();
        let mut result = ImportResult::default();

        for export in users {
            let email_key = export.user.email.to_ascii_lowercase();
            if state.by_email.contains_key(&email_key) {
                result
                    .failures
                    .push((export.user.email.clone(), "email already registered".to_string()));
                continue;
            }
            if state.accounts.contains_key(&export.user.id) {
                result
                    .failures
                    .push((export.user.email.clone(), "user id already taken".to_string()));
                continue;
            }

            // Foreign hashes can't be verified here; those users must reset
            let password_hash = export
                .password_hash
                .clone()
                .filter(|h| h.starts_with(HASH_SCHEME));

            state.by_email.insert(email_key, export.user.id.clone());
            state.accounts.insert(
                export.user.id.clone(),
                Account {
                    user: export.user.clone(),
                    password_hash,
                },
            );
            result.imported += 1;
        }

        info!(imported = result.imported, failed = result.failures.len(), "Imported users");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LocalBackendConfig;
    use std::time::Duration;

    fn signup(email: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            password: "correct horse".to_string(),
            display_name: Some("Ada".to_string()),
        }
    }

    #[tokio::test]
    async fn test_sign_up_sign_in_verify() {
        let backend = LocalBackend::default();
        let session = backend.sign_up(&signup("ada@example.com")).await.unwrap();

        let claims = backend.verify_token(&session.access_token).await.unwrap();
        assert_eq!(claims.user_id, session.user.id);

        let again = backend.sign_in("ADA@example.com", "correct horse").await.unwrap();
        assert_eq!(again.user.id, session.user.id);
        assert_ne!(again.access_token, session.access_token);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let backend = LocalBackend::default();
        backend.sign_up(&signup("ada@example.com")).await.unwrap();

        let err = backend.sign_up(&signup("ada@example.com")).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::AlreadyExists));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let backend = LocalBackend::default();
        backend.sign_up(&signup("ada@example.com")).await.unwrap();

        let err = backend.sign_in("ada@example.com", "wrong password").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Unauthenticated));

        let weak = SignUpRequest { password: "123".into(), ..signup("bob@example.com") };
        let err = backend.sign_up(&weak).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidArgument));
    }

    #[tokio::test]
    async fn test_sign_out_revokes_token() {
        let backend = LocalBackend::default();
        let session = backend.sign_up(&signup("ada@example.com")).await.unwrap();

        backend.sign_out(&session.access_token).await.unwrap();
        assert!(backend.verify_token(&session.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_token_is_single_use() {
        let backend = LocalBackend::default();
        let session = backend.sign_up(&signup("ada@example.com")).await.unwrap();

        let refreshed = backend.refresh_token(&session.refresh_token).await.unwrap();
        assert!(backend.verify_token(&refreshed.access_token).await.is_ok());
        assert!(backend.refresh_token(&session.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_sessions_and_refresh_tokens_are_dropped() {
        let backend = LocalBackend::new(LocalBackendConfig {
            token_ttl: Duration::ZERO,
            refresh_token_ttl: Duration::ZERO,
            ..Default::default()
        });
        let first = backend.sign_up(&signup("ada@example.com")).await.unwrap();

        let err = backend.verify_token(&first.access_token).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Unauthenticated));
        assert!(!backend.auth.read().sessions.contains_key(&first.access_token));
        assert!(backend.auth.read().refresh_tokens.contains_key(&first.refresh_token));

        // The next sign-in sweeps what the first session left behind
        let second = backend.sign_in("ada@example.com", "correct horse").await.unwrap();
        {
            let state = backend.auth.read();
            assert!(!state.refresh_tokens.contains_key(&first.refresh_token));
            assert_eq!(state.sessions.len(), 1);
            assert_eq!(state.refresh_tokens.len(), 1);
        }

        let err = backend.refresh_token(&second.refresh_token).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Unauthenticated));
        assert!(backend.auth.read().refresh_tokens.is_empty());
    }

    #[tokio::test]
    async fn test_live_sessions_survive_pruning() {
        let backend = LocalBackend::default();
        let first = backend.sign_up(&signup("ada@example.com")).await.unwrap();
        backend.sign_in("ada@example.com", "correct horse").await.unwrap();

        assert!(backend.verify_token(&first.access_token).await.is_ok());
        assert_eq!(backend.auth.read().sessions.len(), 2);
        assert!(backend.refresh_token(&first.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_password_reset_goes_to_outbox_for_known_users_only() {
        let backend = LocalBackend::default();
        backend.sign_up(&signup("ada@example.com")).await.unwrap();

        backend.send_password_reset("ada@example.com").await.unwrap();
        backend.send_password_reset("nobody@example.com").await.unwrap();

        assert_eq!(backend.outbox().len(), 1);
    }

    #[tokio::test]
    async fn test_export_import_between_backends() {
        let source = LocalBackend::default();
        for i in 0..5 {
            source.sign_up(&signup(&format!("user{}@example.com", i))).await.unwrap();
        }

        let first = source.export_users(None, 3).await.unwrap();
        assert_eq!(first.items.len(), 3);
        let cursor = first.next_cursor.clone().unwrap();
        let second = source.export_users(Some(&cursor), 3).await.unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.next_cursor.is_none());

        let target = LocalBackend::default();
        let all: Vec<UserExport> = first.items.into_iter().chain(second.items).collect();
        let result = target.import_users(&all).await.unwrap();
        assert_eq!(result.imported, 5);

        // Same hashing scheme, so passwords carry over
        assert!(target.sign_in("user3@example.com", "correct horse").await.is_ok());

        // Second import collides on every email
        let again = target.import_users(&all).await.unwrap();
        assert_eq!(again.imported, 0);
        assert_eq!(again.failures.len(), 5);
    }

    #[test]
    fn test_password_hash_format() {
        let stored = hash_password("hunter22");
        assert!(stored.starts_with("sha256$"));
        assert!(verify_password(&stored, "hunter22"));
        assert!(!verify_password(&stored, "hunter23"));
        assert!(!verify_password("bcrypt$x$y", "hunter22"));
    }
}
