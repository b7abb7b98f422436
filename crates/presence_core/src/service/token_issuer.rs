//! Daily token issuance use-case.
//!
//! # Responsibility
//! - Ensure exactly one credential exists for the server's current date.
//! - Perform administrative forced rotation.
//! - Hand back the signed envelope for QR display or copy-paste.
//!
//! # Invariants
//! - "Today" is read once per call from the shared clock.
//! - `ensure_today(false)` never changes an existing token (safe on restart and
//!   on every scheduler tick).
//! - `ensure_today(true)` replaces today's secret; every envelope issued
//!   earlier that day stops validating. This is the regeneration contract.

use crate::clock::{Clock, IssueDate};
use crate::codec::EnvelopeCodec;
use crate::model::principal::Principal;
use crate::model::token::{DailyToken, IssuedToken, TokenSecret};
use crate::repo::token_repo::TokenRepository;
use crate::repo::RepoError;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Service error for issuance use-cases.
#[derive(Debug)]
pub enum IssueError {
    /// Caller is not allowed to generate tokens.
    Forbidden { identity_id: String },
    /// Persistence failed; safe to retry.
    StoreUnavailable(RepoError),
}

impl IssueError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl Display for IssueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forbidden { identity_id } => {
                write!(f, "identity `{identity_id}` may not generate attendance tokens")
            }
            Self::StoreUnavailable(err) => write!(f, "token store unavailable: {err}"),
        }
    }
}

impl Error for IssueError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) => Some(err),
            Self::Forbidden { .. } => None,
        }
    }
}

impl From<RepoError> for IssueError {
    fn from(value: RepoError) -> Self {
        Self::StoreUnavailable(value)
    }
}

/// Issuance service over a token repository.
pub struct TokenIssuer<R: TokenRepository> {
    repo: R,
    codec: EnvelopeCodec,
    clock: Arc<dyn Clock>,
}

impl<R: TokenRepository> TokenIssuer<R> {
    pub fn new(repo: R, codec: EnvelopeCodec, clock: Arc<dyn Clock>) -> Self {
        Self { repo, codec, clock }
    }

    /// Administrative entry point: only admins may generate or rotate.
    pub fn generate(&self, principal: &Principal, force: bool) -> Result<IssuedToken, IssueError> {
        if !principal.is_admin() {
            warn!(
                "event=token_generate module=issuer status=rejected reason=forbidden identity_id={} role={}",
                principal.id, principal.role
            );
            return Err(IssueError::Forbidden {
                identity_id: principal.id.clone(),
            });
        }
        self.ensure_today(force)
    }

    /// Ensures a token exists for today and returns its envelope.
    ///
    /// # Contract
    /// - `force = false` with an existing token: returns it unchanged.
    /// - `force = false` without one: creates it. Losing a create race to a
    ///   concurrent issuer returns the winner's token.
    /// - `force = true`: writes a fresh secret via atomic replace.
    pub fn ensure_today(&self, force: bool) -> Result<IssuedToken, IssueError> {
        let now = self.clock.now();
        let today = now.date_naive();
        let created_at = now.timestamp_millis();

        if !force {
            if let Some(existing) = self.lookup(today)? {
                info!("event=token_issue module=issuer status=ok mode=existing issue_date={today}");
                return Ok(self.wrap(existing, false));
            }
        }

        let secret = TokenSecret::generate();
        let token = if force {
            self.repo
                .replace(today, &secret, created_at)
                .map_err(|err| self.store_failure("replace", today, err))?
        } else {
            match self.repo.create(today, &secret, created_at) {
                Ok(token) => token,
                Err(RepoError::Conflict(date)) => {
                    let winner = self.lookup(date)?.ok_or_else(|| {
                        self.store_failure(
                            "create",
                            date,
                            RepoError::InvalidData(format!(
                                "token for {date} conflicted but is not readable"
                            )),
                        )
                    })?;
                    info!(
                        "event=token_issue module=issuer status=ok mode=existing issue_date={date} race=lost"
                    );
                    return Ok(self.wrap(winner, false));
                }
                Err(err) => return Err(self.store_failure("create", today, err)),
            }
        };

        info!(
            "event=token_issue module=issuer status=ok mode={} issue_date={today}",
            if force { "rotated" } else { "created" }
        );
        Ok(self.wrap(token, true))
    }

    fn lookup(&self, date: IssueDate) -> Result<Option<DailyToken>, IssueError> {
        self.repo
            .find_by_date(date)
            .map_err(|err| self.store_failure("find", date, err))
    }

    fn wrap(&self, token: DailyToken, freshly_issued: bool) -> IssuedToken {
        let envelope = self.codec.sign(&token.secret, token.issue_date);
        IssuedToken {
            token,
            envelope,
            freshly_issued,
        }
    }

    fn store_failure(&self, step: &str, date: IssueDate, err: RepoError) -> IssueError {
        error!(
            "event=token_issue module=issuer status=error step={step} issue_date={date} error_code=store_unavailable error={err}"
        );
        IssueError::StoreUnavailable(err)
    }
}
