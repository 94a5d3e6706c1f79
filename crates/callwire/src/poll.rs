//! Polling for the outcome of an update.
//!
//! After a call is accepted, its progress is only observable through
//! `read_state` on `[request_status, <id>]`. The poller repeats that until
//! the status is terminal or the wall-clock deadline passes:
//!
//! ```text
//! start ── read_state ──> status terminal? ──yes──> outcome
//!              ^                 │ no
//!              └── sleep(delay) <┘   (delay clamped to the remaining time)
//! ```
//!
//! Transport errors, undecodable certificates and a missing `status` leaf
//! are logged and retried. Errors while signing the read_state request are
//! not. Once a terminal status is seen no further read_state is issued: a
//! terminal status with missing or malformed companion leaves is surfaced
//! as an error.
//! Dropping the returned future cancels polling; the update itself is
//! unaffected.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use callwire_core::certificate::{parse_read_state_response, request_status_field};
use callwire_core::request_id::decode_leb128;
use callwire_core::{Certificate, Principal, RequestId};
use callwire_transport::Transport;
use tokio::time::Instant;

use crate::agent::Agent;
use crate::codec::ReplyCodec;
use crate::config::PollConfig;
use crate::error::{AgentError, Result};
use crate::status::RequestStatus;

/// Delay schedule between read_state attempts.
pub trait PollPolicy: fmt::Debug + Send + Sync {
    /// Delay after the `attempt`-th non-terminal observation (0-based).
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// The same delay every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl Default for FixedDelay {
    fn default() -> Self {
        Self(Duration::from_secs(1))
    }
}

impl PollPolicy for FixedDelay {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Delay growing geometrically from `initial` up to `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            multiplier: 1.4,
            max: Duration::from_secs(10),
        }
    }
}

impl PollPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Terminal outcome of an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Replied(Vec<u8>),
    Rejected { code: u64, message: String },
    /// Completed, but the reply has been pruned from the state tree.
    Done,
}

impl PollOutcome {
    /// Read a request's status out of a certificate.
    ///
    /// Returns the status and, if it is terminal, the outcome. A missing
    /// `status`, `reply`, `reject_code` or `reject_message` leaf is a
    /// [`AgentError::CertificateLookupMiss`]; an unparseable `reject_code`
    /// is a decoding error.
    pub fn from_certificate(
        certificate: &Certificate,
        request_id: &RequestId,
    ) -> Result<(RequestStatus, Option<Self>)> {
        let lookup = |field: &str| {
            certificate
                .lookup_bytes(&request_status_field(request_id, field))
                .ok_or_else(|| {
                    AgentError::CertificateLookupMiss(format!(
                        "request_status/{}/{}",
                        request_id.to_hex(),
                        field
                    ))
                })
        };

        let status = RequestStatus::from_leaf(lookup("status")?);
        let outcome = match status {
            RequestStatus::Replied => Some(Self::Replied(lookup("reply")?.to_vec())),
            RequestStatus::Rejected => {
                let code = decode_leb128(lookup("reject_code")?)?;
                let message = String::from_utf8_lossy(lookup("reject_message")?).into_owned();
                Some(Self::Rejected { code, message })
            }
            RequestStatus::Done => Some(Self::Done),
            _ => None,
        };
        Ok((status, outcome))
    }

    /// Classify a status certificate for the poll loop.
    ///
    /// Only a missing `status` leaf or a non-terminal status allows another
    /// read. A terminal status with unreadable companion leaves yields
    /// `Terminal(Err(..))`.
    pub fn observe(certificate: &Certificate, request_id: &RequestId) -> Observation {
        let leaf = certificate.lookup_bytes(&request_status_field(request_id, "status"));
        match leaf.map(RequestStatus::from_leaf) {
            None => Observation::Missing,
            Some(status) if !status.is_terminal() => Observation::Pending(status),
            Some(status) => Observation::Terminal(
                Self::from_certificate(certificate, request_id).and_then(|(_, outcome)| {
                    outcome.ok_or_else(|| {
                        AgentError::InvalidReply(format!("no outcome for terminal status {status}"))
                    })
                }),
            ),
        }
    }

    /// Reply bytes, mapping rejection and pruned replies to errors.
    pub fn into_reply(self, request_id: &RequestId) -> Result<Vec<u8>> {
        match self {
            Self::Replied(bytes) => Ok(bytes),
            Self::Rejected { code, message } => Err(AgentError::Rejected { code, message }),
            Self::Done => Err(AgentError::ReplyUnavailable(*request_id)),
        }
    }
}

/// What one status certificate says about a request.
#[derive(Debug)]
pub enum Observation {
    /// No `status` leaf for the request.
    Missing,
    /// A non-terminal status.
    Pending(RequestStatus),
    /// A terminal status: the outcome, or why it could not be read.
    Terminal(Result<PollOutcome>),
}

/// Drives the read_state loop for one request.
#[derive(Debug, Clone)]
pub struct Poller {
    config: PollConfig,
}

impl Poller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll until a terminal status or the deadline.
    pub async fn poll<T, C>(
        &self,
        agent: &Agent<T, C>,
        canister: &Principal,
        request_id: &RequestId,
    ) -> Result<PollOutcome>
    where
        T: Transport,
        C: ReplyCodec,
    {
        let deadline = Instant::now() + self.config.timeout;
        let mut last_status = None;
        let mut attempt: u32 = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::debug!(request_id = %request_id, ?last_status, "poll deadline reached");
                return Err(AgentError::PollTimeout {
                    request_id: *request_id,
                    last_status,
                });
            }

            let signed = agent.sign_status_request(request_id)?;
            let response = tokio::time::timeout(
                remaining,
                agent.transport().read_state(canister, Bytes::from(signed.bytes)),
            )
            .await;

            match response {
                Err(_) => {
                    tracing::warn!(request_id = %request_id, "read_state outlived the poll deadline");
                }
                Ok(Err(e)) => {
                    tracing::warn!(request_id = %request_id, error = %e, "read_state failed, retrying");
                }
                Ok(Ok(body)) => match parse_read_state_response(&body) {
                    Err(e) => {
                        tracing::warn!(request_id = %request_id, error = %e, "undecodable status certificate, retrying");
                    }
                    Ok(certificate) => match PollOutcome::observe(&certificate, request_id) {
                        Observation::Terminal(outcome) => {
                            tracing::debug!(request_id = %request_id, ok = outcome.is_ok(), "terminal status");
                            return outcome;
                        }
                        Observation::Pending(status) => {
                            tracing::debug!(request_id = %request_id, %status, "not yet terminal");
                            last_status = Some(status);
                        }
                        Observation::Missing => {
                            tracing::warn!(request_id = %request_id, "status missing from certificate, retrying");
                            last_status = Some(RequestStatus::Unknown);
                        }
                    },
                },
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let delay = self.config.policy.next_delay(attempt).min(remaining);
            attempt = attempt.saturating_add(1);
            tokio::time::sleep(delay).await;
        }
    }
}
