//! Replica set membership resolution with first-success short-circuit.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AuditError, FailureKind, ProbeFailure};
use crate::probe::NodeProbe;
use crate::types::NodeAddress;

/// One candidate that failed to report membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFailure {
    /// Address that was tried.
    pub candidate: NodeAddress,
    /// Why it did not answer.
    pub reason: String,
}

/// Every candidate of a replica set failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipFailure {
    /// Attempts in the order they were made.
    pub attempts: Vec<CandidateFailure>,
}

impl MembershipFailure {
    /// Candidate tried last; the error entry for the replica set is keyed by it.
    pub fn last_candidate(&self) -> Option<&NodeAddress> {
        self.attempts.last().map(|a| &a.candidate)
    }

    /// Last attempted candidate for which `is_free` holds.
    pub fn last_candidate_where<F>(&self, mut is_free: F) -> Option<&NodeAddress>
    where
        F: FnMut(&NodeAddress) -> bool,
    {
        self.attempts
            .iter()
            .rev()
            .map(|a| &a.candidate)
            .find(|c| is_free(c))
    }

    /// Every candidate with its individual failure.
    pub fn reason(&self) -> String {
        let detail: Vec<String> = self
            .attempts
            .iter()
            .map(|a| format!("{}: {}", a.candidate, a.reason))
            .collect();
        let candidates: Vec<&str> = self.attempts.iter().map(|a| a.candidate.as_str()).collect();
        let err = AuditError::MembershipResolutionFailure {
            candidates: candidates.join(","),
        };
        format!("{} ({})", err, detail.join("; "))
    }

    /// Error entry for the replica set keyed by `address`.
    pub fn failure_at(&self, address: NodeAddress) -> ProbeFailure {
        ProbeFailure::new(
            address,
            FailureKind::MembershipResolutionFailure,
            self.reason(),
        )
    }

    /// Converts into the single error entry recorded for the replica set.
    ///
    /// Returns `None` when no candidate was given at all.
    pub fn into_probe_failure(self) -> Option<ProbeFailure> {
        let address = self.last_candidate()?.clone();
        Some(self.failure_at(address))
    }
}

/// Tries replica set candidates strictly in order.
pub struct FailoverResolver<'a> {
    probe: &'a NodeProbe,
}

impl<'a> FailoverResolver<'a> {
    /// Resolver issuing membership queries through `probe`.
    pub fn new(probe: &'a NodeProbe) -> Self {
        Self { probe }
    }

    /// Returns the member list reported by the first candidate that answers.
    ///
    /// Remaining candidates are never contacted once one succeeds.
    pub async fn resolve_membership(
        &self,
        candidates: &[NodeAddress],
    ) -> Result<Vec<NodeAddress>, MembershipFailure> {
        let mut attempts = Vec::new();
        for candidate in candidates {
            match self.probe.peers(candidate).await {
                Ok(members) => {
                    debug!(%candidate, members = members.len(), "resolved replica set membership");
                    return Ok(members);
                }
                Err(e) => {
                    warn!(%candidate, error = %e, "candidate failed to report membership");
                    attempts.push(CandidateFailure {
                        candidate: candidate.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Err(MembershipFailure { attempts })
    }
}
