// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration — genesis constants and the hash algorithm identifier.

use serde::{Deserialize, Serialize};

use crate::error::BeweisError;
use crate::types::Party;

/// Published genesis value for the claimant (갑) chain.
///
/// Used in place of a previous chain hash for the first record of the chain.
/// An independently built chain over the same inputs and the same genesis
/// constant reproduces identical chain hashes.
pub const GENESIS_GAP: &str = "beweiswerk/chain-genesis/gap/v1";

/// Published genesis value for the respondent (을) chain.
pub const GENESIS_EUL: &str = "beweiswerk/chain-genesis/eul/v1";

/// Content hash algorithm used for a chain.
///
/// Every chain records the algorithm it was built with; mixing algorithms
/// within one chain is refused at open time. Adding a variant here is how a
/// future migration is introduced without breaking old chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    /// Stable identifier persisted in chain metadata.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha-256",
        }
    }

    /// Resolve a persisted identifier back to an algorithm.
    pub fn from_id(id: &str) -> Result<Self, BeweisError> {
        match id {
            "sha-256" => Ok(Self::Sha256),
            other => Err(BeweisError::UnknownAlgorithm(other.to_owned())),
        }
    }
}

/// Engine settings carried explicitly through the pipeline.
///
/// Nothing in the engine reads configuration from globals; callers pass
/// this in, so tests can run with fresh counters and custom genesis
/// values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Algorithm for content and chain hashes.
    pub algorithm: HashAlgorithm,
    /// Genesis constant for the 갑 chain.
    pub genesis_gap: String,
    /// Genesis constant for the 을 chain.
    pub genesis_eul: String,
}

impl EngineConfig {
    /// Genesis constant for the given party's chain.
    pub fn genesis(&self, party: Party) -> &str {
        match party {
            Party::Gap => &self.genesis_gap,
            Party::Eul => &self.genesis_eul,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            genesis_gap: GENESIS_GAP.to_owned(),
            genesis_eul: GENESIS_EUL.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_id_round_trip() {
        let alg = HashAlgorithm::Sha256;
        assert_eq!(HashAlgorithm::from_id(alg.id()).unwrap(), alg);
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let err = HashAlgorithm::from_id("md5").unwrap_err();
        assert!(matches!(err, BeweisError::UnknownAlgorithm(id) if id == "md5"));
    }

    #[test]
    fn default_genesis_differs_per_party() {
        let config = EngineConfig::default();
        assert_ne!(config.genesis(Party::Gap), config.genesis(Party::Eul));
    }
}
