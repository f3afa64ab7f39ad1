//! Trained policy artifacts
//!
//! An artifact carries the exported actors, optionally the critic, and the
//! [`ModelSignature`] they were trained for. Loading through
//! [`PolicyArtifact::load_checked`] rejects models built for another layout.

use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    codec::{ModelSignature, ACTION_DIM},
    error::SkyBattleError,
    policy::{CriticModel, PolicySnapshot, RolePolicies},
};

/// Exported weights plus the shapes they expect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyArtifact {
    pub signature: ModelSignature,
    /// Trainer update count at export
    pub version: u64,
    pub actors: RolePolicies,
    pub critic: Option<CriticModel>,
}

impl PolicyArtifact {
    pub fn new(signature: ModelSignature, version: u64, actors: RolePolicies, critic: Option<CriticModel>) -> Self {
        Self { signature, version, actors, critic }
    }

    /// Capture a snapshot's weights
    pub fn from_snapshot(signature: ModelSignature, snapshot: &PolicySnapshot) -> Self {
        Self {
            signature,
            version: snapshot.version,
            actors: (*snapshot.actors).clone(),
            critic: snapshot.critic.as_deref().cloned(),
        }
    }

    pub fn into_snapshot(self) -> PolicySnapshot {
        PolicySnapshot::new(self.version, self.actors, self.critic)
    }

    /// Check the stored weights agree with the declared signature
    pub fn validate(&self) -> Result<()> {
        let mismatch = |found: String| -> Result<()> {
            Err(SkyBattleError::SignatureMismatch { expected: self.signature.to_string(), found }.into())
        };

        if self.signature.action_dim != ACTION_DIM {
            return mismatch(format!("action={}", ACTION_DIM));
        }
        if !self.actors.is_consistent() {
            return mismatch("inconsistent actor layers".to_string());
        }
        match self.actors.obs_dim() {
            Some(dim) if dim == self.signature.obs_dim => {}
            Some(dim) => return mismatch(format!("obs={dim}")),
            None => return mismatch("actors disagree on observation size".to_string()),
        }
        if let Some(critic) = &self.critic {
            if !critic.is_consistent() {
                return mismatch("inconsistent critic layers".to_string());
            }
            if critic.state_dim() != self.signature.state_dim {
                return mismatch(format!("state={}", critic.state_dim()));
            }
        }
        Ok(())
    }

    /// Save artifact to JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load artifact from JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let artifact = serde_json::from_str(&contents)?;
        Ok(artifact)
    }

    /// Save artifact to binary format (bincode)
    /// Only available with the "training" feature
    #[cfg(feature = "training")]
    pub fn save_bincode<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = bincode::serialize(self)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load artifact from binary format (bincode)
    /// Only available with the "training" feature
    #[cfg(feature = "training")]
    pub fn load_bincode<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let artifact = bincode::deserialize(&buffer)?;
        Ok(artifact)
    }

    /// Save as bincode for a `.bin` path and JSON otherwise
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if is_binary(path) {
            #[cfg(feature = "training")]
            return self.save_bincode(path);
            #[cfg(not(feature = "training"))]
            anyhow::bail!("bincode artifacts require the training feature: {}", path.display());
        }
        self.save_json(path)
    }

    /// Load an artifact and reject it unless it matches `expected`
    pub fn load_checked<P: AsRef<Path>>(path: P, expected: &ModelSignature) -> Result<Self> {
        let path = path.as_ref();
        let artifact = if is_binary(path) {
            #[cfg(feature = "training")]
            {
                Self::load_bincode(path)
            }
            #[cfg(not(feature = "training"))]
            {
                Err(anyhow::anyhow!("bincode artifacts require the training feature"))
            }
        } else {
            Self::load_json(path)
        }
        .with_context(|| format!("failed to load policy artifact {}", path.display()))?;

        expected.ensure_matches(&artifact.signature)?;
        artifact.validate()?;
        tracing::info!(path = %path.display(), version = artifact.version, "loaded policy artifact");
        Ok(artifact)
    }
}

fn is_binary(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "bin")
}
