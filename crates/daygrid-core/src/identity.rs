use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
}

/// Sign-in boundary. The planner core never calls this; screens and the CLI
/// do, and remote providers plug in behind it.
pub trait IdentityProvider {
    fn sign_in(&self) -> anyhow::Result<UserProfile>;
}

/// Device-local profile kept next to the task data.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    profile_path: PathBuf,
    display_name: String,
}

impl LocalIdentity {
    pub fn new(data_dir: &Path, display_name: &str) -> Self {
        Self {
            profile_path: data_dir.join("profile.json"),
            display_name: display_name.trim().to_string(),
        }
    }
}

impl IdentityProvider for LocalIdentity {
    #[tracing::instrument(skip(self))]
    fn sign_in(&self) -> anyhow::Result<UserProfile> {
        if self.profile_path.exists() {
            let raw = fs::read_to_string(&self.profile_path)
                .with_context(|| format!("failed reading {}", self.profile_path.display()))?;
            let profile: UserProfile = serde_json::from_str(&raw)
                .with_context(|| format!("failed parsing {}", self.profile_path.display()))?;
            debug!(user = %profile.id, "loaded local profile");
            return Ok(profile);
        }

        if self.display_name.is_empty() {
            return Err(anyhow!("cannot create a profile without a display name"));
        }

        let profile = UserProfile {
            id: Uuid::new_v4(),
            display_name: self.display_name.clone(),
        };
        let payload = serde_json::to_string_pretty(&profile)?;
        fs::write(&self.profile_path, payload)
            .with_context(|| format!("failed writing {}", self.profile_path.display()))?;
        info!(user = %profile.id, "created local profile");
        Ok(profile)
    }
}
