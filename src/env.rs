//! Execution environment detection.

use std::fmt;

use tracing::info;

use crate::gcp::MetadataProbe;

/// Cloud project the production server runs in.
pub const PROD_PROJECT: &str = "camlistore-website";
/// Instance name of the production server.
pub const PROD_INSTANCE: &str = "camweb";
/// Where production clones the source tree; the website root lives below it.
pub const PROD_SRC_DIR: &str = "/var/camweb/src/camlistore.org";

/// Where the process runs. Decided once at startup, then passed to whatever
/// needs it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Asks the metadata server who we are. Production requires the
    /// production project and instance; anything else, including lookup
    /// failures, is development.
    pub async fn detect(probe: &dyn MetadataProbe) -> Self {
        if !probe.on_gce().await {
            return Self::Development;
        }
        let project = probe.project_id().await.unwrap_or_default();
        let instance = probe.instance_name().await.unwrap_or_default();
        info!(project = %project, instance = %instance, "running on GCE");
        if project == PROD_PROJECT && instance == PROD_INSTANCE {
            Self::Production
        } else {
            Self::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
        })
    }
}
