pub mod collector;
pub mod config;
pub mod helm;
pub mod scheduler;
pub mod server;

/// Common types used across modules
pub mod types {
    use serde::{Deserialize, Deserializer};

    /// One Helm release as reported by `helm list -o json`.
    ///
    /// Helm omits fields for some release states and has emitted `revision`
    /// both as a JSON number and as a numeric string across versions, so
    /// every field carries a default and `revision` accepts either shape.
    #[derive(Debug, Clone, Deserialize)]
    pub struct ReleaseRecord {
        #[serde(default = "default_unknown")]
        pub name: String,
        #[serde(default = "default_namespace")]
        pub namespace: String,
        #[serde(default = "default_unknown")]
        pub chart: String,
        #[serde(default = "default_unknown")]
        pub app_version: String,
        #[serde(default = "default_unknown")]
        pub status: String,
        #[serde(default, deserialize_with = "revision_from_any")]
        pub revision: u64,
        #[serde(default)]
        pub updated: String,
    }

    fn default_unknown() -> String {
        "unknown".to_string()
    }

    fn default_namespace() -> String {
        "default".to_string()
    }

    fn revision_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(n),
            Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }

    /// Closed set of release states helm can report.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ReleaseStatus {
        Failed,
        Unknown,
        Deployed,
        Deleted,
        Superseded,
        Deleting,
        PendingInstall,
        PendingUpgrade,
        PendingRollback,
    }

    impl ReleaseStatus {
        pub const ALL: [ReleaseStatus; 9] = [
            ReleaseStatus::Failed,
            ReleaseStatus::Unknown,
            ReleaseStatus::Deployed,
            ReleaseStatus::Deleted,
            ReleaseStatus::Superseded,
            ReleaseStatus::Deleting,
            ReleaseStatus::PendingInstall,
            ReleaseStatus::PendingUpgrade,
            ReleaseStatus::PendingRollback,
        ];

        /// Exact match against the closed set. `None` means the caller
        /// should substitute `Unknown` (and log the original value).
        pub fn parse(raw: &str) -> Option<ReleaseStatus> {
            match raw {
                "failed" => Some(ReleaseStatus::Failed),
                "unknown" => Some(ReleaseStatus::Unknown),
                "deployed" => Some(ReleaseStatus::Deployed),
                "deleted" => Some(ReleaseStatus::Deleted),
                "superseded" => Some(ReleaseStatus::Superseded),
                "deleting" => Some(ReleaseStatus::Deleting),
                "pending-install" => Some(ReleaseStatus::PendingInstall),
                "pending-upgrade" => Some(ReleaseStatus::PendingUpgrade),
                "pending-rollback" => Some(ReleaseStatus::PendingRollback),
                _ => None,
            }
        }

        pub fn as_str(self) -> &'static str {
            match self {
                ReleaseStatus::Failed => "failed",
                ReleaseStatus::Unknown => "unknown",
                ReleaseStatus::Deployed => "deployed",
                ReleaseStatus::Deleted => "deleted",
                ReleaseStatus::Superseded => "superseded",
                ReleaseStatus::Deleting => "deleting",
                ReleaseStatus::PendingInstall => "pending-install",
                ReleaseStatus::PendingUpgrade => "pending-upgrade",
                ReleaseStatus::PendingRollback => "pending-rollback",
            }
        }
    }

    impl std::fmt::Display for ReleaseStatus {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.as_str())
        }
    }

}
