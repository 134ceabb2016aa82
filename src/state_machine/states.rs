use serde::{Deserialize, Serialize};
use std::fmt;

/// Substages of a compute removal task, in protocol order
///
/// The derived ordering follows declaration order and is what the
/// forward-only transition guard relies on. `Error` is placed last and is
/// reachable from every non-terminal substage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalSubStage {
    /// Task accepted, nothing dispatched yet
    Created,
    /// Best-effort suspension of every compute has been attempted
    Suspended,
    /// Container host removal sub-workflow dispatched
    RemovingContainerHosts,
    /// Container host roles are gone (or there were none)
    RemovedContainerHosts,
    /// Reservation release fan-out in flight
    Deallocating,
    /// Quotas released (or skipped)
    Deallocated,
    /// Provider resource removal sub-workflow submitted, awaiting its outcome
    RemovingResources,
    /// Task finished successfully
    Completed,
    /// Task finished with a failure
    Error,
}

impl RemovalSubStage {
    /// Terminal substages accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Substages that only mark an operation in flight; they are retired by
    /// exactly one continuation and never rest
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RemovingContainerHosts | Self::Deallocating | Self::RemovingResources
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Whether moving from `self` to `target` respects the protocol: strictly
    /// forward, or into `Error` from any non-terminal substage
    pub fn can_transition_to(&self, target: RemovalSubStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if target == Self::Error {
            return true;
        }
        target > *self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Suspended => "SUSPENDED",
            Self::RemovingContainerHosts => "REMOVING_CONTAINER_HOSTS",
            Self::RemovedContainerHosts => "REMOVED_CONTAINER_HOSTS",
            Self::Deallocating => "DEALLOCATING",
            Self::Deallocated => "DEALLOCATED",
            Self::RemovingResources => "REMOVING_RESOURCES",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for RemovalSubStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RemovalSubStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "SUSPENDED" => Ok(Self::Suspended),
            "REMOVING_CONTAINER_HOSTS" => Ok(Self::RemovingContainerHosts),
            "REMOVED_CONTAINER_HOSTS" => Ok(Self::RemovedContainerHosts),
            "DEALLOCATING" => Ok(Self::Deallocating),
            "DEALLOCATED" => Ok(Self::Deallocated),
            "REMOVING_RESOURCES" => Ok(Self::RemovingResources),
            "COMPLETED" => Ok(Self::Completed),
            "ERROR" => Ok(Self::Error),
            _ => Err(format!("Invalid removal substage: {s}")),
        }
    }
}

impl Default for RemovalSubStage {
    fn default() -> Self {
        Self::Created
    }
}

/// Terminal stage reported by a delegated sub-workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildTaskStage {
    Created,
    Started,
    Finished,
    Failed,
    Cancelled,
}

impl ChildTaskStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }

    /// Failure and cancellation are handled identically by the orchestrator
    pub fn is_unsuccessful(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ChildTaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
