//! Health classification for GitOps-managed resources.
//!
//! Turns operator-authored health rules — boolean CEL expressions over a
//! resource's live document — into a lifecycle status (`Current`,
//! `InProgress`, `Failed`) with kstatus-style conditions. Rules run in the
//! cost-metered profile of `statuswatch-cel`, so a pathological expression
//! fails one poll instead of stalling the controller.
//!
//! ```
//! use statuswatch_status::{CustomStatusReader, GroupKind, HealthRules, Status, StatusReader};
//!
//! let reader = CustomStatusReader::new(
//!     GroupKind::new("batch", "Job"),
//!     HealthRules {
//!         current: Some("has(self.status.succeeded) && self.status.succeeded >= 1".into()),
//!         failed: Some("has(self.status.failed) && self.status.failed >= 1".into()),
//!         in_progress: None,
//!     },
//! );
//! let job = serde_json::json!({"status": {"succeeded": 1}});
//! assert_eq!(reader.read_status(&job).unwrap().status, Status::Current);
//! ```

mod error;
mod reader;
mod rules;
mod status;

pub use error::{Result, StatusError};
pub use reader::{CustomStatusReader, StatusReader};
pub use rules::{CustomHealthCheck, GroupKind, HealthRules};
pub use status::{Condition, ConditionStatus, ConditionType, Status, StatusResult};
