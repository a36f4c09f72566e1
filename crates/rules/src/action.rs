//! Response actions with lattice ordering
//!
//! Ordering: `LogOnly < Alert < Suspend < Rollback < Lockdown`
//!
//! Aggregation: `max(all_actions)` - most severe wins

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum_macros::{Display, EnumString};

/// Response taken when a rule is violated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    /// Record the violation, take no further step
    LogOnly = 1,
    /// Raise an alert to operators
    Alert = 2,
    /// Suspend the operation
    Suspend = 3,
    /// Restore the last SAFE checkpoint
    Rollback = 4,
    /// Roll back and refuse all further operations until released
    Lockdown = 5,
}

impl PartialOrd for Action {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Action {
    fn cmp(&self, other: &Self) -> Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::LogOnly
    }
}

impl Action {
    /// Whether this action requires restoring the last SAFE checkpoint
    pub fn requires_rollback(&self) -> bool {
        *self >= Action::Rollback
    }

    /// Most severe action, or `None` when nothing was violated
    pub fn aggregate(actions: impl IntoIterator<Item = Action>) -> Option<Action> {
        actions.into_iter().max()
    }
}
