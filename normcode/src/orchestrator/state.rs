//! The checkpointable snapshot: everything needed to resume a run except
//! the plan artifacts themselves (those are reloaded by the caller and
//! passed back into `Orchestrator::load_checkpoint`/`fork_checkpoint`).

use serde::{Deserialize, Serialize};

use crate::blackboard::Blackboard;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub blackboard: Blackboard,
    pub workspace: Workspace,
    pub cycle: u64,
    pub inference_count: u64,
}
