//! Per-stage active-deploy locks.
//!
//! A stage without `allow_concurrent` runs at most one deploy at a time. The
//! lock is taken when the deploy is confirmed and released when its job
//! reaches a terminal status, never across an await point.

use shipit_core::{Error, ResourceId, Result};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct StageLocks {
    // stage id -> deploy id currently holding the stage
    active: Mutex<HashMap<ResourceId, ResourceId>>,
}

impl StageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `stage_id` for `deploy_id`. Conflicts if another deploy holds
    /// the stage; re-acquiring by the same deploy is a no-op.
    pub fn acquire(&self, stage_id: ResourceId, deploy_id: ResourceId) -> Result<()> {
        let mut active = self.active.lock().expect("stage locks");
        match active.get(&stage_id) {
            Some(holder) if *holder == deploy_id => Ok(()),
            Some(holder) => Err(Error::Conflict(format!(
                "stage {stage_id} is busy with deploy {holder}"
            ))),
            None => {
                active.insert(stage_id, deploy_id);
                Ok(())
            }
        }
    }

    /// Release `stage_id` if it is held by `deploy_id`. Releasing a lock the
    /// deploy does not hold is a no-op, so terminal transitions can always
    /// call this unconditionally.
    pub fn release(&self, stage_id: ResourceId, deploy_id: ResourceId) {
        let mut active = self.active.lock().expect("stage locks");
        if active.get(&stage_id) == Some(&deploy_id) {
            active.remove(&stage_id);
        }
    }

    pub fn holder(&self, stage_id: ResourceId) -> Option<ResourceId> {
        self.active.lock().expect("stage locks").get(&stage_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_deploy_conflicts() {
        let locks = StageLocks::new();
        let stage = ResourceId::new();
        let first = ResourceId::new();
        let second = ResourceId::new();

        locks.acquire(stage, first).unwrap();
        assert!(matches!(
            locks.acquire(stage, second),
            Err(Error::Conflict(_))
        ));

        locks.release(stage, first);
        locks.acquire(stage, second).unwrap();
    }

    #[test]
    fn release_by_non_holder_is_ignored() {
        let locks = StageLocks::new();
        let stage = ResourceId::new();
        let holder = ResourceId::new();

        locks.acquire(stage, holder).unwrap();
        locks.release(stage, ResourceId::new());
        assert_eq!(locks.holder(stage), Some(holder));
    }

    #[test]
    fn stages_lock_independently() {
        let locks = StageLocks::new();
        let deploy = ResourceId::new();
        locks.acquire(ResourceId::new(), deploy).unwrap();
        locks.acquire(ResourceId::new(), deploy).unwrap();
    }
}
