use std::collections::HashMap;
use std::sync::Arc;

use homescan_core::ProfileId;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Handle = Arc<AsyncMutex<()>>;

/// One exclusive lock per profile, created on first use.
#[derive(Default)]
pub struct ProfileLocks {
    map: Mutex<HashMap<ProfileId, Handle>>,
}

impl ProfileLocks {
    fn handle(&self, id: ProfileId) -> Handle {
        self.map.lock().entry(id).or_default().clone()
    }

    /// Fails fast when the profile is busy.
    pub fn try_acquire(&self, id: ProfileId) -> Option<OwnedMutexGuard<()>> {
        self.handle(id).try_lock_owned().ok()
    }

    /// Waits behind whatever currently holds the profile.
    pub async fn acquire(&self, id: ProfileId) -> OwnedMutexGuard<()> {
        self.handle(id).lock_owned().await
    }

    pub fn is_locked(&self, id: ProfileId) -> bool {
        match self.map.lock().get(&id) {
            Some(h) => h.try_lock().is_err(),
            None => false,
        }
    }

    /// Drops the entry of a deleted profile unless someone still holds or
    /// waits on it.
    pub fn forget_if_idle(&self, id: ProfileId) {
        let mut map = self.map.lock();
        if map.get(&id).is_some_and(|h| Arc::strong_count(h) == 1) {
            map.remove(&id);
        }
    }
}
