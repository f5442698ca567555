//! Persistent key-value storage capability.
//!
//! The shell provides a durable string-keyed store (AsyncStorage on mobile,
//! localStorage on web). The core only ever touches a fixed set of keys,
//! enumerated by [`StorageKey`], so a typo cannot invent a new key at a call
//! site.

use crux_core::capability::{CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// Every key the core persists. The string forms are the storage contract
/// and must not change without a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    UserProfile,
    SearchHistory,
    ParkedLocation,
    AppSettings,
}

impl StorageKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "@access_token",
            Self::RefreshToken => "@refresh_token",
            Self::UserProfile => "@user_info",
            Self::SearchHistory => "@search_history",
            Self::ParkedLocation => "@my_parking_location",
            Self::AppSettings => "@app_settings",
        }
    }

    /// Keys that constitute a signed-in session, removed together on logout
    /// or refresh failure.
    #[must_use]
    pub const fn session_keys() -> [Self; 3] {
        [Self::AccessToken, Self::RefreshToken, Self::UserProfile]
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOperation {
    Get { key: StorageKey },
    Set { key: StorageKey, value: String },
    Remove { key: StorageKey },
    GetMulti { keys: Vec<StorageKey> },
    SetMulti { pairs: Vec<(StorageKey, String)> },
    RemoveMulti { keys: Vec<StorageKey> },
}

impl Operation for KvOperation {
    type Output = KvResult;
}

/// Shell-side results. `Values` preserves the order of the requested keys,
/// with `None` for absent entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOutput {
    Value(Option<String>),
    Values(Vec<Option<String>>),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum KvError {
    #[error("storage failure: {message}")]
    Storage { message: String },

    #[error("storage unavailable")]
    Unavailable,
}

pub type KvResult = Result<KvOutput, KvError>;

pub struct KeyValue<Ev> {
    context: CapabilityContext<KvOperation, Ev>,
}

impl<Ev> crux_core::capability::Capability<Ev> for KeyValue<Ev> {
    type Operation = KvOperation;
    type MappedSelf<MappedEv> = KeyValue<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        KeyValue::new(self.context.map_event(f))
    }
}

impl<Ev> KeyValue<Ev>
where
    Ev: 'static,
{
    #[must_use]
    pub fn new(context: CapabilityContext<KvOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn get<F>(&self, key: StorageKey, callback: F)
    where
        F: Fn(KvResult) -> Ev + Send + Sync + 'static,
    {
        self.run(KvOperation::Get { key }, callback);
    }

    pub fn set<F>(&self, key: StorageKey, value: String, callback: F)
    where
        F: Fn(KvResult) -> Ev + Send + Sync + 'static,
    {
        self.run(KvOperation::Set { key, value }, callback);
    }

    pub fn remove<F>(&self, key: StorageKey, callback: F)
    where
        F: Fn(KvResult) -> Ev + Send + Sync + 'static,
    {
        self.run(KvOperation::Remove { key }, callback);
    }

    pub fn get_multi<F>(&self, keys: Vec<StorageKey>, callback: F)
    where
        F: Fn(KvResult) -> Ev + Send + Sync + 'static,
    {
        self.run(KvOperation::GetMulti { keys }, callback);
    }

    pub fn set_multi<F>(&self, pairs: Vec<(StorageKey, String)>, callback: F)
    where
        F: Fn(KvResult) -> Ev + Send + Sync + 'static,
    {
        self.run(KvOperation::SetMulti { pairs }, callback);
    }

    pub fn remove_multi<F>(&self, keys: Vec<StorageKey>, callback: F)
    where
        F: Fn(KvResult) -> Ev + Send + Sync + 'static,
    {
        self.run(KvOperation::RemoveMulti { keys }, callback);
    }

    fn run<F>(&self, operation: KvOperation, callback: F)
    where
        F: Fn(KvResult) -> Ev + Send + Sync + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context.request_from_shell(operation).await;
            context.update_app(callback(result));
        });
    }
}
