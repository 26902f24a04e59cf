// Storage capabilities
// Durable (survives reload) and ephemeral (tab lifetime) key-value stores

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// String key-value storage
///
/// Implementations never fail to the caller: backend errors are logged and
/// treated as absence (reads) or as a no-op (writes).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);

    /// Write several keys together. Backends that can do so atomically override this.
    fn set_many(&self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    /// Remove several keys together.
    fn remove_many(&self, keys: &[&str]) {
        for key in keys {
            self.remove(key);
        }
    }
}
