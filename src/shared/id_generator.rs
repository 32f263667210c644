use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// IdGenerator trait for abstracting UUID generation
/// Used for poll cycle ids and HTTP request ids
pub trait IdGenerator: Send + Sync {
    /// Generate a new UUID v4 in hyphenated lowercase format
    fn uuid_v4(&self) -> String;
}

/// Production implementation of IdGenerator using random UUID generation
#[derive(Debug, Clone, Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for RandomIdGenerator {
    fn uuid_v4(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Test implementation of IdGenerator returning a fixed sequence
/// When the list is exhausted, it wraps around to the beginning
#[derive(Debug, Clone)]
pub struct FixedIdGenerator {
    uuids: Vec<String>,
    index: Arc<Mutex<usize>>,
}

impl FixedIdGenerator {
    pub fn new(uuids: Vec<String>) -> Self {
        Self {
            uuids,
            index: Arc::new(Mutex::new(0)),
        }
    }

    pub fn single(uuid: impl Into<String>) -> Self {
        Self::new(vec![uuid.into()])
    }
}

impl IdGenerator for FixedIdGenerator {
    fn uuid_v4(&self) -> String {
        if self.uuids.is_empty() {
            return Uuid::nil().to_string();
        }
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        let uuid = self.uuids[*index % self.uuids.len()].clone();
        *index += 1;
        uuid
    }
}
