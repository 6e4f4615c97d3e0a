use std::collections::HashMap;

use mio::Token;

use crate::record::ConnectionRecord;

/// Live connections keyed by their event-loop token. `mio::Token` is a
/// proper typed handle, so unlike the reference server's socket-descriptor
/// keys (biased by one to dodge a reserved zero value), no bias is needed
/// here.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<Token, ConnectionRecord>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    pub fn insert(&mut self, record: ConnectionRecord) {
        let token = record.token();
        relay_utils::safe_assert!(
            self.connections.insert(token, record).is_none(),
            "token already present in connection registry"
        );
    }

    pub fn remove(&mut self, token: Token) -> Option<ConnectionRecord> {
        self.connections.remove(&token)
    }

    pub fn get(&self, token: Token) -> Option<&ConnectionRecord> {
        self.connections.get(&token)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut ConnectionRecord> {
        self.connections.get_mut(&token)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Token, &ConnectionRecord)> {
        self.connections.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Token, &mut ConnectionRecord)> {
        self.connections.iter_mut()
    }

    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.connections.keys().copied()
    }
}
