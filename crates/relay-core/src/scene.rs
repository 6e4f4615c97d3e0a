use std::collections::{HashMap, HashSet};

use mio::Token;
use relay_utils::hex_id::HexIdCounter;
use relay_utils::HexId;

/// A fan-out group: every member token receives every other member's `SET`s.
#[derive(Debug)]
pub struct Scene {
    pub id: HexId,
    pub scene_url: String,
    pub scene_name: String,
    members: HashSet<Token>,
}

impl Scene {
    pub fn members(&self) -> impl Iterator<Item = &Token> {
        self.members.iter()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, token: Token) -> bool {
        self.members.contains(&token)
    }
}

/// Scenes indexed by URL (the canonical store) with a secondary id → url
/// index for `SCID`-based lookups. Keeping one owner per `Scene` avoids the
/// pointer-to-pointer-style double bookkeeping of the reference registry
/// while still answering both kinds of lookup in O(1).
#[derive(Debug, Default)]
pub struct SceneRegistry {
    by_url: HashMap<String, Scene>,
    url_by_id: HashMap<HexId, String>,
    next_id: HexIdCounter,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self {
            by_url: HashMap::new(),
            url_by_id: HashMap::new(),
            next_id: HexIdCounter::starting_at(0x20000),
        }
    }

    pub fn find_by_url(&self, url: &str) -> Option<&Scene> {
        self.by_url.get(url)
    }

    pub fn find_by_id(&self, id: HexId) -> Option<&Scene> {
        self.url_by_id.get(&id).and_then(|url| self.by_url.get(url))
    }

    /// Creates a scene for `url`/`name` with `creator` as its first member.
    /// Panics (debug) / logs (release) if `url` already has a scene — callers
    /// must check `find_by_url` first.
    pub fn create(&mut self, url: &str, name: &str, creator: Token) -> HexId {
        relay_utils::safe_assert!(!self.by_url.contains_key(url), "scene already exists for url");
        let id = self.next_id.next_id();
        let mut members = HashSet::new();
        members.insert(creator);
        self.by_url.insert(
            url.to_string(),
            Scene {
                id,
                scene_url: url.to_string(),
                scene_name: name.to_string(),
                members,
            },
        );
        self.url_by_id.insert(id, url.to_string());
        id
    }

    pub fn join(&mut self, url: &str, member: Token) -> bool {
        match self.by_url.get_mut(url) {
            Some(scene) => {
                scene.members.insert(member);
                true
            }
            None => false,
        }
    }

    /// Removes `member` from `url`'s scene; destroys the scene if it is now
    /// empty. Returns whether the scene was destroyed.
    pub fn leave(&mut self, url: &str, member: Token) -> bool {
        let Some(scene) = self.by_url.get_mut(url) else {
            return false;
        };
        scene.members.remove(&member);
        if scene.is_empty() {
            let id = scene.id;
            self.by_url.remove(url);
            self.url_by_id.remove(&id);
            true
        } else {
            false
        }
    }

    pub fn scene_count(&self) -> usize {
        self.by_url.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_adds_creator_as_first_member() {
        let mut registry = SceneRegistry::new();
        let id = registry.create("https://scene", "Name", Token(1));
        let scene = registry.find_by_id(id).unwrap();
        assert_eq!(scene.member_count(), 1);
        assert!(scene.contains(Token(1)));
    }

    #[test]
    fn leave_destroys_scene_once_empty() {
        let mut registry = SceneRegistry::new();
        registry.create("https://scene", "Name", Token(1));
        registry.join("https://scene", Token(2));

        assert!(!registry.leave("https://scene", Token(1)));
        assert!(registry.find_by_url("https://scene").is_some());

        assert!(registry.leave("https://scene", Token(2)));
        assert!(registry.find_by_url("https://scene").is_none());
    }

    #[test]
    fn ids_start_at_the_scene_base_and_increment() {
        let mut registry = SceneRegistry::new();
        let first = registry.create("a", "A", Token(1));
        let second = registry.create("b", "B", Token(2));
        assert_eq!(first.get(), 0x20000);
        assert_eq!(second.get(), 0x20001);
    }
}
