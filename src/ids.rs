//! Prefixed identifier generation.
//!
//! All engine-minted ids are v4 UUIDs behind a short role prefix, so a bare
//! id in a log line or a database row is self-describing.

use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn session_id(&self) -> String {
        format!("sess-{}", Uuid::new_v4())
    }

    #[must_use]
    pub fn thread_id(&self) -> String {
        format!("thread-{}", Uuid::new_v4())
    }

    #[must_use]
    pub fn world_id(&self) -> String {
        format!("world-{}", Uuid::new_v4())
    }

    #[must_use]
    pub fn clarification_id(&self) -> String {
        format!("clar-{}", Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_role_prefixes_and_are_unique() {
        let ids = IdGenerator::new();
        let a = ids.thread_id();
        let b = ids.thread_id();
        assert!(a.starts_with("thread-"));
        assert_ne!(a, b);
        assert!(ids.session_id().starts_with("sess-"));
        assert!(ids.world_id().starts_with("world-"));
        assert!(ids.clarification_id().starts_with("clar-"));
    }
}
