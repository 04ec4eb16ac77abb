//! Research session state: MetaStore persistence with a cache mirror.
//!
//! The MetaStore row is authoritative; the cache copy only accelerates
//! resume. Updates are last-writer-wins; a session has one owner.

use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use spaces_cache::RevisionedCache;
use spaces_core::defaults::RESEARCH_MESSAGE_RETENTION;
use spaces_core::{ResearchMessage, ResearchSession, Result, Tenant};
use spaces_db::PgResearchSessionRepository;

/// Cache TTL for the session mirror.
const SESSION_MIRROR_TTL: Duration = Duration::from_secs(86_400);

/// Loads and saves research sessions.
#[derive(Clone)]
pub struct SessionStore {
    repo: PgResearchSessionRepository,
    cache: RevisionedCache,
}

impl SessionStore {
    pub fn new(repo: PgResearchSessionRepository, cache: RevisionedCache) -> Self {
        Self { repo, cache }
    }

    fn mirror_key(tenant: Tenant, conversation_id: &str) -> String {
        format!("dr:{}:{}", tenant.key_fragment(), conversation_id)
    }

    /// Start a new conversation, returning its id.
    pub async fn start(&self, tenant: Tenant) -> Result<String> {
        let conversation_id = Uuid::new_v4().simple().to_string()[..12].to_string();
        self.repo.ensure(&conversation_id, tenant, None).await?;
        debug!(
            subsystem = "research",
            component = "session",
            op = "start",
            conversation_id,
            user_id = tenant.user_id,
            "Conversation started"
        );
        Ok(conversation_id)
    }

    /// Load messages for a conversation: cache mirror first, MetaStore on
    /// miss. Ownership is always verified against the MetaStore row.
    pub async fn load(&self, tenant: Tenant, conversation_id: &str) -> Result<ResearchSession> {
        // The authoritative row also enforces ownership, so it is loaded
        // unconditionally; the mirror only supplies newer messages when the
        // row write lost a race with the mirror write.
        let mut session = self.repo.load(conversation_id, tenant.user_id).await?;

        let key = Self::mirror_key(tenant, conversation_id);
        if let Some(mirrored) = self.cache.get_json::<Vec<ResearchMessage>>(&key).await {
            if mirrored.len() > session.messages.len() {
                session.messages = mirrored;
            }
        }
        if session.messages.len() > RESEARCH_MESSAGE_RETENTION {
            let excess = session.messages.len() - RESEARCH_MESSAGE_RETENTION;
            session.messages.drain(..excess);
        }
        Ok(session)
    }

    /// Persist the session's messages and refresh the mirror.
    pub async fn save(&self, tenant: Tenant, session: &ResearchSession) -> Result<()> {
        self.repo
            .save_messages(&session.conversation_id, tenant.user_id, &session.messages)
            .await?;
        let key = Self::mirror_key(tenant, &session.conversation_id);
        self.cache
            .set_json(&key, &session.messages, SESSION_MIRROR_TTL)
            .await;
        Ok(())
    }

    pub fn repo(&self) -> &PgResearchSessionRepository {
        &self.repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_key_is_tenant_scoped() {
        let a = SessionStore::mirror_key(Tenant::new(1, Some(2)), "abc");
        let b = SessionStore::mirror_key(Tenant::new(1, Some(3)), "abc");
        let c = SessionStore::mirror_key(Tenant::new(2, Some(2)), "abc");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, "dr:1:2:abc");
    }
}
