//! Service context: one place that owns every shared component.
//!
//! Everything downstream borrows from here. No globals; handlers get an
//! `Arc<ServiceContext>` and nothing else.

use std::sync::Arc;

use crate::agent::{ConversationDriver, Dispatcher, PromptCache, TaskClassifier};
use crate::audit::{AuditEmitter, AuditSink, NullAuditSink, StoreAuditSink};
use crate::availability::AvailabilityRegistry;
use crate::config::Config;
use crate::llm::{LlmProvider, create_llm_provider};
use crate::session::{AccessValidator, SessionRegistry};
use crate::store::RecordStoreClient;

pub struct ServiceContext {
    pub config: Config,
    pub store: Arc<RecordStoreClient>,
    pub sessions: Arc<SessionRegistry>,
    pub availability: Arc<AvailabilityRegistry>,
    pub dispatcher: Dispatcher,
}

impl ServiceContext {
    /// Wire up the full service from configuration.
    pub fn new(config: Config) -> Arc<Self> {
        let llm = create_llm_provider(&config.llm);
        let store = Arc::new(RecordStoreClient::new(config.store.clone()));
        let audit = AuditEmitter::new(Arc::new(StoreAuditSink::new(store.clone())));
        let availability = Arc::new(AvailabilityRegistry::new(store.clone()));
        Self::assemble(config, llm, store, audit, availability)
    }

    /// Wiring with an injectable LLM and no store-backed audit or
    /// availability persistence, for tests.
    pub fn with_components(
        config: Config,
        llm: Arc<dyn LlmProvider>,
        store: Arc<RecordStoreClient>,
    ) -> Arc<Self> {
        let audit = AuditEmitter::new(Arc::new(NullAuditSink) as Arc<dyn AuditSink>);
        let availability = Arc::new(AvailabilityRegistry::in_memory());
        Self::assemble(config, llm, store, audit, availability)
    }

    fn assemble(
        config: Config,
        llm: Arc<dyn LlmProvider>,
        store: Arc<RecordStoreClient>,
        audit: AuditEmitter,
        availability: Arc<AvailabilityRegistry>,
    ) -> Arc<Self> {
        let sessions = Arc::new(SessionRegistry::new());
        let validator = Arc::new(AccessValidator::new(
            sessions.clone(),
            audit.clone(),
            config.session.violation_limit,
        ));
        let prompts = Arc::new(PromptCache::new(store.clone()));

        let classifier = TaskClassifier::new(llm.clone());
        let driver = ConversationDriver::new(
            llm,
            validator,
            config.llm.max_turns,
            config.llm.max_tokens,
        );
        let dispatcher = Dispatcher::new(
            classifier,
            driver,
            prompts,
            sessions.clone(),
            availability.clone(),
            audit,
            store.clone(),
        );

        Arc::new(Self {
            config,
            store,
            sessions,
            availability,
            dispatcher,
        })
    }
}
