//! Wiring: builds the planner stack from configuration

use std::sync::Arc;

use eyre::{Context, Result};
use sessionstore::Clock;
use tracing::{info, warn};

use crate::config::Config;
use crate::extract::{KeywordExtractor, ModelExtractor, ResilientExtractor, TripExtractor};
use crate::graph::TaskGraphBuilder;
use crate::llm;
use crate::orchestrator::{HttpDispatcher, Orchestrator};
use crate::planning::PlanningEngine;
use crate::registry;
use crate::session::{ConversationStore, PlannerService};

/// Model extraction when usable, keyword extraction otherwise or as fallback
pub fn build_extractor(config: &Config) -> Result<Arc<dyn TripExtractor>> {
    let keyword: Arc<dyn TripExtractor> =
        Arc::new(KeywordExtractor::new().context("Failed to compile keyword patterns")?);

    let primary: Option<Arc<dyn TripExtractor>> = if config.model_available() {
        match llm::create_client(&config.llm) {
            Ok(client) => {
                info!(model = %config.llm.model, "build_extractor: using model extraction");
                Some(Arc::new(ModelExtractor::new(client, config.llm.max_tokens)))
            }
            Err(e) => {
                warn!(error = %e, "build_extractor: model unavailable, using keyword extraction");
                None
            }
        }
    } else {
        info!("build_extractor: model disabled or no API key, using keyword extraction");
        None
    };

    Ok(match primary {
        Some(primary) => Arc::new(ResilientExtractor::new(
            Some(primary),
            Some(keyword),
            config.extraction.clone(),
        )),
        None => keyword,
    })
}

/// Planning engine, session service, registry and dispatcher
pub fn build_orchestrator(config: &Config, clock: Arc<dyn Clock>) -> Result<Orchestrator> {
    let extractor = build_extractor(config)?;
    let builder = TaskGraphBuilder::new().context("Failed to register task templates")?;
    let engine = PlanningEngine::new(extractor, builder, clock.clone(), config.conversation.clone());

    let store = ConversationStore::spawn(clock.clone(), config.conversation.session_ttl());
    let service = PlannerService::new(Arc::new(engine), store);

    let resolver = registry::build_resolver(&config.registry, clock).context("Failed to build agent registry")?;
    let dispatcher = HttpDispatcher::new(config.dispatch.timeout()).context("Failed to build dispatcher")?;

    Ok(Orchestrator::new(service, resolver, Arc::new(dispatcher), config.dispatch.clone()))
}
