//! design-corpus - Design system corpus service
//!
//! This is the composition root that wires together all the components.

use design_corpus::adapters::outbound::JsonCorpusLoader;
use design_corpus::application::DataManager;
use design_corpus::config::load_config;
use design_corpus::domain::ports::CorpusLoader;
use design_corpus::infrastructure::{shutdown_signal, CircuitBreakerRegistry, DataEvent};
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting design-corpus data_dir={:?} watching={} cache_timeout={}s",
        cfg.data_dir,
        cfg.file_watching,
        cfg.cache_timeout_secs
    );

    // ===== COMPOSITION ROOT =====

    // 1. Shared breaker registry
    let registry = CircuitBreakerRegistry::new();

    // 2. Outbound adapter
    let loader: Arc<dyn CorpusLoader> = Arc::new(JsonCorpusLoader::new());

    // 3. Data manager
    let data_manager = DataManager::new(cfg.data_manager_config(), loader, &registry)?;
    data_manager.events().subscribe(|event| match event {
        DataEvent::DataLoaded(snapshot) => {
            tracing::info!(records = snapshot.record_count(), "corpus available");
        }
        DataEvent::DataLoadFailed(errors) => {
            for error in errors {
                tracing::warn!("corpus error: {}", error);
            }
        }
        DataEvent::FileChanged => {}
    });

    let initial = match data_manager.initialize().await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("failed to load corpus from {:?}: {}", cfg.data_dir, e);
            for suggestion in e.suggestions() {
                tracing::error!("  {}", suggestion);
            }
            data_manager.destroy();
            return Err(e.into());
        }
    };
    if !initial.success {
        tracing::warn!(
            errors = initial.errors.len(),
            "starting without a snapshot; fix the corpus files to trigger a reload"
        );
    }

    // 4. Run until asked to stop
    let reason = shutdown_signal().await;
    data_manager.destroy();

    for breaker in registry.snapshots() {
        tracing::info!(
            name = %breaker.name,
            state = %breaker.state,
            total_calls = breaker.total_calls,
            total_failures = breaker.total_failures,
            "circuit breaker summary"
        );
    }

    let reason = reason?;
    tracing::info!("shutdown complete ({})", reason);
    Ok(())
}
