use crate::companion::CompanionCatalog;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::scene::Scene;

/// Everything a handler needs to know about the server it runs in.
///
/// Built once before the listener starts and shared through an `Arc`; it is
/// dropped only after [`crate::network::Server::shutdown`] has joined every
/// connection task.
pub struct ServerContext {
    pub config: ServerConfig,
    pub catalog: CompanionCatalog,
    pub scene: Scene,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let catalog = CompanionCatalog::new(config.companions.iter().cloned())?;
        Ok(Self {
            config,
            catalog,
            scene: Scene::new(),
        })
    }

    pub fn max_clients(&self) -> usize {
        self.config.max_clients
    }
}
