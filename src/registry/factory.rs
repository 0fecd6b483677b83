use crate::config::Config;
use crate::registry::http::HttpTransport;
use crate::registry::retry::RetryPolicy;
use crate::registry::{CurseForgeClient, ModrinthClient, RegistryClient, SourceType};
use std::sync::Arc;

/// One client per registry, all sharing a transport and retry policy.
#[derive(Clone)]
pub struct RegistrySet {
    modrinth: Arc<dyn RegistryClient>,
    curseforge: Arc<dyn RegistryClient>,
}

impl RegistrySet {
    pub fn new(modrinth: Arc<dyn RegistryClient>, curseforge: Arc<dyn RegistryClient>) -> Self {
        Self {
            modrinth,
            curseforge,
        }
    }

    pub fn client(&self, source_type: SourceType) -> &dyn RegistryClient {
        match source_type {
            SourceType::Modrinth => self.modrinth.as_ref(),
            SourceType::CurseForge => self.curseforge.as_ref(),
        }
    }
}

pub struct RegistryFactory;

impl RegistryFactory {
    pub fn create_modrinth(
        transport: Arc<dyn HttpTransport>,
        config: &Config,
    ) -> Arc<dyn RegistryClient> {
        let client = ModrinthClient::new(transport, RetryPolicy::from_config(&config.mods))
            .with_filter(&config.minecraft.version, &config.minecraft.modloader);
        Arc::new(client)
    }

    pub fn create_curseforge(
        transport: Arc<dyn HttpTransport>,
        config: &Config,
    ) -> Arc<dyn RegistryClient> {
        let client = CurseForgeClient::new(
            transport,
            RetryPolicy::from_config(&config.mods),
            config.mods.curseforge_api_key.clone(),
        );
        Arc::new(client)
    }

    pub fn from_config(transport: Arc<dyn HttpTransport>, config: &Config) -> RegistrySet {
        RegistrySet::new(
            Self::create_modrinth(transport.clone(), config),
            Self::create_curseforge(transport, config),
        )
    }
}
