// src/core/session.rs

use crate::core::backend::SuiteBackend;
use crate::core::resolver::Resolver;
use crate::core::settings::Settings;
use crate::models::RunStatistics;
use crate::state::History;

/// Everything commands act on during one launcher run.
#[derive(Debug)]
pub struct Session {
    resolver: Resolver,
    settings: Settings,
    history: Option<History>,
    statistics: RunStatistics,
}

impl Session {
    pub fn new(backend: Box<dyn SuiteBackend>, settings: Settings, history: Option<History>) -> Self {
        Self {
            resolver: Resolver::new(backend),
            settings,
            history,
            statistics: RunStatistics::default(),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn history(&self) -> Option<&History> {
        self.history.as_ref()
    }

    pub fn history_mut(&mut self) -> Option<&mut History> {
        self.history.as_mut()
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.statistics
    }

    pub fn statistics_mut(&mut self) -> &mut RunStatistics {
        &mut self.statistics
    }

    /// Disposes the configuration and hands back the history for saving.
    pub fn finish(mut self) -> Option<History> {
        self.resolver.dispose();
        self.history
    }
}
