//! The persistence configuration shared by a unit of work and its workers.

use crate::config::DataSourceConfig;

/// Immutable description of where a unit of work persists to.
///
/// Shared as `Arc<PersistenceConfiguration>`; "changing" the configuration
/// means binding a different instance to a context.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceConfiguration {
    pub data_source: DataSourceConfig,
    /// Whether file contents are stored alongside file metadata.
    pub persist_file_content: bool,
}

impl PersistenceConfiguration {
    pub fn new(data_source: DataSourceConfig) -> Self {
        Self {
            data_source,
            persist_file_content: false,
        }
    }

    pub fn with_file_content(mut self, persist: bool) -> Self {
        self.persist_file_content = persist;
        self
    }
}
