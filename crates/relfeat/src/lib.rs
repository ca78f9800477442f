//! `relfeat`: convenience façade over `relfeat-core`, `relfeat-shared` and,
//! with feature `mysql`, `relfeat-mysql`.

#![deny(missing_docs)]

/// Re-export **everything** from relfeat-core at the crate root, so users can `use relfeat::*;`.
#[doc(inline)]
pub use relfeat_core::*;

/// Also expose relfeat-core as a nested module for `relfeat::core::...` paths.
pub use relfeat_core as core;

/// Configuration and observability bootstrap.
pub use relfeat_shared as shared;

/// MySQL connection provider.
#[cfg(feature = "mysql")]
#[doc(inline)]
pub use relfeat_mysql::MySqlConnectionManager;

use relfeat_shared::{CacheConfig, EngineConfig};

/// Engine options taken from the `engine` configuration section.
pub fn build_options(config: &EngineConfig) -> BuildOptions {
    BuildOptions {
        table_alias: config.table_alias.clone(),
        null_escalation: config.null_escalation,
    }
}

/// The identity cache described by the `cache` section, if enabled.
pub fn feature_cache(config: &CacheConfig) -> Option<LruFeatureCache> {
    config.enabled.then(|| LruFeatureCache::new(config.capacity))
}
