//! Build information and per-module diagnostics, gathered once at startup.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::context::{Context, InstantiationError};
use crate::module::{DebugContributors, Module};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugData {
    pub version: String,
    pub architecture: String,
    /// Every registered module id, sorted.
    pub modules: Vec<String>,
    /// Final flag values, rendered the way they would be typed.
    pub flags: BTreeMap<String, String>,
    pub modules_additional_data: BTreeMap<String, serde_json::Value>,
}

impl DebugData {
    /// Invokes every debug contributor exactly once.
    pub fn build(ctx: &Context, version: &str) -> Result<Self, InstantiationError> {
        let mut modules: Vec<String> = ctx
            .descriptors()
            .iter()
            .map(|d| d.id.to_string())
            .collect();
        modules.sort();

        let flags = ctx
            .flags()
            .iter()
            .map(|(flag, value)| (flag.name.clone(), value.to_string()))
            .collect();

        let mut modules_additional_data = BTreeMap::new();
        for contributor in ctx.modules::<DebugContributors>()? {
            let id = contributor.descriptor().id;
            modules_additional_data.insert(id.to_string(), contributor.debug());
        }

        let data = Self {
            version: version.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            modules,
            flags,
            modules_additional_data,
        };

        match serde_json::to_string(&data) {
            Ok(json) => debug!(debug_data = %json, "debug data built"),
            Err(err) => debug!(error = %err, "debug data is not serializable"),
        }

        Ok(data)
    }
}
