//! Agent registry — built-in manifests plus YAML-loaded extras.

use std::collections::BTreeMap;
use std::path::Path;

use qm_domain::agent::{AgentManifest, AgentPriority};
use qm_domain::error::{Error, Result};

/// All known agents, keyed by id. Built as an explicit handle and
/// threaded through the scheduler and executor — no global state.
pub struct AgentRegistry {
    manifests: BTreeMap<String, AgentManifest>,
}

fn manifest(
    id: &str,
    display_name: &str,
    description: &str,
    priority: AgentPriority,
    cooldown_s: u64,
) -> AgentManifest {
    AgentManifest {
        id: id.into(),
        display_name: display_name.into(),
        description: description.into(),
        cost_estimate: 500,
        cooldown_s,
        priority,
        version: 1,
    }
}

impl AgentRegistry {
    /// The built-in agent population across the seven agencies.
    pub fn builtin() -> Self {
        let manifests = [
            manifest(
                "inhibition.censor",
                "Censor",
                "Flags content that should temper or suppress the response",
                AgentPriority::AlwaysOn,
                0,
            ),
            manifest(
                "monitoring.trigger_watcher",
                "Trigger Watcher",
                "Watches for markers that warrant attention this turn",
                AgentPriority::AlwaysOn,
                0,
            ),
            manifest(
                "monitoring.anomaly_detector",
                "Anomaly Detector",
                "Notices departures from the conversation's usual shape",
                AgentPriority::Monitor,
                30,
            ),
            manifest(
                "emotion.stress",
                "Stress Reader",
                "Assesses acute stress and overload signals",
                AgentPriority::Normal,
                30,
            ),
            manifest(
                "emotion.wellbeing",
                "Wellbeing Reader",
                "Tracks overall wellbeing and recovery signals",
                AgentPriority::Normal,
                30,
            ),
            manifest(
                "emotion.attunement",
                "Attunement",
                "Names the feeling under the words",
                AgentPriority::Normal,
                30,
            ),
            manifest(
                "reasoning.analyst",
                "Analyst",
                "Breaks a stated problem into decidable parts",
                AgentPriority::Normal,
                30,
            ),
            manifest(
                "reasoning.options",
                "Options Builder",
                "Drafts small reversible next steps when advice is wanted",
                AgentPriority::Normal,
                30,
            ),
            manifest(
                "social.norms",
                "Norms",
                "Checks social stakes and appropriateness",
                AgentPriority::Monitor,
                30,
            ),
            manifest(
                "social.relationships",
                "Relationships",
                "Reads the relational bid and what it asks for",
                AgentPriority::Normal,
                30,
            ),
            manifest(
                "planning.short_term",
                "Short-Term Planner",
                "Surfaces imminent commitments and deadlines",
                AgentPriority::Normal,
                30,
            ),
            manifest(
                "resource.time",
                "Time Keeper",
                "Estimates time pressure on the user",
                AgentPriority::Monitor,
                30,
            ),
            manifest(
                "resource.energy",
                "Energy Reader",
                "Estimates fatigue and capacity",
                AgentPriority::Normal,
                30,
            ),
        ];

        Self {
            manifests: manifests
                .into_iter()
                .map(|m| (m.id.clone(), m))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            manifests: BTreeMap::new(),
        }
    }

    /// Register one manifest, replacing any previous entry with the id.
    pub fn register(&mut self, manifest: AgentManifest) {
        self.manifests.insert(manifest.id.clone(), manifest);
    }

    /// Load `*.yaml` manifests from a directory. Returns how many were
    /// loaded; a missing directory is not an error.
    pub fn load_yaml_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut loaded = 0;
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "yaml" || ext == "yml"))
            .collect();
        entries.sort();

        for path in entries {
            let raw = std::fs::read_to_string(&path)?;
            let manifest: AgentManifest = serde_yaml::from_str(&raw).map_err(|e| {
                Error::Config(format!("manifest {}: {e}", path.display()))
            })?;
            tracing::debug!(agent_id = %manifest.id, path = %path.display(), "loaded agent manifest");
            self.register(manifest);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentManifest> {
        self.manifests.get(agent_id)
    }

    /// All manifests in id order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentManifest> {
        self.manifests.values()
    }

    /// Ids of every always-on agent, in id order.
    pub fn always_on(&self) -> Vec<String> {
        self.manifests
            .values()
            .filter(|m| m.priority == AgentPriority::AlwaysOn)
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}
