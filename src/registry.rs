//! Name-keyed table of the agents a runner can switch to.
//!
//! Registration is transitive: registering an agent through
//! [`AgentRegistry::register_reachable`] also registers every agent reachable
//! through its declared handoffs that is not registered yet, so any handoff
//! target named at run time can be resolved. Cyclic handoff graphs are fine; a
//! name is visited once.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

use crate::agent::AgentRef;
use crate::error::{OrchestratorError, Result};

#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentRef>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `agent` under its name. An existing entry with the same name
    /// is replaced.
    pub fn register(&mut self, agent: AgentRef) {
        let name = agent.name().to_string();
        if let Some(previous) = self.agents.insert(name.clone(), agent.clone()) {
            if !same_agent(&previous, &agent) {
                warn!(agent = %name, "replacing a different agent registered under the same name");
            }
        }
    }

    /// Registers `agent` and every agent reachable through handoffs.
    ///
    /// `agent` itself always replaces an entry with its name. A handoff
    /// target whose name is already registered is left alone and not walked,
    /// and names visited during this walk are skipped so cycles terminate.
    pub fn register_reachable(&mut self, agent: AgentRef) {
        let mut visited: HashSet<String> = HashSet::new();
        let mut pending = vec![agent];
        let mut root = true;

        while let Some(next) = pending.pop() {
            let name = next.name().to_string();
            if !visited.insert(name.clone()) {
                continue;
            }
            if !root && self.contains(&name) {
                debug!(agent = %name, "handoff target already registered");
                continue;
            }
            root = false;
            let handoffs = next.handoffs();
            self.register(next);
            debug!(agent = %name, handoffs = handoffs.len(), "registered agent");
            // reverse so targets are walked in declaration order
            pending.extend(handoffs.into_iter().rev());
        }
    }

    pub fn lookup(&self, name: &str) -> Option<AgentRef> {
        self.agents.get(name).cloned()
    }

    /// Like [`lookup`](Self::lookup) but failing with `AgentNotFound`.
    pub fn resolve(&self, name: &str) -> Result<AgentRef> {
        self.lookup(name)
            .ok_or_else(|| OrchestratorError::AgentNotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Checks the handoff graph: no agent may have an empty name and every
    /// declared handoff target must resolve to a registered agent.
    pub fn validate(&self) -> Result<()> {
        for (name, agent) in &self.agents {
            if name.is_empty() {
                return Err(OrchestratorError::InvalidHandoffGraph {
                    message: "agent registered with an empty name".to_string(),
                });
            }
            for target in agent.handoffs() {
                let target_name = target.name();
                if target_name.is_empty() {
                    return Err(OrchestratorError::InvalidHandoffGraph {
                        message: format!("'{}' declares a handoff to an unnamed agent", name),
                    });
                }
                if !self.contains(target_name) {
                    return Err(OrchestratorError::InvalidHandoffGraph {
                        message: format!(
                            "'{}' declares a handoff to unregistered agent '{}'",
                            name, target_name
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn same_agent(a: &AgentRef, b: &AgentRef) -> bool {
    std::ptr::eq(
        std::sync::Arc::as_ptr(a) as *const (),
        std::sync::Arc::as_ptr(b) as *const (),
    )
}
