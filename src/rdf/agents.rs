use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::xml::{Element, PGTERMS, RDF};

static AGENT_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^2009/agents/(\d+)$").unwrap());

/// An author or editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub id: u64,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Creator,
    Editor,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::Creator => "creator",
            Role::Editor => "editor",
        }
    }
}

#[derive(Debug)]
struct CachedAgent {
    name: String,
    aliases: Vec<String>,
}

/// Agents declared inline so far, for resolving later back-references.
///
/// Filled in processing order and never evicted: a reference can only
/// resolve against an agent declared by an earlier document (or earlier in
/// the same one). The first declaration of an id is the one kept.
#[derive(Debug, Default)]
pub struct ContributorCache {
    agents: HashMap<u64, CachedAgent>,
}

impl ContributorCache {
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Resolve a `dcterms:creator` / `marcrel:edt` entry. Unresolvable
    /// entries are logged and yield `None`.
    pub fn resolve(&mut self, entry: &Element, book_id: u64, role: Role) -> Option<Contributor> {
        match entry.find(PGTERMS, "agent") {
            Some(agent) => self.declare(agent, book_id, role),
            None => self.lookup(entry, book_id, role),
        }
    }

    fn declare(&mut self, agent: &Element, book_id: u64, role: Role) -> Option<Contributor> {
        let Some(id) = agent.attr(RDF, "about").and_then(agent_id) else {
            warn!("Unrecognised agent id for {} in {}", role.label(), book_id);
            return None;
        };
        let Some(name) = agent.find(PGTERMS, "name").and_then(Element::text) else {
            warn!("Agent {} has no name ({} in {})", id, role.label(), book_id);
            return None;
        };
        let aliases: Vec<String> = agent
            .find_all(PGTERMS, "alias")
            .filter_map(Element::text)
            .map(str::to_string)
            .collect();

        self.agents.entry(id).or_insert_with(|| CachedAgent {
            name: name.to_string(),
            aliases: aliases.clone(),
        });

        Some(Contributor {
            name: name.to_string(),
            id,
            aliases,
        })
    }

    fn lookup(&self, entry: &Element, book_id: u64, role: Role) -> Option<Contributor> {
        let Some(id) = entry.attr(RDF, "resource").and_then(agent_id) else {
            warn!("Could not find agent for {} in {}", role.label(), book_id);
            return None;
        };
        match self.agents.get(&id) {
            Some(agent) => Some(Contributor {
                name: agent.name.clone(),
                id,
                aliases: agent.aliases.clone(),
            }),
            None => {
                warn!(
                    "Could not find agent {} for {} in {}",
                    id,
                    role.label(),
                    book_id
                );
                None
            }
        }
    }
}

fn agent_id(reference: &str) -> Option<u64> {
    AGENT_ID_RE.captures(reference)?.get(1)?.as_str().parse().ok()
}

// ── Tests ──
