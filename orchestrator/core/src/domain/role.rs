// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Roles
//!
//! Closed enumeration of the capability profiles an agent can be spawned
//! with, plus the catalog of roles a configured pool is able to serve.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Role vocabulary shared by planner output, validator and pool

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Capability profile of an agent.
///
/// Planner output refers to roles by name. Names are normalized through
/// [`Role::parse`], which accepts the canonical name and a fixed alias table;
/// anything else is rejected rather than mapped to a fallback role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Research,
    Code,
    Writer,
    Designer,
    Analyst,
    Qa,
    ToolBuilder,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Research,
        Role::Code,
        Role::Writer,
        Role::Designer,
        Role::Analyst,
        Role::Qa,
        Role::ToolBuilder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Research => "research",
            Role::Code => "code",
            Role::Writer => "writer",
            Role::Designer => "designer",
            Role::Analyst => "analyst",
            Role::Qa => "qa",
            Role::ToolBuilder => "tool_builder",
        }
    }

    /// Normalize a raw role name. Case, surrounding whitespace and `-`/`_`/space
    /// separators are ignored.
    pub fn parse(raw: &str) -> Option<Role> {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        let role = match normalized.as_str() {
            "research" | "researcher" | "search" | "investigate" => Role::Research,
            "code" | "coding" | "coder" | "developer" | "programming" | "engineer" => Role::Code,
            "writer" | "writing" | "documentation" | "docs" | "author" => Role::Writer,
            "designer" | "design" | "ui" | "ux" => Role::Designer,
            "analyst" | "analysis" | "analyze" | "data" => Role::Analyst,
            "qa" | "testing" | "tester" | "test" | "quality" | "review" => Role::Qa,
            "tool_builder" | "toolbuilder" | "tools" | "tooling" => Role::ToolBuilder,
            _ => return None,
        };
        Some(role)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| RoleError::Unknown(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    #[error("Unknown role '{0}'")]
    Unknown(String),

    #[error("Role '{0}' is not served by the configured agent pool")]
    Unsupported(Role),
}

/// Set of roles the configured execution environment can spawn agents for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCatalog {
    roles: BTreeSet<Role>,
}

impl RoleCatalog {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    /// Catalog serving every role.
    pub fn all() -> Self {
        Self::new(Role::ALL)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.iter().copied()
    }

    /// Resolve a raw role name against this catalog.
    pub fn resolve(&self, raw: &str) -> Result<Role, RoleError> {
        let role: Role = raw.parse()?;
        if !self.contains(role) {
            return Err(RoleError::Unsupported(role));
        }
        Ok(role)
    }
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn test_aliases_are_normalized() {
        assert_eq!(Role::parse("Coding"), Some(Role::Code));
        assert_eq!(Role::parse("  tester "), Some(Role::Qa));
        assert_eq!(Role::parse("tool-builder"), Some(Role::ToolBuilder));
        assert_eq!(Role::parse("Tool Builder"), Some(Role::ToolBuilder));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert_eq!(Role::parse("astronaut"), None);
        let err = "astronaut".parse::<Role>().unwrap_err();
        assert_eq!(err, RoleError::Unknown("astronaut".to_string()));
    }

    #[test]
    fn test_catalog_rejects_unsupported_role() {
        let catalog = RoleCatalog::new([Role::Code, Role::Qa]);
        assert_eq!(catalog.resolve("developer").unwrap(), Role::Code);
        assert_eq!(
            catalog.resolve("writer").unwrap_err(),
            RoleError::Unsupported(Role::Writer)
        );
    }
}
