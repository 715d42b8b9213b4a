// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pre-order depth-first search over the delegation graph.
//!
//! The walk only decides which role to visit next. Loading and verifying the
//! role is the updater's job; it feeds the verified metadata back through
//! [`DelegationWalk::visit`].

use std::collections::HashSet;

use crate::metadata::{TargetFile, TargetsMetadata, ROOT, TARGETS};

/// State of one search for a target path.
#[derive(Debug)]
pub(crate) struct DelegationWalk {
    target_path: String,
    max_delegations: usize,
    /// Pending `(role, delegator)` pairs; the last element is visited next.
    stack: Vec<(String, String)>,
    visited: HashSet<String>,
}

impl DelegationWalk {
    pub(crate) fn new(target_path: &str, max_delegations: usize) -> Self {
        Self {
            target_path: target_path.to_string(),
            max_delegations,
            stack: vec![(TARGETS.to_string(), ROOT.to_string())],
            visited: HashSet::new(),
        }
    }

    /// Next `(role, delegator)` pair to load, or `None` when the search is
    /// over. Roles already visited are skipped, which breaks cycles.
    pub(crate) fn next_role(&mut self) -> Option<(String, String)> {
        while self.visited.len() <= self.max_delegations {
            let (role, parent) = self.stack.pop()?;
            if self.visited.contains(&role) {
                continue;
            }
            return Some((role, parent));
        }
        None
    }

    /// Records a visit to `role`.
    ///
    /// Returns the target if `role` lists it. Otherwise schedules the child
    /// roles whose paths cover the target, keeping declaration order as
    /// visiting order. A matching terminating delegation discards every role
    /// still pending.
    pub(crate) fn visit(&mut self, role: &str, metadata: &TargetsMetadata) -> Option<TargetFile> {
        if let Some(target) = metadata.target(&self.target_path) {
            return Some(target);
        }
        self.visited.insert(role.to_string());

        let Some(delegations) = &metadata.delegations else {
            return None;
        };
        let mut children = Vec::new();
        for (child, terminating) in delegations.roles_for_target(&self.target_path) {
            children.push((child, role.to_string()));
            if terminating {
                self.stack.clear();
                break;
            }
        }
        self.stack.extend(children.into_iter().rev());
        None
    }

    /// Whether the search stopped on the delegation bound with roles left.
    pub(crate) fn exceeded_bound(&self) -> bool {
        !self.stack.is_empty()
    }
}
