// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Permission arbitration: exactly one resolution per pending request.

use super::{AgentManager, ManagedAgent, ManagerError, PendingPermission, PermissionInfo};
use crate::acp::PermissionAsk;
use paseo_core::{AgentId, AgentStatus, PermissionOutcome, TimelineEntry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

impl AgentManager {
    /// Record a permission ask from the adapter and surface it.
    pub(crate) fn register_permission(&self, agent: &Arc<ManagedAgent>, ask: PermissionAsk) {
        let PermissionAsk { request_id, acp_session_id, tool_call, options, responder } = ask;
        let entry = TimelineEntry::PermissionRequest {
            request_id: request_id.clone(),
            tool_call: tool_call.clone(),
            options: options.clone(),
        };
        agent.pending.lock().push(PendingPermission {
            request_id,
            acp_session_id,
            tool_call,
            options,
            responder,
        });
        self.emit_entry(agent, entry);
        agent.permission_arrived.notify_waiters();
    }

    /// Resolve one pending permission with the user's selection.
    pub async fn respond_to_permission(
        &self,
        id: &AgentId,
        request_id: &str,
        option_id: &str,
    ) -> Result<(), ManagerError> {
        let agent = self.get(id)?;

        let pending = {
            let mut pending = agent.pending.lock();
            let index = pending
                .iter()
                .position(|p| p.request_id == request_id)
                .ok_or_else(|| ManagerError::UnknownPermission(request_id.to_string()))?;
            let p = &pending[index];
            if !p.options.iter().any(|o| o.option_id == option_id) {
                return Err(ManagerError::Validation(format!(
                    "unknown option {} for permission {}",
                    option_id, request_id
                )));
            }
            pending.swap_remove(index)
        };

        let outcome = PermissionOutcome::Selected { option_id: option_id.to_string() };
        let _ = pending.responder.send(outcome.clone());
        self.emit_entry(
            &agent,
            TimelineEntry::PermissionResolved {
                request_id: request_id.to_string(),
                outcome,
            },
        );
        Ok(())
    }

    /// Cancel every outstanding permission, emitting one resolution each.
    ///
    /// Used when a new prompt preempts a turn, on kill/failure, and at
    /// shutdown. The resolutions are recorded before any subsequent status
    /// transition the caller makes.
    pub(crate) fn cancel_pending_permissions(&self, agent: &ManagedAgent) {
        let drained: Vec<PendingPermission> = agent.pending.lock().drain(..).collect();
        for pending in drained {
            debug!(agent_id = %agent.id, request_id = %pending.request_id,
                "cancelling pending permission");
            let _ = pending.responder.send(PermissionOutcome::Cancelled);
            self.emit_entry(
                agent,
                TimelineEntry::PermissionResolved {
                    request_id: pending.request_id,
                    outcome: PermissionOutcome::Cancelled,
                },
            );
        }
    }

    /// Pending permissions for an agent, oldest first.
    pub fn pending_permissions(&self, id: &AgentId) -> Result<Vec<PermissionInfo>, ManagerError> {
        let agent = self.get(id)?;
        let pending = agent.pending.lock();
        Ok(pending
            .iter()
            .map(|p| PermissionInfo {
                request_id: p.request_id.clone(),
                tool_call: p.tool_call.clone(),
                options: p.options.clone(),
            })
            .collect())
    }

    /// Wait until the agent asks for a permission, or until its turn ends
    /// without asking (`None`), or until `cancel` fires (`None`).
    pub async fn wait_for_permission_request(
        &self,
        id: &AgentId,
        cancel: &CancellationToken,
    ) -> Result<Option<PermissionInfo>, ManagerError> {
        let agent = self.get(id)?;
        let mut status_rx = agent.status_tx.subscribe();
        loop {
            if let Some(first) = agent.pending.lock().first() {
                return Ok(Some(PermissionInfo {
                    request_id: first.request_id.clone(),
                    tool_call: first.tool_call.clone(),
                    options: first.options.clone(),
                }));
            }
            let (status, _) = *status_rx.borrow();
            if status != AgentStatus::Processing && status != AgentStatus::Initializing {
                return Ok(None);
            }
            tokio::select! {
                _ = agent.permission_arrived.notified() => {}
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        return Ok(None);
                    }
                }
                _ = cancel.cancelled() => return Ok(None),
            }
        }
    }
}
