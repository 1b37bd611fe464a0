// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch: wire requests → manager/multiplexer calls.

use super::connection::{Binding, Session};
use crate::env;
use crate::manager::{CreateAgentParams, DirectoryChange, ManagerError};
use crate::term::{StreamEvent, TermError};
use paseo_core::{AgentUpdate, TimelineEntry};
use paseo_wire::{decode_bytes, encode_bytes, ErrorCode, Event, Request, Response};
use std::sync::Arc;
use std::time::Duration;

/// Handle one request to completion.
pub(crate) async fn handle(session: &Arc<Session>, request: Request) -> Response {
    match request {
        // The handshake consumed the first hello; a second one is a
        // client bug but harmless.
        Request::Hello { .. } => Response::Hello {
            protocol_version: paseo_wire::PROTOCOL_VERSION,
            server_id: session.ctx.server_id.clone(),
        },

        Request::Ping => Response::Pong,

        Request::GetClientInfo => Response::ClientInfo {
            server_id: session.ctx.server_id.clone(),
            protocol_version: paseo_wire::PROTOCOL_VERSION,
            daemon_version: env::DAEMON_VERSION.to_string(),
        },

        Request::CreateAgent { provider, cwd, initial_prompt, initial_mode } => {
            match session
                .ctx
                .manager
                .create_agent(CreateAgentParams { provider, cwd, initial_prompt, initial_mode })
                .await
            {
                Ok(agent_id) => Response::AgentCreated { agent_id },
                Err(e) => manager_error(e),
            }
        }

        Request::SendPrompt { agent_id, prompt, session_mode, message_id } => {
            match session
                .ctx
                .manager
                .send_prompt(&agent_id, prompt, session_mode, message_id)
                .await
            {
                Ok(()) => Response::Ok,
                Err(e) => manager_error(e),
            }
        }

        Request::CancelAgent { agent_id } => {
            match session.ctx.manager.cancel_agent(&agent_id).await {
                Ok(()) => Response::Ok,
                Err(e) => manager_error(e),
            }
        }

        Request::KillAgent { agent_id } => {
            match session.ctx.manager.kill_agent(&agent_id).await {
                Ok(()) => Response::Ok,
                Err(e) => manager_error(e),
            }
        }

        Request::DeleteAgent { agent_id } => {
            match session.ctx.manager.delete_agent(&agent_id).await {
                Ok(()) => Response::Ok,
                Err(e) => manager_error(e),
            }
        }

        Request::SetSessionMode { agent_id, mode_id } => {
            match session.ctx.manager.set_session_mode(&agent_id, &mode_id).await {
                Ok(()) => Response::Ok,
                Err(e) => manager_error(e),
            }
        }

        Request::RespondToPermission { agent_id, request_id, option_id } => {
            match session
                .ctx
                .manager
                .respond_to_permission(&agent_id, &request_id, &option_id)
                .await
            {
                Ok(()) => Response::Ok,
                Err(e) => manager_error(e),
            }
        }

        Request::SetAgentTitle { agent_id, title } => {
            match session.ctx.manager.set_agent_title(&agent_id, title) {
                Ok(()) => Response::Ok,
                Err(e) => manager_error(e),
            }
        }

        Request::LabelAgent { agent_id, key, value } => {
            match session.ctx.manager.label_agent(&agent_id, &key, value) {
                Ok(()) => Response::Ok,
                Err(e) => manager_error(e),
            }
        }

        Request::ListAgents => Response::Agents { agents: session.ctx.manager.list_agents() },

        Request::FetchAgents { subscription_id } => {
            let agents = session.ctx.manager.list_agents();
            if let Some(subscription_id) = subscription_id {
                let queue = session.bind(
                    &subscription_id,
                    Binding::Directory { manager_sub: 0 },
                );
                let manager_sub = {
                    let queue = Arc::clone(&queue);
                    session.ctx.manager.subscribe_directory(Arc::new(move |change| {
                        queue.push(directory_event(change));
                    }))
                };
                session.set_binding(&subscription_id, Binding::Directory { manager_sub });
                queue.push(Event::AgentDirectorySnapshot { agents: agents.clone() });
            }
            Response::Agents { agents }
        }

        Request::FetchAgentTimeline { agent_id, subscription_id } => {
            // Bind before the snapshot: overlap is deduped client-side by
            // seq, while a gap could not be recovered at all.
            let bound = match subscription_id {
                Some(subscription_id) => {
                    let queue = session
                        .bind(&subscription_id, Binding::Agent { agent_id, manager_sub: 0 });
                    let manager_sub = {
                        let queue = Arc::clone(&queue);
                        session.ctx.manager.subscribe_updates(
                            &agent_id,
                            Arc::new(move |update| queue.push(agent_event(agent_id, update))),
                        )
                    };
                    match manager_sub {
                        Ok(manager_sub) => {
                            session.set_binding(
                                &subscription_id,
                                Binding::Agent { agent_id, manager_sub },
                            );
                            Some((subscription_id, queue))
                        }
                        Err(e) => {
                            session.unbind(&subscription_id);
                            return manager_error(e);
                        }
                    }
                }
                None => None,
            };
            match session.ctx.manager.fetch_agent_timeline(&agent_id).await {
                Ok((info, updates)) => {
                    if let Some((_, queue)) = &bound {
                        queue.push(Event::AgentSnapshot { agent_id, info: info.clone() });
                    }
                    Response::AgentTimeline { info, updates }
                }
                Err(e) => {
                    if let Some((subscription_id, _)) = bound {
                        session.unbind(&subscription_id);
                    }
                    manager_error(e)
                }
            }
        }

        Request::WaitForFinish { agent_id, timeout_ms } => {
            let timeout =
                timeout_ms.map(Duration::from_millis).unwrap_or(env::turn_timeout());
            match session.ctx.manager.wait_for_finish(&agent_id, timeout).await {
                Ok((status, stop_reason)) => Response::Finished { status, stop_reason },
                Err(e) => manager_error(e),
            }
        }

        Request::Unsubscribe { subscription_id } => {
            session.unbind(&subscription_id);
            Response::Ok
        }

        Request::ListTerminals { cwd } => {
            Response::Terminals { terminals: session.ctx.term.list_terminals(&cwd) }
        }

        Request::CreateTerminal { cwd } => match session.ctx.term.create_terminal(&cwd) {
            Ok(terminal) => Response::TerminalCreated { terminal },
            Err(e) => term_error(e),
        },

        Request::KillTerminal { terminal_id } => {
            match session.ctx.term.kill_terminal(&terminal_id) {
                Ok(()) => Response::Ok,
                Err(e) => term_error(e),
            }
        }

        Request::AttachTerminalStream { terminal_id, subscription_id } => {
            let stream_id = paseo_core::StreamId::new();
            let queue =
                session.bind(&subscription_id, Binding::TerminalStream { stream_id });
            let attach = {
                let queue = Arc::clone(&queue);
                session.ctx.term.attach_stream(
                    &terminal_id,
                    stream_id,
                    Arc::new(move |event| match event {
                        StreamEvent::Data(data) => queue.push(Event::TerminalStreamData {
                            stream_id,
                            data: encode_bytes(&data),
                        }),
                        StreamEvent::Exit => {
                            queue.push(Event::TerminalStreamExit { terminal_id, stream_id })
                        }
                    }),
                )
            };
            match attach {
                Ok(snapshot) => Response::StreamAttached {
                    stream_id,
                    terminal_id,
                    snapshot: encode_bytes(&snapshot),
                },
                Err(e) => {
                    session.unbind(&subscription_id);
                    term_error(e)
                }
            }
        }

        Request::DetachTerminalStream { stream_id } => {
            session.ctx.term.detach_stream(&stream_id);
            Response::Ok
        }

        Request::SendTerminalStreamInput { stream_id, data } => {
            let bytes = match decode_bytes(&data) {
                Ok(bytes) => bytes,
                Err(e) => return Response::error(ErrorCode::InvalidArgument, e.to_string()),
            };
            match session.ctx.term.send_stream_input(&stream_id, &bytes).await {
                Ok(()) => Response::Ok,
                Err(e) => term_error(e),
            }
        }

        Request::SendTerminalStreamKey { stream_id, key } => {
            match session.ctx.term.send_stream_key(&stream_id, &key).await {
                Ok(()) => Response::Ok,
                Err(e) => term_error(e),
            }
        }

        Request::SendTerminalInput { terminal_id, input } => match input {
            paseo_wire::TerminalInput::Resize { rows, cols } => {
                match session.ctx.term.resize_terminal(&terminal_id, rows, cols) {
                    Ok(()) => Response::Ok,
                    Err(e) => term_error(e),
                }
            }
        },

        Request::SubscribeTerminals { cwd, subscription_id } => {
            let queue = session.bind(
                &subscription_id,
                Binding::TerminalList { cwd: cwd.clone(), mux_sub: 0 },
            );
            let mux_sub = {
                let queue = Arc::clone(&queue);
                let cwd = cwd.clone();
                session.ctx.term.subscribe_lists(
                    &cwd.clone(),
                    Arc::new(move |terminals| {
                        queue.push(Event::TerminalListChanged {
                            cwd: cwd.clone(),
                            terminals,
                        });
                    }),
                )
            };
            session.set_binding(&subscription_id, Binding::TerminalList { cwd, mux_sub });
            Response::Ok
        }

        Request::UnsubscribeTerminals { cwd } => {
            session.unbind_terminal_list(&cwd);
            Response::Ok
        }
    }
}

/// Map a timeline update to its outbound event class. Permission traffic
/// gets dedicated classes so clients can react without parsing the
/// timeline; everything else rides `agent_update`.
fn agent_event(agent_id: paseo_core::AgentId, update: AgentUpdate) -> Event {
    match &update.entry {
        TimelineEntry::PermissionRequest { request_id, tool_call, options } => {
            Event::PermissionRequest {
                agent_id,
                request_id: request_id.clone(),
                tool_call: tool_call.clone(),
                options: options.clone(),
            }
        }
        TimelineEntry::PermissionResolved { request_id, outcome } => {
            Event::PermissionResolved {
                agent_id,
                request_id: request_id.clone(),
                outcome: outcome.clone(),
            }
        }
        _ => Event::AgentUpdate { agent_id, update },
    }
}

fn directory_event(change: DirectoryChange) -> Event {
    match change {
        DirectoryChange::Upserted(info) => {
            Event::AgentDirectoryDelta { upserted: vec![info], removed: vec![] }
        }
        DirectoryChange::Removed(id) => {
            Event::AgentDirectoryDelta { upserted: vec![], removed: vec![id] }
        }
    }
}

fn manager_error(e: ManagerError) -> Response {
    let code = match &e {
        ManagerError::UnknownAgent(_) => ErrorCode::UnknownAgent,
        ManagerError::CwdInaccessible(_) | ManagerError::Validation(_) => {
            ErrorCode::InvalidArgument
        }
        ManagerError::Precondition(_) => ErrorCode::Precondition,
        ManagerError::UnknownPermission(_) => ErrorCode::NotFound,
        ManagerError::Timeout => ErrorCode::Timeout,
        ManagerError::Adapter(_) => ErrorCode::AdapterFailure,
    };
    Response::error(code, e.to_string())
}

fn term_error(e: TermError) -> Response {
    let code = match &e {
        TermError::UnknownTerminal(_) => ErrorCode::UnknownTerminal,
        TermError::UnknownStream(_) => ErrorCode::NotFound,
        TermError::UnsupportedKey(_) => ErrorCode::InvalidArgument,
        TermError::Pty(_) | TermError::Io(_) => ErrorCode::Internal,
    };
    Response::error(code, e.to_string())
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
