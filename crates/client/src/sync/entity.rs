// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Entity Sync Engine.
//!
//! Without a cached state a type is loaded with one full Get. With one, a
//! Changes call and two Gets that reference its `created` and `updated`
//! lists go out in the same batch, and the reconciled [`Update`] is applied.

use std::marker::PhantomData;

use tracing::{debug, info};

use mua_core::reference::path;
use mua_core::response::{ChangesResponse, GetResponse};
use mua_core::{
    BatchBuilder, Cache, Call, ChangesCall, Email, Entity, GetCall, Mailbox, MethodCall,
    MethodErrorType, ObjectsState, PropertyMask, Responses, StateToken, Status, Thread, Update,
};

use super::{Applied, Context};
use crate::error::Result;
use crate::transport::Transport;

enum Plan {
    Full {
        get: Call,
    },
    Incremental {
        changes: Call,
        created: Call,
        updated: Call,
    },
}

/// The calls planned for one entity type within a batch.
pub(crate) struct EntitySync<T: Entity> {
    plan: Plan,
    _type: PhantomData<fn() -> T>,
}

impl<T: Entity> EntitySync<T> {
    /// Appends the calls that bring `T` up to date from `state`.
    pub fn plan(
        batch: &mut BatchBuilder,
        account_id: &str,
        state: Option<&StateToken<T>>,
    ) -> Result<Self> {
        let plan = match state {
            None => Plan::Full {
                get: batch.call(MethodCall::Get(GetCall::new(T::TYPE, account_id)))?,
            },
            Some(state) => {
                let changes = batch.call(MethodCall::Changes(ChangesCall::new(
                    T::TYPE,
                    account_id,
                    state.as_str(),
                )))?;
                let created = GetCall::new(T::TYPE, account_id)
                    .ids_ref(changes.create_reference(path::CREATED))?;
                let updated = GetCall::new(T::TYPE, account_id)
                    .ids_ref(changes.create_reference(path::UPDATED))?;
                let updated = match T::MUTABLE {
                    PropertyMask::All => updated,
                    PropertyMask::Fixed(properties) => updated.properties(properties.iter().copied())?,
                    PropertyMask::Reported => {
                        updated.properties_ref(changes.create_reference(path::UPDATED_PROPERTIES))?
                    }
                };
                Plan::Incremental {
                    created: batch.call(MethodCall::Get(created))?,
                    updated: batch.call(MethodCall::Get(updated))?,
                    changes,
                }
            }
        };
        Ok(EntitySync {
            plan,
            _type: PhantomData,
        })
    }

    /// Applies the planned calls' results to the cache.
    pub async fn apply<C: Cache, Tr: Transport>(
        self,
        ctx: &Context<C, Tr>,
        responses: &Responses,
    ) -> Result<Status> {
        match self.plan {
            Plan::Full { get } => {
                let get: GetResponse<T> = responses.get(&get)?;
                debug!("Loaded {} {} objects at {}", get.list.len(), T::TYPE, get.state);
                ctx.cache(move |cache| cache.set_all(&get.state, &get.list))
                    .await?;
                Ok(Status::Updated)
            }
            Plan::Incremental {
                changes,
                created,
                updated,
            } => {
                let changes = match responses.result::<ChangesResponse<T>>(&changes)? {
                    Ok(changes) => changes,
                    Err(e) if e.kind == MethodErrorType::CannotCalculateChanges => {
                        info!("{} state is no longer known to the server, invalidating", T::TYPE);
                        ctx.cache(|cache| cache.invalidate::<T>()).await?;
                        return Ok(Status::HasMore);
                    }
                    Err(e) => return Err(responses.failure(&changes, e).into()),
                };
                let update = Update::of(
                    changes,
                    responses.get::<GetResponse<T>>(&created)?,
                    responses.get::<GetResponse<T>>(&updated)?,
                )?;
                let status = update.status();
                if !update.has_changes() {
                    return Ok(status);
                }
                debug!(
                    "{} {} -> {}: {} created, {} updated, {} destroyed",
                    T::TYPE,
                    update.old_state,
                    update.new_state,
                    update.created.len(),
                    update.updated.len(),
                    update.destroyed.len()
                );

                let mask: Option<Vec<String>> = match T::MUTABLE {
                    PropertyMask::All => None,
                    PropertyMask::Fixed(properties) => {
                        Some(properties.iter().map(|p| p.to_string()).collect())
                    }
                    PropertyMask::Reported => update.updated_properties.clone(),
                };
                let applied = ctx
                    .write(T::TYPE, move |cache| {
                        cache.update_entities(&update, mask.as_deref())
                    })
                    .await?;
                if applied == Applied::Corruption {
                    ctx.cache(|cache| cache.invalidate::<T>()).await?;
                    return Ok(Status::HasMore);
                }
                Ok(status)
            }
        }
    }
}

/// Mailbox, Email and Thread sync, planned together.
///
/// Mailboxes are always synced. Emails and threads are only synced once a
/// query has loaded some; they are never fetched wholesale.
pub(crate) struct ObjectsSync {
    mailbox: EntitySync<Mailbox>,
    email: Option<EntitySync<Email>>,
    thread: Option<EntitySync<Thread>>,
}

impl ObjectsSync {
    pub fn plan(batch: &mut BatchBuilder, account_id: &str, state: &ObjectsState) -> Result<Self> {
        let mailbox = EntitySync::plan(batch, account_id, state.mailbox_state.as_ref())?;
        let email = state
            .email_state
            .as_ref()
            .map(|s| EntitySync::plan(batch, account_id, Some(s)))
            .transpose()?;
        let thread = state
            .thread_state
            .as_ref()
            .map(|s| EntitySync::plan(batch, account_id, Some(s)))
            .transpose()?;
        Ok(ObjectsSync {
            mailbox,
            email,
            thread,
        })
    }

    /// Applies mailboxes, then emails, then threads.
    pub async fn apply<C: Cache, T: Transport>(
        self,
        ctx: &Context<C, T>,
        responses: &Responses,
    ) -> Result<Status> {
        let mut statuses = vec![self.mailbox.apply(ctx, responses).await?];
        if let Some(email) = self.email {
            statuses.push(email.apply(ctx, responses).await?);
        }
        if let Some(thread) = self.thread {
            statuses.push(thread.apply(ctx, responses).await?);
        }
        Ok(Status::merge(statuses))
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
