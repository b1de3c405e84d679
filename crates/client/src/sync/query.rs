// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Query Sync Engine.
//!
//! One cached, ordered id list per query fingerprint. A query without a
//! cached prefix is loaded from position 0; a cached one is refreshed with
//! QueryChanges; [`query_page`] appends the page after the cached tail.
//! Every pass ends by fetching the threads and emails the list refers to
//! but the cache lacks.

use tracing::{debug, info};

use mua_core::reference::path;
use mua_core::response::{GetResponse, QueryChangesResponse, QueryResponse};
use mua_core::{
    BatchBuilder, Cache, Email, EmailQuery, EntityType, Error as CoreError, GetCall, MethodCall,
    MethodErrorType, QueryCall, QueryChangesCall, QueryKey, QueryResult, QueryStateWrapper,
    QueryUpdate, Status, Thread,
};

use super::entity::ObjectsSync;
use super::{Applied, Context};
use crate::error::Result;
use crate::transport::Transport;

/// Brings the cached result of `query` up to date.
pub(crate) async fn query<C: Cache, T: Transport>(
    ctx: &Context<C, T>,
    query: &EmailQuery,
) -> Result<Status> {
    let key = query.fingerprint()?;
    let state = query_state(ctx, &key).await?;
    if state.is_initial() || !state.can_calculate_changes {
        initial(ctx, query, key, &state).await
    } else {
        refresh(ctx, query, key, &state).await
    }
}

/// Refreshes the cached prefix of `query` and appends the next page.
pub(crate) async fn query_page<C: Cache, T: Transport>(
    ctx: &Context<C, T>,
    query: &EmailQuery,
) -> Result<Status> {
    let key = query.fingerprint()?;
    let state = query_state(ctx, &key).await?;
    let up_to = match &state.up_to {
        Some(up_to) if !state.is_initial() && state.can_calculate_changes => up_to.clone(),
        _ => return initial(ctx, query, key, &state).await,
    };

    let (refreshed, page) = tokio::join!(
        refresh(ctx, query, key.clone(), &state),
        fetch_page(ctx, query, &up_to.id),
    );
    let refreshed = refreshed?;
    let (page, emails) = match page {
        Ok(page) => page,
        Err(e) if e.method_error().map(|m| m.kind) == Some(MethodErrorType::AnchorNotFound) => {
            if refreshed == Status::Unchanged {
                info!("Anchor {} is stale, invalidating query {}", up_to.id, key);
                invalidate(ctx, &key).await?;
            }
            return Ok(Status::HasMore);
        }
        Err(e) => return Err(e),
    };

    // The refresh is applied before the page is appended.
    let current = query_state(ctx, &key).await?;
    if current.up_to.as_ref() != Some(&up_to) {
        debug!("Cached tail of {} moved while paging", key);
        return Ok(Status::HasMore);
    }
    if page.ids.is_empty() {
        return Ok(refreshed);
    }

    let result = QueryResult::of(page, emails, current.objects_state)?;
    let after_id = up_to.id;
    let target = key.clone();
    match ctx
        .write(format!("query {key}"), move |cache| {
            cache.add_query_result(&target, &after_id, &result)
        })
        .await?
    {
        Applied::Done => {}
        Applied::Conflict => return Ok(Status::HasMore),
        Applied::Corruption => {
            invalidate(ctx, &key).await?;
            return Ok(Status::HasMore);
        }
    }

    let missing = fetch_missing(ctx, &key).await?;
    Ok(Status::merge([refreshed, Status::Updated, missing]))
}

/// Loads the threads and emails the cached result of `key` refers to but
/// the cache does not hold yet.
///
/// Without a server maximum both come back in one round trip. With one, the
/// threads are fetched first so their emails can be requested in Gets of at
/// most that many ids.
pub(crate) async fn fetch_missing<C: Cache, T: Transport>(
    ctx: &Context<C, T>,
    key: &QueryKey,
) -> Result<Status> {
    let target = key.clone();
    let mut missing = ctx.cache(move |cache| cache.missing(&target)).await?;
    if missing.is_empty() {
        return Ok(Status::Unchanged);
    }

    let max = ctx
        .session
        .max_objects_in_get
        .map(|max| usize::try_from(max).unwrap_or(usize::MAX).max(1));
    let mut more = false;
    if let Some(max) = max {
        if missing.thread_ids.len() > max {
            missing.thread_ids.truncate(max);
            more = true;
        }
    }
    debug!("Fetching {} missing threads for {}", missing.thread_ids.len(), key);

    let (threads, emails) = match max {
        None => get_threads_with_emails(ctx, missing.thread_ids).await?,
        Some(max) => {
            let threads = get_threads(ctx, missing.thread_ids).await?;
            let ids: Vec<String> = threads
                .list
                .iter()
                .flat_map(|t| t.email_ids.iter().cloned())
                .collect();
            let emails = get_emails(ctx, ids, max).await?;
            (threads, emails)
        }
    };

    // Objects fetched at a newer state than the cache holds are only stored
    // after the next Changes pass catches up.
    if missing.thread_state.as_ref().is_some_and(|s| *s != threads.state)
        || emails
            .iter()
            .any(|e| missing.email_state.as_ref().is_some_and(|s| *s != e.state))
    {
        debug!("Server moved past the cached state while backfilling {}", key);
        more = true;
    }
    let mut applied = vec![
        ctx.write(EntityType::Thread, move |cache| {
            cache.add_entities(&threads.state, &threads.list)
        })
        .await?,
    ];
    for part in emails {
        applied.push(
            ctx.write(EntityType::Email, move |cache| {
                cache.add_entities(&part.state, &part.list)
            })
            .await?,
        );
    }
    if applied.iter().any(|a| *a != Applied::Done) {
        more = true;
    }

    Ok(if more { Status::HasMore } else { Status::Updated })
}

/// Gets threads and, chained on their `emailIds`, all of their emails.
async fn get_threads_with_emails<C: Cache, T: Transport>(
    ctx: &Context<C, T>,
    ids: Vec<String>,
) -> Result<(GetResponse<Thread>, Vec<GetResponse<Email>>)> {
    let mut batch = BatchBuilder::new();
    let threads = batch.call(MethodCall::Get(
        GetCall::new(EntityType::Thread, ctx.account_id()).ids(ids)?,
    ))?;
    let emails = batch.call(MethodCall::Get(
        GetCall::new(EntityType::Email, ctx.account_id())
            .ids_ref(threads.create_reference(path::LIST_EMAIL_IDS))?,
    ))?;
    let responses = ctx.send(&batch.build()).await?;
    Ok((responses.get(&threads)?, vec![responses.get(&emails)?]))
}

async fn get_threads<C: Cache, T: Transport>(
    ctx: &Context<C, T>,
    ids: Vec<String>,
) -> Result<GetResponse<Thread>> {
    let mut batch = BatchBuilder::new();
    let threads = batch.call(MethodCall::Get(
        GetCall::new(EntityType::Thread, ctx.account_id()).ids(ids)?,
    ))?;
    let responses = ctx.send(&batch.build()).await?;
    Ok(responses.get(&threads)?)
}

/// Gets `ids` in one round trip, at most `max` per call.
async fn get_emails<C: Cache, T: Transport>(
    ctx: &Context<C, T>,
    ids: Vec<String>,
    max: usize,
) -> Result<Vec<GetResponse<Email>>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut batch = BatchBuilder::new();
    let mut calls = Vec::new();
    for chunk in ids.chunks(max) {
        calls.push(batch.call(MethodCall::Get(
            GetCall::new(EntityType::Email, ctx.account_id()).ids(chunk.to_vec())?,
        ))?);
    }
    let responses = ctx.send(&batch.build()).await?;
    calls.iter().map(|call| Ok(responses.get(call)?)).collect()
}

async fn query_state<C: Cache, T: Transport>(
    ctx: &Context<C, T>,
    key: &QueryKey,
) -> Result<QueryStateWrapper> {
    let key = key.clone();
    ctx.cache(move |cache| cache.query_state(&key)).await
}

async fn invalidate<C: Cache, T: Transport>(ctx: &Context<C, T>, key: &QueryKey) -> Result<()> {
    let key = key.clone();
    ctx.cache(move |cache| cache.invalidate_query_result(&key))
        .await
}

/// Loads the first page of `query` together with an objects sync.
async fn initial<C: Cache, T: Transport>(
    ctx: &Context<C, T>,
    query: &EmailQuery,
    key: QueryKey,
    state: &QueryStateWrapper,
) -> Result<Status> {
    let account_id = ctx.account_id();
    let mut batch = BatchBuilder::new();
    let objects = ObjectsSync::plan(&mut batch, account_id, &state.objects_state)?;
    let page = batch.call(MethodCall::Query(
        QueryCall::email(account_id, query).limit(ctx.page_limit()),
    ))?;
    let emails = batch.call(MethodCall::Get(
        GetCall::new(EntityType::Email, account_id)
            .ids_ref(page.create_reference(path::IDS))?
            .properties(["threadId"])?,
    ))?;
    let responses = ctx.send(&batch.build()).await?;

    let objects_status = objects.apply(ctx, &responses).await?;
    let page: QueryResponse = responses.get(&page)?;
    if page.position != 0 {
        return Err(CoreError::Protocol(format!(
            "query without anchor returned position {}",
            page.position
        ))
        .into());
    }
    let emails: GetResponse<Email> = responses.get(&emails)?;
    debug!("Loaded {} items of query {}", page.ids.len(), key);

    let objects_state = ctx.cache(|cache| cache.objects_state()).await?;
    let result = QueryResult::of(page, emails, objects_state)?;
    let target = key.clone();
    ctx.cache(move |cache| cache.set_query_result(&target, &result))
        .await?;

    let missing = fetch_missing(ctx, &key).await?;
    Ok(Status::merge([objects_status, Status::Updated, missing]))
}

/// Applies object changes, then the QueryChanges of the cached prefix.
async fn refresh<C: Cache, T: Transport>(
    ctx: &Context<C, T>,
    query: &EmailQuery,
    key: QueryKey,
    state: &QueryStateWrapper,
) -> Result<Status> {
    let account_id = ctx.account_id();
    let since = state.query_state.clone().unwrap_or_default();
    let mut batch = BatchBuilder::new();
    let objects = ObjectsSync::plan(&mut batch, account_id, &state.objects_state)?;
    let changes = batch.call(MethodCall::QueryChanges(
        QueryChangesCall::email(account_id, query, since)
            .up_to(state.up_to.as_ref().map(|u| u.id.clone())),
    ))?;
    let added = batch.call(MethodCall::Get(
        GetCall::new(EntityType::Email, account_id)
            .ids_ref(changes.create_reference(path::ADDED_IDS))?
            .properties(["threadId"])?,
    ))?;
    let responses = ctx.send(&batch.build()).await?;

    let objects_status = objects.apply(ctx, &responses).await?;
    let changes = match responses.result::<QueryChangesResponse>(&changes)? {
        Ok(changes) => changes,
        Err(e) if e.kind == MethodErrorType::CannotCalculateChanges => {
            info!("Query {} can no longer be refreshed, invalidating", key);
            invalidate(ctx, &key).await?;
            return Ok(Status::HasMore);
        }
        Err(e) => return Err(responses.failure(&changes, e).into()),
    };
    let update = QueryUpdate::of(changes, responses.get(&added)?)?;
    let status = update.status();

    if update.has_changes() {
        debug!(
            "Query {} {} -> {}: {} removed, {} added",
            key,
            update.old_query_state,
            update.new_query_state,
            update.removed.len(),
            update.added.len()
        );
        let objects_state = ctx.cache(|cache| cache.objects_state()).await?;
        let target = key.clone();
        let applied = ctx
            .write(format!("query {key}"), move |cache| {
                cache.update_query_results(&target, &update, &objects_state)
            })
            .await?;
        if applied == Applied::Corruption {
            invalidate(ctx, &key).await?;
            return Ok(Status::HasMore);
        }
    }

    let missing = fetch_missing(ctx, &key).await?;
    Ok(Status::merge([objects_status, status, missing]))
}

/// Requests the page following `anchor`, with the thread ids of its items.
async fn fetch_page<C: Cache, T: Transport>(
    ctx: &Context<C, T>,
    query: &EmailQuery,
    anchor: &str,
) -> Result<(QueryResponse, GetResponse<Email>)> {
    let account_id = ctx.account_id();
    let mut batch = BatchBuilder::new();
    let page = batch.call(MethodCall::Query(
        QueryCall::email(account_id, query)
            .after(anchor)
            .limit(ctx.page_limit()),
    ))?;
    let emails = batch.call(MethodCall::Get(
        GetCall::new(EntityType::Email, account_id)
            .ids_ref(page.create_reference(path::IDS))?
            .properties(["threadId"])?,
    ))?;
    let responses = ctx.send(&batch.build()).await?;
    Ok((responses.get(&page)?, responses.get(&emails)?))
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
