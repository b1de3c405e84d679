// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Email/query evaluation: filtering, sorting and thread collapsing.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use mua_core::entity::Email;
use mua_core::query::{Comparator, Filter, FilterCondition, Operator};
use mua_core::response::{MethodError, MethodErrorType};

/// The filter, sort and collapsing arguments of a query.
#[derive(Debug, Clone, Default)]
pub struct Search {
    pub filter: Option<Filter>,
    pub sort: Vec<Comparator>,
    pub collapse_threads: bool,
}

impl Search {
    /// Ordered ids of the emails in `emails` that match.
    pub fn run(&self, emails: &BTreeMap<String, Email>) -> Result<Vec<String>, MethodError> {
        let mut matched = Vec::new();
        for email in emails.values() {
            let keep = match &self.filter {
                Some(filter) => matches(filter, email, emails)?,
                None => true,
            };
            if keep {
                matched.push(email);
            }
        }

        for comparator in &self.sort {
            if !matches!(comparator.property.as_str(), "receivedAt" | "subject" | "id") {
                return Err(MethodError::new(MethodErrorType::UnsupportedSort)
                    .describe(format!("cannot sort by '{}'", comparator.property)));
            }
        }
        matched.sort_by(|a, b| compare(&self.sort, a, b));

        let mut seen = HashSet::new();
        Ok(matched
            .into_iter()
            .filter(|e| !self.collapse_threads || seen.insert(e.thread_id.as_str()))
            .map(|e| e.id.clone())
            .collect())
    }
}

fn compare(sort: &[Comparator], a: &Email, b: &Email) -> Ordering {
    for comparator in sort {
        let ordering = match comparator.property.as_str() {
            "receivedAt" => a.received_at.cmp(&b.received_at),
            "subject" => a.subject.cmp(&b.subject),
            _ => a.id.cmp(&b.id),
        };
        let ordering = if comparator.is_ascending {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.id.cmp(&b.id)
}

fn matches(
    filter: &Filter,
    email: &Email,
    all: &BTreeMap<String, Email>,
) -> Result<bool, MethodError> {
    match filter {
        Filter::Condition(condition) => condition_matches(condition, email, all),
        Filter::Operator {
            operator,
            conditions,
        } => {
            let mut results = Vec::with_capacity(conditions.len());
            for c in conditions {
                results.push(matches(c, email, all)?);
            }
            Ok(match operator {
                Operator::And => results.iter().all(|r| *r),
                Operator::Or => results.iter().any(|r| *r),
                Operator::Not => !results.iter().any(|r| *r),
            })
        }
    }
}

fn condition_matches(
    condition: &FilterCondition,
    email: &Email,
    all: &BTreeMap<String, Email>,
) -> Result<bool, MethodError> {
    if condition.has_attachment.is_some() || condition.to.is_some() {
        return Err(MethodError::new(MethodErrorType::UnsupportedFilter)
            .describe("hasAttachment and to are not supported"));
    }

    let thread: Vec<&Email> = all
        .values()
        .filter(|e| e.thread_id == email.thread_id)
        .collect();
    let contains = |field: &Option<String>, needle: &str| {
        field
            .as_deref()
            .is_some_and(|v| v.to_lowercase().contains(&needle.to_lowercase()))
    };

    let checks = [
        condition
            .in_mailbox
            .as_ref()
            .map(|m| email.in_mailbox(m)),
        condition
            .in_mailbox_other_than
            .as_ref()
            .map(|ms| email.mailbox_ids.keys().any(|m| !ms.contains(m))),
        condition
            .before
            .map(|t| email.received_at.is_some_and(|r| r < t)),
        condition
            .after
            .map(|t| email.received_at.is_some_and(|r| r >= t)),
        condition.has_keyword.as_ref().map(|k| email.has_keyword(k)),
        condition.not_keyword.as_ref().map(|k| !email.has_keyword(k)),
        condition
            .all_in_thread_have_keyword
            .as_ref()
            .map(|k| thread.iter().all(|e| e.has_keyword(k))),
        condition
            .some_in_thread_have_keyword
            .as_ref()
            .map(|k| thread.iter().any(|e| e.has_keyword(k))),
        condition
            .none_in_thread_have_keyword
            .as_ref()
            .map(|k| !thread.iter().any(|e| e.has_keyword(k))),
        condition
            .text
            .as_ref()
            .map(|t| contains(&email.subject, t) || contains(&email.preview, t)),
        condition.from.as_ref().map(|f| {
            email.from.iter().flatten().any(|a| {
                a.email.to_lowercase().contains(&f.to_lowercase()) || contains(&a.name, f)
            })
        }),
        condition.subject.as_ref().map(|s| contains(&email.subject, s)),
    ];
    Ok(checks.into_iter().flatten().all(|ok| ok))
}

#[cfg(test)]
#[path = "search_tests.rs"]
mod tests;
