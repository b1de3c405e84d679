// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    both = { Some(50), Some(20), Some(20) },
    size_under_max = { Some(10), Some(20), Some(10) },
    size_only = { Some(10), None, Some(10) },
    max_only = { None, Some(30), Some(30) },
    neither = { None, None, None },
)]
fn page_limit(page_size: Option<u64>, max: Option<u64>, expected: Option<u64>) {
    let session = Session::new("acc").with_max_objects_in_get(max);
    assert_eq!(session.page_limit(page_size), expected);
}
