// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_IDENTITY: AtomicUsize = AtomicUsize::new(1);

/// Returns a number that has not been returned before during this run.
/// Identities order objects by creation time.
pub fn fresh_identity() -> usize {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

/// The indentation used for each nesting level of debug dumps.
pub fn append_tab(prefix: &str) -> String {
    format!("{}        ", prefix)
}

pub fn make_tabs(padding_amount: usize) -> String {
    let mut tabs = String::new();
    for _ in 0..padding_amount {
        tabs = append_tab(&tabs);
    }
    tabs
}
