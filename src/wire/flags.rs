// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
use alloc::vec::Vec;
use flagset::{FlagSet, Flags};

/// Human-readable names for individual flags
pub trait FlagLabel: Flags {
    fn label(self) -> &'static str;
}

/// Labels of the flags set in `fs`, lowest bit first
pub fn flag_labels<T: FlagLabel>(fs: FlagSet<T>) -> Vec<&'static str> {
    fs.into_iter().map(FlagLabel::label).collect()
}
