// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
mod flags;
pub use flags::{FlagLabel, flag_labels};
mod int;
pub use int::{read_le, read_le_list};
mod string;
pub use string::read_string;
