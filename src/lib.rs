// SPDX-License-Identifier: MIT

pub mod cli;
pub mod diff;
pub mod diff_color;
pub mod tool;

pub use diff_utils as utils;
