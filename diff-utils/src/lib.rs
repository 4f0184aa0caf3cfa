// SPDX-License-Identifier: MIT

pub mod files;
pub mod partition_point;
pub mod prelude;
