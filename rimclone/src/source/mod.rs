// SPDX-License-Identifier: MIT

pub mod analyzer;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod partition;
pub mod table;

pub use analyzer::*;
pub use descriptor::*;
pub use device::*;
pub use error::*;
pub use partition::*;
pub use table::*;
