// SPDX-License-Identifier: MIT

pub mod cloner;
pub mod discovery;
pub mod operator;
pub mod report;
pub mod scheduler;
pub mod target;
pub mod validate;

pub use cloner::*;
pub use discovery::*;
pub use operator::*;
pub use scheduler::*;
pub use target::*;
pub use validate::*;
