//!  Storage is organized through [durable_store::FileDurableStore].
//!  The basic idea is:
//!   - There is a directory with a file per local calendar day holding total time spent.
//!   - Day files are only rewritten when tracking stops or the day ends.
//!   - A separate scalar cache is rewritten every checkpoint, so that little is lost when the
//!     process dies. [crate::tracker::recovery] merges the two on the next start.

pub mod durable_store;
pub mod entities;
#[cfg(test)]
pub mod memory;
