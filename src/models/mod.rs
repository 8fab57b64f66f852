//! # Models
//!
//! Member records and their run phases. Groups have no model of their own:
//! a group is only ever the result of a membership query.

pub mod member;
pub mod phase;

pub use member::{Member, MemberKey};
pub use phase::MemberPhase;
