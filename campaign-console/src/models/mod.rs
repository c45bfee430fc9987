pub mod identity;
pub mod team_member;

pub use identity::{Identity, SignedInUser};
pub use team_member::{Role, RoleRecord};
