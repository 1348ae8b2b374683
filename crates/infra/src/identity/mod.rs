//! Identity provider adapters.

pub mod gotrue;
pub mod in_memory;

pub use gotrue::{GoTrueAdmin, GoTrueAuthClient, GoTrueConfig};
pub use in_memory::{IdentityOp, InMemoryAuthClient, InMemoryIdentityProvider};
