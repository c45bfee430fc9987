pub mod registry;
pub mod resolver;
pub mod snapshot;

pub use registry::{ProviderFactory, SessionRegistry, SESSION_KEY};
pub use resolver::{InitialCheck, SessionError, SessionResolver};
pub use snapshot::SessionSnapshot;
