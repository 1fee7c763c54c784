//! Unikernel instance provider
//!
//! Keeps declarative instance records in step with instances running on a
//! unikernel cloud. Each record is reconciled on a poll interval through the
//! generic managed-resource cycle in `ukc-reconcile`.
//!
//! ## Modules
//!
//! - `instance`: the managed record (desired parameters, observed status)
//! - `connector`: resolves credentials and builds a per-cycle client
//! - `external`: Observe/Create/Update/Delete against the remote API
//! - `drift`: decides whether the remote state needs a transition
//! - `quantity`: memory quantity parsing
//! - `client`: HTTP implementation of the instance service
//! - `store`: file-backed records, provider configs and secrets
//! - `worker`: the poll loop

pub mod api;
pub mod client;
pub mod config;
pub mod connector;
pub mod credentials;
pub mod drift;
pub mod error;
pub mod external;
pub mod instance;
pub mod quantity;
pub mod service;
pub mod store;
pub mod worker;

pub use connector::{Connector, ProviderConfigStore, UsageTracker};
pub use error::{Error, Result};
pub use external::{FetchErrorPolicy, InstanceClient};
pub use instance::{Instance, InstanceParameters, InstanceState};
pub use service::{InstancesService, MetroInstances, ServiceFactory};
