pub mod crd;
pub mod deployment;
pub mod error;

pub use deployment::{Deployment, Role, Topology};
pub use error::{ReconcileError, ReconcileResult};

/// The API group of all Redis operator CRDs.
pub const API_GROUP: &str = "redis.my.domain";

/// The canonical label used to identify the operator which manages an object.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// The name used by the operator for labelling and as its Server-Side Apply field manager.
pub const OPERATOR_NAME: &str = "redis-operator";
