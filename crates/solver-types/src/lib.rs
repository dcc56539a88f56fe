//! Shared types for the order-lifecycle solver.
//!
//! Every other crate in the workspace speaks in these types: orders as read
//! from the order ledger, withdrawal jobs as reported by the custodial payment
//! API, the policy switches that tune the fulfillment flow, and the alert
//! channel used for conditions that need an operator.

pub mod alerts;
pub mod custody;
pub mod delivery;
pub mod order;
pub mod policy;
pub mod utils;

pub use alerts::*;
pub use custody::*;
pub use delivery::*;
pub use order::*;
pub use policy::*;
pub use utils::*;
