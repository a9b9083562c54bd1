//! Domain model (queueing state, item ids, outcomes, errors).

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod queueing_state;

pub use self::errors::{BoxError, ConsumerError};
pub use self::ids::ItemId;
pub use self::outcome::{CycleReport, ItemOutcome};
pub use self::queueing_state::{QueueingState, QueueingStatus};
