//! MasterState, UserCallbacks, and the MasterLoop task (C5, spec.md §4.5).

pub mod callbacks;
pub mod loop_;
pub mod state;

pub use callbacks::{FindUidReply, NoopCallbacks, UserCallbacks};
pub use loop_::{FindActorOutcome, MasterHandle, MasterLoop, MasterMessage};
pub use state::{MasterInfo, MasterState};
