//! Intent handlers for the hub-local agent

mod execute;
mod identify;
mod query;

pub use execute::handle_execute;
pub use identify::handle_identify;
pub use query::handle_query;

use lanbridge_shared::CommandDispatcher;

/// Context passed to intent handlers
pub struct HandlerContext {
    pub request_id: String,
    pub dispatcher: CommandDispatcher,
}
