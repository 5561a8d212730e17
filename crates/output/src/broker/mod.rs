//! Output brokers - compose N child outputs into one
//!
//! All brokers own their children: they wire each child to a private
//! capacity-1 edge at construction (greedy children instead share the
//! broker's incoming edge), aggregate acknowledgements so that exactly
//! one ack reaches upstream per consumed transaction, and close their
//! children once their own stream has drained.

mod fallback;
mod fan_out;
mod greedy;
mod round_robin;

pub use fallback::FallbackBroker;
pub use fan_out::FanOutBroker;
pub use greedy::GreedyBroker;
pub use round_robin::RoundRobinBroker;

use std::time::Duration;

use sluice_component::Output;

/// Grace period children get to confirm closure before a hard stop
pub(crate) const CHILD_CLOSE_GRACE: Duration = Duration::from_secs(5);


/// Close every child at leisure, escalating to a hard stop on timeout
pub(crate) async fn close_children(children: &[Box<dyn Output>]) {
    for (index, child) in children.iter().enumerate() {
        child.close_at_leisure();
        if child.wait_for_close(CHILD_CLOSE_GRACE).await.is_err() {
            tracing::warn!(child = index, "broker child failed to close, forcing");
            child.close_now();
            let _ = child.wait_for_close(CHILD_CLOSE_GRACE).await;
        }
    }
}
