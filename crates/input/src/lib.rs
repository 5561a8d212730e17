//! Sluice - Input
//!
//! The input side of the graph: drivers that produce transactions onto an
//! outgoing edge, and the fan-in broker that multiplexes several inputs
//! into one.
//!
//! Every input owns its tasks, exposes clones of its outgoing edge via
//! `transaction_rx`, and closes that edge (by dropping its senders) when
//! it has no more data. The two-phase close protocol is honoured
//! truthfully: `wait_for_close` resolves only after the input's tasks
//! have exited.

mod channel;
mod fan_in;
mod generate;
mod inproc;
mod resource;

pub use channel::ChannelInput;
pub use fan_in::FanInBroker;
pub use generate::{GenerateConfig, GenerateInput};
pub use inproc::InprocInput;
pub use resource::ResourceInput;
