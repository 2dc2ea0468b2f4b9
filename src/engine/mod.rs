//! Event routing and workflow orchestration

pub mod commands;
pub mod containment;
pub mod event;
pub mod lanes;
pub mod reply;
pub mod router;
pub mod session;
pub mod workflow;

pub use commands::{catch_all_fn, command_fn, CallbackResult, CommandRegistry, HandlerContext};
pub use containment::{ErrorContainment, ErrorRecord};
pub use event::{CallbackAction, ChatId, Event, Payload, UserId};
pub use lanes::EventPump;
pub use reply::{Button, Reply, Transport};
pub use router::{Dispatched, Router};
pub use session::{Draft, DraftKey, Session, SessionStore};
pub use workflow::{step_fn, Matcher, Step, StepContext, StepOutcome, Transition, WorkflowDefinition, WorkflowKind};
