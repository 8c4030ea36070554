//! Domain layer: entities and the pure rules applied to them.

pub mod conditions;
pub mod entities;
pub mod escalation;
pub mod preferences;
pub mod severity;

pub use conditions::TriggerConditions;
pub use entities::{Channel, Event, User, Workflow};
pub use escalation::{EscalationPolicy, EscalationStep, EscalationStepDef, StepTiming};
pub use preferences::{DndMode, DndWindow, PreferenceDecision, UserNotificationPreferences};
pub use severity::Severity;
