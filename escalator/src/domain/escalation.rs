//! Escalation policy.
//!
//! The stored policy is an ordered list of `{channel_ids, delay_minutes}`.
//! When loaded it is turned into steps with an explicit [`StepTiming`], so
//! the "first step is always immediate" rule is decided once here and not
//! re-derived from loop indices during dispatch.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Escalation step as stored on a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStepDef {
    #[serde(default)]
    pub channel_ids: Vec<String>,
    #[serde(default)]
    pub delay_minutes: i64,
}

/// Longest delay a step may carry (ten years).
pub const MAX_DELAY_MINUTES: i64 = 10 * 365 * 24 * 60;

/// When a step's channels are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTiming {
    /// Dispatch while processing the event.
    Immediate,
    /// Persist a pending notification due after the delay.
    DelayedBy(Duration),
    /// The stored delay exceeds [`MAX_DELAY_MINUTES`]; the step cannot be
    /// scheduled and its channels are recorded as failed.
    OutOfRange(i64),
}

/// A validated escalation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationStep {
    /// Zero-based position in the policy.
    pub index: usize,
    pub channel_ids: Vec<String>,
    pub timing: StepTiming,
}

/// Ordered escalation steps of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationPolicy {
    steps: Vec<EscalationStep>,
}

impl EscalationPolicy {
    /// Build a policy from stored step definitions.
    ///
    /// Step 0 and every step with `delay_minutes <= 0` are immediate. A bad
    /// delay only affects its own step, never the rest of the policy.
    pub fn from_steps(defs: Vec<EscalationStepDef>) -> Self {
        let steps = defs
            .into_iter()
            .enumerate()
            .map(|(index, def)| EscalationStep {
                index,
                channel_ids: def.channel_ids,
                timing: step_timing(index, def.delay_minutes),
            })
            .collect();

        Self { steps }
    }

    /// Parse a policy from its stored JSON form. `null` or empty means no steps.
    pub fn from_json(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "null" {
            return Ok(Self::default());
        }
        let defs: Vec<EscalationStepDef> = serde_json::from_str(raw)?;
        Ok(Self::from_steps(defs))
    }

    pub fn steps(&self) -> &[EscalationStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

fn step_timing(index: usize, delay_minutes: i64) -> StepTiming {
    if index == 0 || delay_minutes <= 0 {
        return StepTiming::Immediate;
    }
    if delay_minutes > MAX_DELAY_MINUTES {
        return StepTiming::OutOfRange(delay_minutes);
    }
    match Duration::try_minutes(delay_minutes) {
        Some(delay) => StepTiming::DelayedBy(delay),
        None => StepTiming::OutOfRange(delay_minutes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(channels: &[&str], delay: i64) -> EscalationStepDef {
        EscalationStepDef {
            channel_ids: channels.iter().map(|c| c.to_string()).collect(),
            delay_minutes: delay,
        }
    }

    #[test]
    fn test_first_step_always_immediate() {
        let policy = EscalationPolicy::from_steps(vec![def(&["c1"], 30)]);
        assert_eq!(policy.steps()[0].timing, StepTiming::Immediate);
    }

    #[test]
    fn test_later_steps_timing() {
        let policy = EscalationPolicy::from_steps(vec![
            def(&["c1"], 0),
            def(&["c2"], 15),
            def(&["c3"], 0),
        ]);

        assert_eq!(policy.len(), 3);
        assert_eq!(policy.steps()[0].timing, StepTiming::Immediate);
        assert_eq!(
            policy.steps()[1].timing,
            StepTiming::DelayedBy(Duration::minutes(15))
        );
        assert_eq!(policy.steps()[2].timing, StepTiming::Immediate);
        assert_eq!(policy.steps()[2].index, 2);
    }

    #[test]
    fn test_negative_delay_is_immediate() {
        let policy = EscalationPolicy::from_steps(vec![def(&["c1"], 0), def(&["c2"], -5)]);
        assert_eq!(policy.len(), 2);
        assert_eq!(policy.steps()[1].timing, StepTiming::Immediate);
    }

    #[test]
    fn test_out_of_range_delay_only_affects_its_step() {
        let policy = EscalationPolicy::from_steps(vec![
            def(&["c1"], 0),
            def(&["c2"], i64::MAX),
            def(&["c3"], MAX_DELAY_MINUTES),
        ]);
        assert_eq!(policy.steps()[0].timing, StepTiming::Immediate);
        assert_eq!(policy.steps()[1].timing, StepTiming::OutOfRange(i64::MAX));
        assert_eq!(
            policy.steps()[2].timing,
            StepTiming::DelayedBy(Duration::minutes(MAX_DELAY_MINUTES))
        );
    }

    #[test]
    fn test_from_json() {
        let policy = EscalationPolicy::from_json(
            r#"[{"channel_ids":["c1"],"delay_minutes":0},{"channel_ids":["c2","c3"],"delay_minutes":15}]"#,
        )
        .unwrap();
        assert_eq!(policy.steps()[1].channel_ids, vec!["c2", "c3"]);

        assert!(EscalationPolicy::from_json("null").unwrap().is_empty());
        assert!(EscalationPolicy::from_json("[]").unwrap().is_empty());
        assert!(EscalationPolicy::from_json("{").is_err());
    }

    #[test]
    fn test_missing_delay_defaults_to_zero() {
        let policy =
            EscalationPolicy::from_json(r#"[{"channel_ids":["c1"]},{"channel_ids":["c2"]}]"#)
                .unwrap();
        assert_eq!(policy.steps()[1].timing, StepTiming::Immediate);
    }
}
