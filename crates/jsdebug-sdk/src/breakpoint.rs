//! Breakpoint bookkeeping shared by both dialects.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use jsdebug_protocol::Field;
use thiserror::Error;

use crate::error::SdkError;
use crate::script::ScriptId;

/// Where a breakpoint is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointTarget {
    /// A script by name (file name or URL).
    ScriptName(String),
    /// A script by VM id.
    ScriptId(ScriptId),
    /// Every script whose name matches a regular expression.
    ScriptRegExp(String),
    /// A function, given as an expression evaluated by the VM.
    Function(String),
}

impl fmt::Display for BreakpointTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakpointTarget::ScriptName(name) => f.write_str(name),
            BreakpointTarget::ScriptId(id) => write!(f, "script #{id}"),
            BreakpointTarget::ScriptRegExp(re) => write!(f, "/{re}/"),
            BreakpointTarget::Function(expr) => write!(f, "function {expr}"),
        }
    }
}

/// Switch for the ignore count, kept apart from the number itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreCountState {
    Enabled,
    Disabled,
    /// The VM has consumed the count.
    Reset,
}

impl IgnoreCountState {
    fn as_str(self) -> &'static str {
        match self {
            IgnoreCountState::Enabled => "ENABLED",
            IgnoreCountState::Disabled => "DISABLED",
            IgnoreCountState::Reset => "RESET",
        }
    }
}

/// Number of hits to skip before the breakpoint suspends.
///
/// The number survives while the state is toggled so a user-chosen value
/// can be switched off and on again without losing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgnoreCount {
    pub value: u32,
    pub state: IgnoreCountState,
}

impl IgnoreCount {
    /// An enabled ignore count.
    pub fn new(value: u32) -> Self {
        Self {
            value,
            state: IgnoreCountState::Enabled,
        }
    }

    /// No ignore count.
    pub fn none() -> Self {
        Self {
            value: 0,
            state: IgnoreCountState::Disabled,
        }
    }

    /// Same number, different state.
    pub fn with_state(self, state: IgnoreCountState) -> Self {
        Self { state, ..self }
    }

    /// The count to send to the VM: the value only when enabled.
    pub fn effective(&self) -> Option<u32> {
        (self.state == IgnoreCountState::Enabled).then_some(self.value)
    }
}

impl Default for IgnoreCount {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for IgnoreCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.state.as_str())
    }
}

/// Error parsing the `"<value>/<STATE>"` form of an ignore count.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid ignore count {0:?}: expected <number>/<ENABLED|DISABLED|RESET>")]
pub struct ParseIgnoreCountError(String);

impl FromStr for IgnoreCount {
    type Err = ParseIgnoreCountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIgnoreCountError(s.to_string());
        let (value, state) = s.split_once('/').ok_or_else(err)?;
        let value = value.trim().parse().map_err(|_| err())?;
        let state = match state.trim() {
            "ENABLED" => IgnoreCountState::Enabled,
            "DISABLED" => IgnoreCountState::Disabled,
            "RESET" => IgnoreCountState::Reset,
            _ => return Err(err()),
        };
        Ok(Self { value, state })
    }
}

/// Everything needed to create a breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointSpec {
    pub target: BreakpointTarget,
    /// Zero-based line.
    pub line: Option<u32>,
    /// Zero-based column.
    pub column: Option<u32>,
    pub enabled: bool,
    pub condition: Option<String>,
    pub ignore_count: IgnoreCount,
}

impl BreakpointSpec {
    /// An enabled, unconditional breakpoint on `target`.
    pub fn new(target: BreakpointTarget) -> Self {
        Self {
            target,
            line: None,
            column: None,
            enabled: true,
            condition: None,
            ignore_count: IgnoreCount::none(),
        }
    }

    /// Place the breakpoint at a line and optional column.
    pub fn at(mut self, line: u32, column: Option<u32>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }

    /// Create a conditional breakpoint.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_ignore_count(mut self, ignore_count: IgnoreCount) -> Self {
        self.ignore_count = ignore_count;
        self
    }

    /// Create the breakpoint disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A breakpoint the VM has accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint<I> {
    /// VM-assigned id.
    pub id: I,
    pub spec: BreakpointSpec,
    /// Location the VM resolved the breakpoint to, when reported.
    pub actual_line: Option<u32>,
    pub actual_column: Option<u32>,
}

impl<I> Breakpoint<I> {
    pub fn new(id: I, spec: BreakpointSpec) -> Self {
        Self {
            id,
            spec,
            actual_line: None,
            actual_column: None,
        }
    }
}

/// A partial update. Unset fields are left alone on the VM.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreakpointChange {
    pub enabled: Option<bool>,
    /// `Null` removes the condition; `Absent` keeps it.
    pub condition: Field<String>,
    pub ignore_count: Option<IgnoreCount>,
}

impl BreakpointChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Replace the condition, or remove it with `None`.
    pub fn condition(mut self, condition: Option<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn ignore_count(mut self, ignore_count: IgnoreCount) -> Self {
        self.ignore_count = Some(ignore_count);
        self
    }

    /// Ignore count to put on the wire, if any.
    pub fn effective_ignore_count(&self) -> Option<u32> {
        self.ignore_count.as_ref().and_then(IgnoreCount::effective)
    }

    /// Fold this change into a local spec.
    pub fn apply_to(&self, spec: &mut BreakpointSpec) {
        if let Some(enabled) = self.enabled {
            spec.enabled = enabled;
        }
        match &self.condition {
            Field::Present(condition) => spec.condition = Some(condition.clone()),
            Field::Null => spec.condition = None,
            Field::Absent => {}
        }
        if let Some(ignore_count) = self.ignore_count {
            spec.ignore_count = ignore_count;
        }
    }
}

/// Breakpoints known to a session, by VM-assigned id.
#[derive(Debug, Clone)]
pub struct BreakpointTable<I> {
    breakpoints: HashMap<I, Breakpoint<I>>,
}

impl<I: Clone + Eq + Hash + fmt::Display> BreakpointTable<I> {
    pub fn new() -> Self {
        Self {
            breakpoints: HashMap::new(),
        }
    }

    /// Record a breakpoint the VM accepted.
    pub fn insert(&mut self, breakpoint: Breakpoint<I>) {
        self.breakpoints.insert(breakpoint.id.clone(), breakpoint);
    }

    pub fn get(&self, id: &I) -> Option<&Breakpoint<I>> {
        self.breakpoints.get(id)
    }

    pub fn contains(&self, id: &I) -> bool {
        self.breakpoints.contains_key(id)
    }

    /// Forget a breakpoint. Returns it if it was known.
    pub fn remove(&mut self, id: &I) -> Option<Breakpoint<I>> {
        self.breakpoints.remove(id)
    }

    /// Apply a change the VM accepted.
    pub fn apply(&mut self, id: &I, change: &BreakpointChange) -> Result<(), SdkError> {
        let breakpoint = self
            .breakpoints
            .get_mut(id)
            .ok_or_else(|| SdkError::UnknownBreakpoint(id.to_string()))?;
        change.apply_to(&mut breakpoint.spec);
        Ok(())
    }

    /// Record that the VM suspended on `id`.
    ///
    /// An enabled ignore count has been used up by the time the VM stops.
    pub fn on_hit(&mut self, id: &I) {
        match self.breakpoints.get_mut(id) {
            Some(breakpoint) => {
                let count = &mut breakpoint.spec.ignore_count;
                if count.state == IgnoreCountState::Enabled {
                    count.state = IgnoreCountState::Reset;
                }
            }
            None => tracing::warn!("hit on unknown breakpoint {}", id),
        }
    }

    /// Every known breakpoint, in no particular order.
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint<I>> {
        self.breakpoints.values()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }
}

impl<I: Clone + Eq + Hash + fmt::Display> Default for BreakpointTable<I> {
    fn default() -> Self {
        Self::new()
    }
}
