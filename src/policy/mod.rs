//! Capability & execution-mode registry.
//!
//! [`CapabilityRegistry`] is the single policy store for a running process. It
//! is constructed once at startup and shared by `Arc` with the pipeline, the
//! sub-agent manager, the heartbeat and every tool context.
//!
//! A step may run iff the execution mode is not `disabled` and the step's
//! capability is both executable and enabled. Unknown step types resolve to
//! the `unknown` sentinel, which is never executable.

pub mod capability;
pub mod profile;
pub mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

pub use capability::{default_capabilities, Capability, ExecutionMode, UNKNOWN};
pub use profile::{builtin_profiles, ExecutionProfile, BOOTSTRAP_PROFILE, CUSTOM_PROFILE};

use crate::error::PolicyError;
use store::{LoadOutcome, PolicyFile};

/// Outcome of a gate check for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Allowed {
        capability: String,
        /// True while the mode is `manual`: an approval signal is expected per step.
        requires_approval: bool,
    },
    Denied {
        capability: String,
        reason: DenialReason,
    },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The global execution mode is `disabled`.
    ExecutionDisabled,
    /// The capability is informational or the `unknown` sentinel.
    NotExecutable,
    CapabilityDisabled,
}

impl DenialReason {
    pub fn message(&self, capability: &str) -> String {
        match self {
            DenialReason::ExecutionDisabled => {
                "execution is disabled by the current policy".to_string()
            }
            DenialReason::NotExecutable => {
                format!("capability `{capability}` is not executable")
            }
            DenialReason::CapabilityDisabled => {
                format!("capability `{capability}` is disabled by the current policy")
            }
        }
    }
}

/// Point-in-time copy of the policy state.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySnapshot {
    pub execution_mode: ExecutionMode,
    pub active_profile: String,
    pub capabilities: Vec<Capability>,
}

struct PolicyState {
    execution_mode: ExecutionMode,
    active_profile: String,
    /// Catalog order; the sentinel is last.
    capabilities: Vec<Capability>,
}

impl PolicyState {
    fn bootstrap() -> Self {
        let mut state = Self {
            execution_mode: ExecutionMode::Manual,
            active_profile: CUSTOM_PROFILE.to_string(),
            capabilities: default_capabilities(),
        };
        if let Some(profile) = profile::find_profile(BOOTSTRAP_PROFILE) {
            state.apply(&profile);
        }
        state
    }

    fn get(&self, kind: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.kind == kind)
    }

    fn get_mut(&mut self, kind: &str) -> Option<&mut Capability> {
        self.capabilities.iter_mut().find(|c| c.kind == kind)
    }

    fn apply(&mut self, profile: &ExecutionProfile) {
        for cap in &mut self.capabilities {
            cap.enabled = cap.kind != UNKNOWN && profile.enabled_caps.contains(&cap.kind);
        }
        self.execution_mode = profile.execution_mode;
        self.active_profile = profile.name.to_string();
    }

    fn to_file(&self) -> PolicyFile {
        PolicyFile {
            execution_mode: self.execution_mode,
            capabilities: self
                .capabilities
                .iter()
                .filter(|c| c.kind != UNKNOWN)
                .map(|c| (c.kind.clone(), c.enabled))
                .collect::<BTreeMap<_, _>>(),
            active_profile: self.active_profile.clone(),
        }
    }
}

/// Process-wide capability policy.
pub struct CapabilityRegistry {
    state: RwLock<PolicyState>,
    /// `None` keeps the policy in memory only.
    path: Option<PathBuf>,
}

impl CapabilityRegistry {
    /// Registry with the bootstrap profile and no persistence.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(PolicyState::bootstrap()),
            path: None,
        }
    }

    /// Load persisted state from `path`, bootstrapping the `safe` profile if
    /// no file exists. Never fails: unreadable files fall back to defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut state = PolicyState::bootstrap();

        match store::load(&path) {
            LoadOutcome::Missing => {
                tracing::info!(
                    path = %path.display(),
                    profile = BOOTSTRAP_PROFILE,
                    "No persisted policy, applying bootstrap profile"
                );
                let registry = Self {
                    state: RwLock::new(state),
                    path: Some(path),
                };
                registry.persist(&registry.read());
                return registry;
            }
            LoadOutcome::Unreadable(message) => {
                tracing::warn!("Ignoring persisted policy: {message}");
            }
            LoadOutcome::Loaded(loaded) => {
                if let Some(mode) = loaded.execution_mode {
                    state.execution_mode = mode;
                }
                for (kind, enabled) in loaded.capabilities {
                    if kind == UNKNOWN {
                        continue;
                    }
                    match state.get_mut(&kind) {
                        Some(cap) => cap.enabled = enabled,
                        None => tracing::warn!(capability = %kind, "Ignoring unknown persisted capability"),
                    }
                }
                state.active_profile = loaded
                    .active_profile
                    .unwrap_or_else(|| CUSTOM_PROFILE.to_string());
                tracing::info!(
                    path = %path.display(),
                    mode = %state.execution_mode,
                    profile = %state.active_profile,
                    "Loaded persisted policy"
                );
            }
        }

        Self {
            state: RwLock::new(state),
            path: Some(path),
        }
    }

    /// Path of the persisted policy file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, PolicyState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PolicyState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist while the caller holds the lock so file order matches memory order.
    fn persist(&self, state: &PolicyState) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = store::save(path, &state.to_file()) {
            tracing::warn!(path = %path.display(), "Failed to persist policy: {e:#}");
        }
    }

    pub fn is_known_type(&self, kind: &str) -> bool {
        self.read().get(kind).is_some()
    }

    /// Map a step type to its capability key, falling back to the sentinel.
    pub fn resolve(&self, kind: &str) -> String {
        if self.is_known_type(kind) {
            kind.to_string()
        } else {
            UNKNOWN.to_string()
        }
    }

    pub fn is_executable(&self, kind: &str) -> bool {
        self.read().get(kind).is_some_and(|c| c.executable)
    }

    pub fn is_enabled(&self, kind: &str) -> bool {
        self.read().get(kind).is_some_and(|c| c.enabled)
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.read().execution_mode
    }

    pub fn active_profile(&self) -> String {
        self.read().active_profile.clone()
    }

    pub fn enable(&self, kind: &str) -> Result<(), PolicyError> {
        if kind == UNKNOWN {
            return Err(PolicyError::SentinelLocked);
        }
        self.set_enabled(kind, true)
    }

    pub fn disable(&self, kind: &str) -> Result<(), PolicyError> {
        self.set_enabled(kind, false)
    }

    fn set_enabled(&self, kind: &str, enabled: bool) -> Result<(), PolicyError> {
        let mut state = self.write();
        let cap = state
            .get_mut(kind)
            .ok_or_else(|| PolicyError::UnknownCapability(kind.to_string()))?;
        cap.enabled = enabled;
        state.active_profile = CUSTOM_PROFILE.to_string();
        tracing::info!(capability = %kind, enabled, "Capability updated");
        self.persist(&state);
        Ok(())
    }

    pub fn set_execution_mode(&self, mode: ExecutionMode) {
        let mut state = self.write();
        state.execution_mode = mode;
        state.active_profile = CUSTOM_PROFILE.to_string();
        tracing::info!(mode = %mode, "Execution mode updated");
        self.persist(&state);
    }

    /// Replace the live state with a built-in profile. Unknown names leave state untouched.
    pub fn apply_profile(&self, name: &str) -> Result<(), PolicyError> {
        let profile = profile::find_profile(name)
            .ok_or_else(|| PolicyError::UnknownProfile(name.to_string()))?;
        let mut state = self.write();
        state.apply(&profile);
        tracing::info!(profile = %name, mode = %profile.execution_mode, "Profile applied");
        self.persist(&state);
        Ok(())
    }

    pub fn current_state(&self) -> PolicySnapshot {
        let state = self.read();
        PolicySnapshot {
            execution_mode: state.execution_mode,
            active_profile: state.active_profile.clone(),
            capabilities: state.capabilities.clone(),
        }
    }

    pub fn profiles(&self) -> Vec<ExecutionProfile> {
        builtin_profiles()
    }

    /// Decide whether a step classified as `kind` may run right now.
    pub fn check(&self, kind: &str) -> GateDecision {
        let state = self.read();
        let (capability, cap) = match state.get(kind) {
            Some(cap) => (kind.to_string(), Some(cap)),
            None => (UNKNOWN.to_string(), state.get(UNKNOWN)),
        };

        let reason = if state.execution_mode == ExecutionMode::Disabled {
            Some(DenialReason::ExecutionDisabled)
        } else {
            match cap {
                Some(c) if !c.executable => Some(DenialReason::NotExecutable),
                Some(c) if !c.enabled => Some(DenialReason::CapabilityDisabled),
                Some(_) => None,
                None => Some(DenialReason::NotExecutable),
            }
        };

        match reason {
            Some(reason) => GateDecision::Denied { capability, reason },
            None => GateDecision::Allowed {
                capability,
                requires_approval: state.execution_mode == ExecutionMode::Manual,
            },
        }
    }
}
